mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, Grants, TestApp};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
struct DocumentTypeEntry {
    id: Uuid,
    name: String,
}

#[tokio::test]
async fn document_type_lifecycle_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let role_id = app
        .insert_role(
            "type-manager",
            Grants {
                manage_document_types: true,
                ..Grants::default()
            },
        )
        .await?;
    app.insert_user("Manager", "manager@example.com", "pw", role_id)
        .await?;
    let token = app.login_token("manager@example.com", "pw").await?;

    let created = app
        .post_json(
            "/api/document-types",
            &serde_json::json!({ "name": "invoice" }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_to_vec(created.into_body()).await?;
    let doc_type: DocumentTypeEntry = serde_json::from_slice(&body)?;
    assert_eq!(doc_type.name, "invoice");

    let listed = app.get("/api/document-types", Some(&token)).await?;
    let body = body_to_vec(listed.into_body()).await?;
    let types: Vec<DocumentTypeEntry> = serde_json::from_slice(&body)?;
    assert_eq!(types.len(), 1);

    let removed = app
        .delete(&format!("/api/document-types/{}", doc_type.id), Some(&token))
        .await?;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let listed = app.get("/api/document-types", Some(&token)).await?;
    let body = body_to_vec(listed.into_body()).await?;
    let types: Vec<DocumentTypeEntry> = serde_json::from_slice(&body)?;
    assert!(types.is_empty());

    app.cleanup().await?;
    Ok(())
}

/// Document types are governed by a single management flag, not the
/// view/edit/delete/create quartet the other resources use.
#[tokio::test]
async fn document_types_are_gated_by_the_manage_flag() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    // A role with every flag except the manage one still gets turned away.
    let role_id = app
        .insert_role(
            "almost-admin",
            Grants {
                manage_document_types: false,
                ..Grants::all()
            },
        )
        .await?;
    app.insert_user("Almost", "almost@example.com", "pw", role_id)
        .await?;
    let token = app.login_token("almost@example.com", "pw").await?;

    let listed = app.get("/api/document-types", Some(&token)).await?;
    assert_eq!(listed.status(), StatusCode::FORBIDDEN);

    let created = app
        .post_json(
            "/api/document-types",
            &serde_json::json!({ "name": "invoice" }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}
