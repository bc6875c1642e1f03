mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, Grants, TestApp};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
struct TagEntry {
    id: Uuid,
    name: String,
}

#[tokio::test]
async fn tag_lifecycle_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let role_id = app.insert_role("admin", Grants::all()).await?;
    app.insert_user("Admin", "admin@example.com", "pw", role_id)
        .await?;
    let token = app.login_token("admin@example.com", "pw").await?;

    let created = app
        .post_json(
            "/api/tags",
            &serde_json::json!({ "name": "utilities" }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_to_vec(created.into_body()).await?;
    let tag: TagEntry = serde_json::from_slice(&body)?;
    assert_eq!(tag.name, "utilities");

    let listed = app.get("/api/tags", Some(&token)).await?;
    let body = body_to_vec(listed.into_body()).await?;
    let tags: Vec<TagEntry> = serde_json::from_slice(&body)?;
    assert_eq!(tags.len(), 1);

    let removed = app
        .delete(&format!("/api/tags/{}", tag.id), Some(&token))
        .await?;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    // Deactivated tags drop out of the listing but the row survives.
    let listed = app.get("/api/tags", Some(&token)).await?;
    let body = body_to_vec(listed.into_body()).await?;
    let tags: Vec<TagEntry> = serde_json::from_slice(&body)?;
    assert!(tags.is_empty());

    let missing = app
        .delete(&format!("/api/tags/{}", Uuid::new_v4()), Some(&token))
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn empty_tag_name_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let role_id = app.insert_role("admin", Grants::all()).await?;
    app.insert_user("Admin", "admin@example.com", "pw", role_id)
        .await?;
    let token = app.login_token("admin@example.com", "pw").await?;

    let created = app
        .post_json(
            "/api/tags",
            &serde_json::json!({ "name": "   " }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn viewing_tags_needs_only_the_view_flag() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let viewer_role = app
        .insert_role(
            "tag-viewer",
            Grants {
                view_tags: true,
                ..Grants::default()
            },
        )
        .await?;
    app.insert_user("Viewer", "viewer@example.com", "pw", viewer_role)
        .await?;
    let token = app.login_token("viewer@example.com", "pw").await?;

    let listed = app.get("/api/tags", Some(&token)).await?;
    assert_eq!(listed.status(), StatusCode::OK);

    let created = app
        .post_json(
            "/api/tags",
            &serde_json::json!({ "name": "forbidden" }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::FORBIDDEN);

    let removed = app
        .delete(&format!("/api/tags/{}", Uuid::new_v4()), Some(&token))
        .await?;
    assert_eq!(removed.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}
