use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{DocumentType, Lifecycle, NewDocumentType};
use crate::permissions::{self, Permission};
use crate::schema::document_types;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateDocumentTypeRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct DocumentTypeEntry {
    pub id: Uuid,
    pub name: String,
    pub lifecycle: Lifecycle,
}

impl From<DocumentType> for DocumentTypeEntry {
    fn from(doc_type: DocumentType) -> Self {
        Self {
            id: doc_type.id,
            lifecycle: doc_type.lifecycle(),
            name: doc_type.name,
        }
    }
}

pub async fn list_document_types(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentTypeEntry>>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ManageDocumentTypes)?;

    let active: Vec<DocumentType> = document_types::table
        .filter(document_types::is_active.eq(true))
        .order(document_types::name.asc())
        .load(&mut conn)?;

    Ok(Json(active.into_iter().map(Into::into).collect()))
}

pub async fn create_document_type(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateDocumentTypeRequest>,
) -> AppResult<(StatusCode, Json<DocumentTypeEntry>)> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ManageDocumentTypes)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let new_type = NewDocumentType {
        id: Uuid::new_v4(),
        name: name.to_string(),
    };
    diesel::insert_into(document_types::table)
        .values(&new_type)
        .execute(&mut conn)?;

    let doc_type: DocumentType = document_types::table.find(new_type.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(doc_type.into())))
}

/// Soft delete, same contract as tags: historical bills keep their type.
pub async fn delete_document_type(
    State(state): State<AppState>,
    Path(type_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ManageDocumentTypes)?;

    let updated = diesel::update(document_types::table.find(type_id))
        .set(document_types::is_active.eq(false))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
