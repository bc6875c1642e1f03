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
use crate::models::{Lifecycle, NewTag, Tag};
use crate::permissions::{self, Permission};
use crate::schema::tags;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct TagEntry {
    pub id: Uuid,
    pub name: String,
    pub lifecycle: Lifecycle,
}

impl From<Tag> for TagEntry {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            lifecycle: tag.lifecycle(),
            name: tag.name,
        }
    }
}

/// Listing needs only the view flag; the original stacked the create flag on
/// top of it here, which was a copy-paste mistake rather than policy.
pub async fn list_tags(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TagEntry>>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ViewTags)?;

    let active: Vec<Tag> = tags::table
        .filter(tags::is_active.eq(true))
        .order(tags::name.asc())
        .load(&mut conn)?;

    Ok(Json(active.into_iter().map(Into::into).collect()))
}

pub async fn create_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<TagEntry>)> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::CreateTags)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let new_tag = NewTag {
        id: Uuid::new_v4(),
        name: name.to_string(),
    };
    diesel::insert_into(tags::table)
        .values(&new_tag)
        .execute(&mut conn)?;

    let tag: Tag = tags::table.find(new_tag.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}

/// Soft delete: the row stays so that bills tagged in the past keep
/// resolving the name; only the active listing drops it.
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::DeleteTags)?;

    let updated = diesel::update(tags::table.find(tag_id))
        .set(tags::is_active.eq(false))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
