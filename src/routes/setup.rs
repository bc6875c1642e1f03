use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::password;
use crate::error::{AppError, AppResult};
use crate::models::{NewRole, NewUser, Role};
use crate::routes::auth::DEFAULT_ROLE_TITLE;
use crate::schema::{roles, users};
use crate::state::AppState;

pub const ADMIN_ROLE_TITLE: &str = "admin";

#[derive(Serialize)]
pub struct SetupStatus {
    pub initialized: bool,
}

#[derive(Deserialize)]
pub struct SetupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SetupResponse {
    pub admin_role_id: Uuid,
    pub default_role_id: Uuid,
    pub admin_user_id: Uuid,
}

fn role_with_all_flags(title: &str, description: &str, value: bool) -> NewRole {
    NewRole {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: Some(description.to_string()),
        can_view_users: value,
        can_edit_users: value,
        can_delete_users: value,
        can_create_users: value,
        can_view_bills: value,
        can_edit_bills: value,
        can_delete_bills: value,
        can_create_bills: value,
        can_view_tags: value,
        can_edit_tags: value,
        can_delete_tags: value,
        can_create_tags: value,
        can_view_roles: value,
        can_edit_roles: value,
        can_delete_roles: value,
        can_create_roles: value,
        can_manage_document_types: value,
    }
}

/// Reports whether the one-time bootstrap has run. Unauthenticated on
/// purpose: a fresh deployment has no users yet.
pub async fn setup_status(State(state): State<AppState>) -> AppResult<Json<SetupStatus>> {
    let mut conn = state.db()?;
    let existing: i64 = roles::table.count().get_result(&mut conn)?;
    Ok(Json(SetupStatus {
        initialized: existing > 0,
    }))
}

/// One-time bootstrap. Creates the admin role with every flag set, the
/// default signup role with none, and the first admin account. Refuses to
/// run again once any role exists.
pub async fn run_setup(
    State(state): State<AppState>,
    Json(payload): Json<SetupRequest>,
) -> AppResult<(StatusCode, Json<SetupResponse>)> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("name, email and password are required"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("invalid email address"));
    }

    let password_hash = password::hash_password(&payload.password)?;

    let mut conn = state.db()?;
    let response = conn.transaction::<SetupResponse, AppError, _>(|conn| {
        let existing: Option<Role> = roles::table.first(conn).optional()?;
        if existing.is_some() {
            return Err(AppError::conflict("already initialized"));
        }

        let admin_role = role_with_all_flags(ADMIN_ROLE_TITLE, "full access", true);
        let default_role = role_with_all_flags(DEFAULT_ROLE_TITLE, "default signup role", false);
        diesel::insert_into(roles::table)
            .values(vec![&admin_role, &default_role])
            .execute(conn)?;

        let admin_user = NewUser {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            role_id: admin_role.id,
        };
        diesel::insert_into(users::table)
            .values(&admin_user)
            .execute(conn)?;

        Ok(SetupResponse {
            admin_role_id: admin_role.id,
            default_role_id: default_role.id,
            admin_user_id: admin_user.id,
        })
    })?;

    info!(admin = %response.admin_user_id, "bootstrap completed");
    Ok((StatusCode::CREATED, Json(response)))
}
