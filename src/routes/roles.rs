use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Lifecycle, NewRole, Role};
use crate::permissions::{self, Permission};
use crate::schema::roles;
use crate::state::AppState;

/// The full flag set, used both for create (defaults false) and edit.
#[derive(Deserialize, Default, Clone)]
#[serde(default)]
pub struct PermissionFlags {
    pub can_view_users: bool,
    pub can_edit_users: bool,
    pub can_delete_users: bool,
    pub can_create_users: bool,
    pub can_view_bills: bool,
    pub can_edit_bills: bool,
    pub can_delete_bills: bool,
    pub can_create_bills: bool,
    pub can_view_tags: bool,
    pub can_edit_tags: bool,
    pub can_delete_tags: bool,
    pub can_create_tags: bool,
    pub can_view_roles: bool,
    pub can_edit_roles: bool,
    pub can_delete_roles: bool,
    pub can_create_roles: bool,
    pub can_manage_document_types: bool,
}

#[derive(Deserialize)]
pub struct CreateRoleRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub flags: PermissionFlags,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub flags: PermissionFlags,
}

#[derive(Serialize)]
pub struct RoleEntry {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub lifecycle: Lifecycle,
    pub can_view_users: bool,
    pub can_edit_users: bool,
    pub can_delete_users: bool,
    pub can_create_users: bool,
    pub can_view_bills: bool,
    pub can_edit_bills: bool,
    pub can_delete_bills: bool,
    pub can_create_bills: bool,
    pub can_view_tags: bool,
    pub can_edit_tags: bool,
    pub can_delete_tags: bool,
    pub can_create_tags: bool,
    pub can_view_roles: bool,
    pub can_edit_roles: bool,
    pub can_delete_roles: bool,
    pub can_create_roles: bool,
    pub can_manage_document_types: bool,
}

impl From<Role> for RoleEntry {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            lifecycle: role.lifecycle(),
            title: role.title,
            description: role.description,
            can_view_users: role.can_view_users,
            can_edit_users: role.can_edit_users,
            can_delete_users: role.can_delete_users,
            can_create_users: role.can_create_users,
            can_view_bills: role.can_view_bills,
            can_edit_bills: role.can_edit_bills,
            can_delete_bills: role.can_delete_bills,
            can_create_bills: role.can_create_bills,
            can_view_tags: role.can_view_tags,
            can_edit_tags: role.can_edit_tags,
            can_delete_tags: role.can_delete_tags,
            can_create_tags: role.can_create_tags,
            can_view_roles: role.can_view_roles,
            can_edit_roles: role.can_edit_roles,
            can_delete_roles: role.can_delete_roles,
            can_create_roles: role.can_create_roles,
            can_manage_document_types: role.can_manage_document_types,
        }
    }
}

pub fn new_role_from_flags(title: String, description: Option<String>, flags: &PermissionFlags) -> NewRole {
    NewRole {
        id: Uuid::new_v4(),
        title,
        description,
        can_view_users: flags.can_view_users,
        can_edit_users: flags.can_edit_users,
        can_delete_users: flags.can_delete_users,
        can_create_users: flags.can_create_users,
        can_view_bills: flags.can_view_bills,
        can_edit_bills: flags.can_edit_bills,
        can_delete_bills: flags.can_delete_bills,
        can_create_bills: flags.can_create_bills,
        can_view_tags: flags.can_view_tags,
        can_edit_tags: flags.can_edit_tags,
        can_delete_tags: flags.can_delete_tags,
        can_create_tags: flags.can_create_tags,
        can_view_roles: flags.can_view_roles,
        can_edit_roles: flags.can_edit_roles,
        can_delete_roles: flags.can_delete_roles,
        can_create_roles: flags.can_create_roles,
        can_manage_document_types: flags.can_manage_document_types,
    }
}

pub async fn list_roles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<RoleEntry>>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ViewRoles)?;

    let all: Vec<Role> = roles::table.order(roles::title.asc()).load(&mut conn)?;
    Ok(Json(all.into_iter().map(Into::into).collect()))
}

pub async fn create_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleEntry>)> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::CreateRoles)?;

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let duplicate: Option<Role> = roles::table
        .filter(roles::title.eq(&title))
        .first(&mut conn)
        .optional()?;
    if duplicate.is_some() {
        return Err(AppError::bad_request("role title already exists"));
    }

    let new_role = new_role_from_flags(title, payload.description, &payload.flags);

    match diesel::insert_into(roles::table)
        .values(&new_role)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return Err(AppError::bad_request("role title already exists")),
        Err(err) => return Err(AppError::from(err)),
    }

    let role: Role = roles::table.find(new_role.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(role.into())))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<RoleEntry>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::EditRoles)?;

    let existing: Role = roles::table.find(role_id).first(&mut conn)?;

    let title = match payload.title.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("title must not be empty")),
        Some(value) => {
            if value != existing.title {
                let duplicate: Option<Role> = roles::table
                    .filter(roles::title.eq(value))
                    .filter(roles::id.ne(role_id))
                    .first(&mut conn)
                    .optional()?;
                if duplicate.is_some() {
                    return Err(AppError::bad_request("role title already exists"));
                }
            }
            value.to_string()
        }
        None => existing.title.clone(),
    };

    // An empty description clears the field; an absent one keeps it.
    let description = match payload.description.as_deref().map(str::trim) {
        Some("") => None,
        Some(value) => Some(value.to_string()),
        None => existing.description.clone(),
    };

    let flags = &payload.flags;
    diesel::update(roles::table.find(role_id))
        .set((
            roles::title.eq(title),
            roles::description.eq(description),
            roles::can_view_users.eq(flags.can_view_users),
            roles::can_edit_users.eq(flags.can_edit_users),
            roles::can_delete_users.eq(flags.can_delete_users),
            roles::can_create_users.eq(flags.can_create_users),
            roles::can_view_bills.eq(flags.can_view_bills),
            roles::can_edit_bills.eq(flags.can_edit_bills),
            roles::can_delete_bills.eq(flags.can_delete_bills),
            roles::can_create_bills.eq(flags.can_create_bills),
            roles::can_view_tags.eq(flags.can_view_tags),
            roles::can_edit_tags.eq(flags.can_edit_tags),
            roles::can_delete_tags.eq(flags.can_delete_tags),
            roles::can_create_tags.eq(flags.can_create_tags),
            roles::can_view_roles.eq(flags.can_view_roles),
            roles::can_edit_roles.eq(flags.can_edit_roles),
            roles::can_delete_roles.eq(flags.can_delete_roles),
            roles::can_create_roles.eq(flags.can_create_roles),
            roles::can_manage_document_types.eq(flags.can_manage_document_types),
            roles::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let updated: Role = roles::table.find(role_id).first(&mut conn)?;
    Ok(Json(updated.into()))
}

/// Soft delete. Users already holding the role keep it; the role just stops
/// being offered for new assignments.
pub async fn delete_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::DeleteRoles)?;

    let updated = diesel::update(roles::table.find(role_id))
        .set((
            roles::is_active.eq(false),
            roles::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
