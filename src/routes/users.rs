use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{password, AuthenticatedUser};
use crate::error::{AppError, AppResult};
use crate::models::{Role, User};
use crate::permissions::{self, Permission};
use crate::schema::{roles, users};
use crate::state::AppState;

#[derive(Serialize)]
pub struct UserEntry {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role_id: Uuid,
    pub role_title: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangeRoleRequest {
    pub role_id: Uuid,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset {
    name: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    updated_at: chrono::NaiveDateTime,
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserEntry>>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ViewUsers)?;

    let rows: Vec<(User, Role)> = users::table
        .inner_join(roles::table)
        .order(users::email.asc())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(user, role)| UserEntry {
                id: user.id,
                email: user.email,
                name: user.name,
                role_id: role.id,
                role_title: role.title,
            })
            .collect(),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    principal: AuthenticatedUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserEntry>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &principal, Permission::EditUsers)?;

    let target: User = users::table.find(user_id).first(&mut conn)?;

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("name must not be empty")),
        other => other.map(str::to_string),
    };

    let email = match payload.email.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("email must not be empty")),
        Some(value) => {
            let normalized = value.to_lowercase();
            if normalized != target.email {
                let taken: Option<User> = users::table
                    .filter(users::email.eq(&normalized))
                    .filter(users::id.ne(target.id))
                    .first(&mut conn)
                    .optional()?;
                if taken.is_some() {
                    return Err(AppError::bad_request("email already registered"));
                }
            }
            Some(normalized)
        }
        None => None,
    };

    let password_hash = match payload.password.as_deref() {
        Some("") => return Err(AppError::bad_request("password must not be empty")),
        Some(plain) => Some(password::hash_password(plain)?),
        None => None,
    };

    let changeset = UserChangeset {
        name,
        email,
        password_hash,
        updated_at: Utc::now().naive_utc(),
    };
    // The pre-check above races with concurrent edits; the unique index is
    // the authority, so map its violation to the same client error.
    match diesel::update(users::table.find(target.id))
        .set(&changeset)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return Err(AppError::bad_request("email already registered")),
        Err(err) => return Err(AppError::from(err)),
    }

    let (updated, role): (User, Role) = users::table
        .inner_join(roles::table)
        .filter(users::id.eq(target.id))
        .first(&mut conn)?;

    Ok(Json(UserEntry {
        id: updated.id,
        email: updated.email,
        name: updated.name,
        role_id: role.id,
        role_title: role.title,
    }))
}

/// Role reassignment only offers active roles; a deactivated role keeps its
/// existing users but cannot gain new ones.
pub async fn change_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    principal: AuthenticatedUser,
    Json(payload): Json<ChangeRoleRequest>,
) -> AppResult<Json<UserEntry>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &principal, Permission::EditUsers)?;

    let target: User = users::table.find(user_id).first(&mut conn)?;

    let role: Option<Role> = roles::table
        .find(payload.role_id)
        .filter(roles::is_active.eq(true))
        .first(&mut conn)
        .optional()?;
    let role = role.ok_or_else(|| AppError::bad_request("unknown or inactive role"))?;

    diesel::update(users::table.find(target.id))
        .set((
            users::role_id.eq(role.id),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    info!(user_id = %target.id, role = %role.title, "user role changed");

    Ok(Json(UserEntry {
        id: target.id,
        email: target.email,
        name: target.name,
        role_id: role.id,
        role_title: role.title,
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    principal: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &principal, Permission::DeleteUsers)?;

    let target: User = users::table.find(user_id).first(&mut conn)?;

    let authored: i64 = crate::schema::bills::table
        .filter(crate::schema::bills::author_id.eq(target.id))
        .count()
        .get_result(&mut conn)?;
    if authored > 0 {
        return Err(AppError::bad_request(
            "cannot delete a user who still owns bills",
        ));
    }

    // Hard delete; the user's refresh tokens go with the row.
    conn.transaction::<(), AppError, _>(|conn| {
        diesel::delete(
            crate::schema::refresh_tokens::table
                .filter(crate::schema::refresh_tokens::user_id.eq(target.id)),
        )
        .execute(conn)?;
        diesel::delete(users::table.find(target.id)).execute(conn)?;
        Ok(())
    })?;

    info!(user_id = %target.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
