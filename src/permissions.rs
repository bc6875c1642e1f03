use diesel::prelude::*;
use diesel::PgConnection;
use tracing::debug;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Role, User},
    schema::users,
};

/// One independent boolean flag on a role. No hierarchy, no inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewUsers,
    EditUsers,
    DeleteUsers,
    CreateUsers,
    ViewBills,
    EditBills,
    DeleteBills,
    CreateBills,
    ViewTags,
    EditTags,
    DeleteTags,
    CreateTags,
    ViewRoles,
    EditRoles,
    DeleteRoles,
    CreateRoles,
    ManageDocumentTypes,
}

impl Permission {
    pub fn flag_name(self) -> &'static str {
        match self {
            Permission::ViewUsers => "can_view_users",
            Permission::EditUsers => "can_edit_users",
            Permission::DeleteUsers => "can_delete_users",
            Permission::CreateUsers => "can_create_users",
            Permission::ViewBills => "can_view_bills",
            Permission::EditBills => "can_edit_bills",
            Permission::DeleteBills => "can_delete_bills",
            Permission::CreateBills => "can_create_bills",
            Permission::ViewTags => "can_view_tags",
            Permission::EditTags => "can_edit_tags",
            Permission::DeleteTags => "can_delete_tags",
            Permission::CreateTags => "can_create_tags",
            Permission::ViewRoles => "can_view_roles",
            Permission::EditRoles => "can_edit_roles",
            Permission::DeleteRoles => "can_delete_roles",
            Permission::CreateRoles => "can_create_roles",
            Permission::ManageDocumentTypes => "can_manage_document_types",
        }
    }
}

impl Role {
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::ViewUsers => self.can_view_users,
            Permission::EditUsers => self.can_edit_users,
            Permission::DeleteUsers => self.can_delete_users,
            Permission::CreateUsers => self.can_create_users,
            Permission::ViewBills => self.can_view_bills,
            Permission::EditBills => self.can_edit_bills,
            Permission::DeleteBills => self.can_delete_bills,
            Permission::CreateBills => self.can_create_bills,
            Permission::ViewTags => self.can_view_tags,
            Permission::EditTags => self.can_edit_tags,
            Permission::DeleteTags => self.can_delete_tags,
            Permission::CreateTags => self.can_create_tags,
            Permission::ViewRoles => self.can_view_roles,
            Permission::EditRoles => self.can_edit_roles,
            Permission::DeleteRoles => self.can_delete_roles,
            Permission::CreateRoles => self.can_create_roles,
            Permission::ManageDocumentTypes => self.can_manage_document_types,
        }
    }
}

/// Loads the principal's current role and checks one permission flag.
///
/// The role is read fresh from the database on every call, so a role edit
/// takes effect on the next request, not at next login. Multiple permissions
/// on one route compose by calling this once per flag (boolean AND).
pub fn require(
    conn: &mut PgConnection,
    principal: &AuthenticatedUser,
    permission: Permission,
) -> AppResult<Role> {
    let loaded: Option<(User, Role)> = users::table
        .inner_join(crate::schema::roles::table)
        .filter(users::id.eq(principal.user_id))
        .first(conn)
        .optional()?;

    // A token for a since-deleted user is a stale session, not a permission
    // failure.
    let (_, role) = loaded.ok_or_else(AppError::unauthorized)?;

    if !role.allows(permission) {
        debug!(
            user_id = %principal.user_id,
            role = %role.title,
            permission = permission.flag_name(),
            "permission denied"
        );
        return Err(AppError::forbidden());
    }

    Ok(role)
}
