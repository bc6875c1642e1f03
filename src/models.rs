use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

/// Two-state lifecycle shared by roles, tags and document types. Deactivated
/// records stay valid foreign-key targets but are hidden from "choose from
/// active options" listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Active,
    Deactivated,
}

impl Lifecycle {
    pub fn from_flag(is_active: bool) -> Self {
        if is_active {
            Lifecycle::Active
        } else {
            Lifecycle::Deactivated
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
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
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Role {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_flag(self.is_active)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = roles)]
pub struct NewRole {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
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

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_types)]
pub struct DocumentType {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl DocumentType {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_flag(self.is_active)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_types)]
pub struct NewDocumentType {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Tag {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_flag(self.is_active)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tags)]
pub struct NewTag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = bills)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(belongs_to(DocumentType, foreign_key = document_type_id))]
pub struct Bill {
    pub id: Uuid,
    pub author_id: Uuid,
    pub document_type_id: Uuid,
    pub folio: String,
    pub payment_date: NaiveDate,
    pub bill_date: NaiveDate,
    pub bill_concept: String,
    pub description: String,
    pub pdf_group_id: Uuid,
    pub client_deposit_group_id: Uuid,
    pub deposit_group_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Bill {
    /// The three attachment slots, in display order.
    pub fn group_ids(&self) -> [Uuid; 3] {
        [
            self.pdf_group_id,
            self.client_deposit_group_id,
            self.deposit_group_id,
        ]
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bills)]
pub struct NewBill {
    pub id: Uuid,
    pub author_id: Uuid,
    pub document_type_id: Uuid,
    pub folio: String,
    pub payment_date: NaiveDate,
    pub bill_date: NaiveDate,
    pub bill_concept: String,
    pub description: String,
    pub pdf_group_id: Uuid,
    pub client_deposit_group_id: Uuid,
    pub deposit_group_id: Uuid,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = bill_tags)]
#[diesel(belongs_to(Bill))]
#[diesel(belongs_to(Tag))]
#[diesel(primary_key(bill_id, tag_id))]
pub struct BillTag {
    pub bill_id: Uuid,
    pub tag_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bill_tags)]
pub struct NewBillTag {
    pub bill_id: Uuid,
    pub tag_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = file_groups)]
pub struct FileGroup {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = file_groups)]
pub struct NewFileGroup {
    pub id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = files)]
#[diesel(belongs_to(FileGroup))]
pub struct File {
    pub id: Uuid,
    pub file_group_id: Uuid,
    pub file_path: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFile {
    pub id: Uuid,
    pub file_group_id: Uuid,
    pub file_path: String,
    pub original_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
