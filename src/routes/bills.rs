use std::collections::HashMap;

use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use chrono::{NaiveDate, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Bill, DocumentType, File, NewBill, NewBillTag, Tag, User};
use crate::permissions::{self, Permission};
use crate::schema::{bill_tags, bills, document_types, files, tags, users};
use crate::state::AppState;
use crate::uploads::{self, PreparedGroup, UploadedBlob};

pub const PAGE_SIZE: i64 = 10;

/// Names of the three multipart file fields, one per attachment slot.
const GROUP_FIELDS: [&str; 3] = ["bill_pdf", "client_deposit_image", "deposit_image"];

#[derive(Deserialize)]
pub struct BillListQuery {
    pub folio: Option<String>,
    pub tag_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub document_type_id: Option<Uuid>,
    pub page: Option<i64>,
}

#[derive(Serialize)]
pub struct TagRef {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

impl From<Tag> for TagRef {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            is_active: tag.is_active,
        }
    }
}

#[derive(Serialize)]
pub struct AuthorRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Serialize)]
pub struct DocumentTypeRef {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

impl From<DocumentType> for DocumentTypeRef {
    fn from(doc_type: DocumentType) -> Self {
        Self {
            id: doc_type.id,
            name: doc_type.name,
            is_active: doc_type.is_active,
        }
    }
}

#[derive(Serialize)]
pub struct FileRef {
    pub id: Uuid,
    pub original_name: String,
    pub content_type: Option<String>,
    pub download_path: String,
}

#[derive(Serialize)]
pub struct FileGroupRef {
    pub id: Uuid,
    pub files: Vec<FileRef>,
}

#[derive(Serialize)]
pub struct BillResponse {
    pub id: Uuid,
    pub folio: String,
    pub author: AuthorRef,
    pub document_type: DocumentTypeRef,
    pub payment_date: NaiveDate,
    pub bill_date: NaiveDate,
    pub bill_concept: String,
    pub description: String,
    pub tags: Vec<TagRef>,
}

#[derive(Serialize)]
pub struct BillDetailResponse {
    #[serde(flatten)]
    pub bill: BillResponse,
    pub bill_pdf: FileGroupRef,
    pub client_deposit_image: FileGroupRef,
    pub deposit_image: FileGroupRef,
}

#[derive(Serialize)]
pub struct BillListResponse {
    pub bills: Vec<BillResponse>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Serialize)]
pub struct BillOptionsResponse {
    pub document_types: Vec<DocumentTypeRef>,
    pub tags: Vec<TagRef>,
}

#[derive(Deserialize)]
pub struct UpdateBillRequest {
    pub document_type_id: Option<Uuid>,
    pub payment_date: Option<NaiveDate>,
    pub bill_date: Option<NaiveDate>,
    pub bill_concept: Option<String>,
    pub description: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = bills)]
struct BillChangeset<'a> {
    document_type_id: Option<Uuid>,
    payment_date: Option<NaiveDate>,
    bill_date: Option<NaiveDate>,
    bill_concept: Option<&'a str>,
    description: Option<&'a str>,
    updated_at: chrono::NaiveDateTime,
}

/// Builds the conjunctive filter for the bill list. Each sub-condition is
/// dropped entirely when its input is absent, so an empty query matches all
/// bills. Called twice per request because a boxed query cannot be cloned:
/// once for the count, once for the page.
fn filtered_bills(params: &BillListQuery) -> bills::BoxedQuery<'_, diesel::pg::Pg> {
    let mut query = bills::table.into_boxed();

    if let Some(folio) = params
        .folio
        .as_deref()
        .map(str::trim)
        .filter(|folio| !folio.is_empty())
    {
        // Case-sensitive prefix match on the timestamp-derived folio.
        query = query.filter(bills::folio.like(format!("{folio}%")));
    }

    if let Some(author_id) = params.author_id {
        query = query.filter(bills::author_id.eq(author_id));
    }

    if let Some(document_type_id) = params.document_type_id {
        query = query.filter(bills::document_type_id.eq(document_type_id));
    }

    if let Some(tag_id) = params.tag_id {
        let tagged = bill_tags::table
            .filter(bill_tags::tag_id.eq(tag_id))
            .select(bill_tags::bill_id);
        query = query.filter(bills::id.eq_any(tagged));
    }

    query
}

pub async fn list_bills(
    State(state): State<AppState>,
    Query(params): Query<BillListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<BillListResponse>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ViewBills)?;

    let total: i64 = filtered_bills(&params).count().get_result(&mut conn)?;

    // Clamped on both ends so a hostile page number cannot overflow the
    // offset computation; far-out pages just come back empty.
    let page = params.page.unwrap_or(1).clamp(1, i64::MAX / PAGE_SIZE);
    let loaded: Vec<Bill> = filtered_bills(&params)
        .order(bills::folio.desc())
        .offset((page - 1) * PAGE_SIZE)
        .limit(PAGE_SIZE)
        .load(&mut conn)?;

    let summaries = to_bill_responses(&mut conn, loaded)?;

    Ok(Json(BillListResponse {
        bills: summaries,
        page,
        per_page: PAGE_SIZE,
        total,
    }))
}

pub async fn bill_options(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<BillOptionsResponse>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::CreateBills)?;

    let active_types: Vec<DocumentType> = document_types::table
        .filter(document_types::is_active.eq(true))
        .order(document_types::name.asc())
        .load(&mut conn)?;
    let active_tags: Vec<Tag> = tags::table
        .filter(tags::is_active.eq(true))
        .order(tags::name.asc())
        .load(&mut conn)?;

    Ok(Json(BillOptionsResponse {
        document_types: active_types.into_iter().map(Into::into).collect(),
        tags: active_tags.into_iter().map(Into::into).collect(),
    }))
}

pub async fn get_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<BillDetailResponse>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::ViewBills)?;

    let bill: Bill = bills::table.find(bill_id).first(&mut conn)?;
    let detail = to_bill_detail(&mut conn, bill)?;
    Ok(Json(detail))
}

struct BillForm {
    document_type_id: Option<Uuid>,
    payment_date: Option<NaiveDate>,
    bill_date: Option<NaiveDate>,
    bill_concept: Option<String>,
    description: Option<String>,
    tag_ids: Vec<Uuid>,
    groups: HashMap<&'static str, Vec<UploadedBlob>>,
}

async fn parse_bill_multipart(mut multipart: Multipart) -> AppResult<BillForm> {
    let mut form = BillForm {
        document_type_id: None,
        payment_date: None,
        bill_date: None,
        bill_concept: None,
        description: None,
        tag_ids: Vec::new(),
        groups: GROUP_FIELDS.iter().map(|name| (*name, Vec::new())).collect(),
    };

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        let Some(name) = name else { continue };

        if let Some(slot) = GROUP_FIELDS.iter().find(|slot| **slot == name) {
            let original_name = field
                .file_name()
                .map(|n| n.to_string())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| AppError::bad_request(format!("{slot}: filename is required")))?;
            let content_type = field.content_type().map(|mime| mime.to_string());
            let bytes = field.bytes().await.map_err(|err| {
                error!(error = %err, field = *slot, "failed to read file bytes");
                AppError::bad_request(format!("failed to read file bytes: {err}"))
            })?;
            if bytes.is_empty() {
                return Err(AppError::bad_request(format!(
                    "{slot}: uploaded file must not be empty"
                )));
            }
            form.groups
                .get_mut(slot)
                .expect("slot preseeded")
                .push(UploadedBlob {
                    bytes: bytes.to_vec(),
                    original_name,
                    content_type,
                });
            continue;
        }

        let value = field.text().await.map_err(|err| {
            AppError::bad_request(format!("invalid value for field {name}: {err}"))
        })?;
        let value = value.trim().to_string();

        match name.as_str() {
            "document_type_id" => {
                form.document_type_id = Some(
                    Uuid::parse_str(&value)
                        .map_err(|_| AppError::bad_request("document_type_id must be a UUID"))?,
                );
            }
            "payment_date" => {
                form.payment_date = Some(parse_date("payment_date", &value)?);
            }
            "bill_date" => {
                form.bill_date = Some(parse_date("bill_date", &value)?);
            }
            "bill_concept" => form.bill_concept = Some(value),
            "description" => form.description = Some(value),
            "tag_ids" => {
                for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let tag_id = Uuid::parse_str(part)
                        .map_err(|_| AppError::bad_request("tag_ids must be UUIDs"))?;
                    if !form.tag_ids.contains(&tag_id) {
                        form.tag_ids.push(tag_id);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("{field} must be a YYYY-MM-DD date")))
}

pub async fn create_bill(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<BillDetailResponse>)> {
    {
        let mut conn = state.db()?;
        permissions::require(&mut conn, &user, Permission::CreateBills)?;
    }

    let mut form = parse_bill_multipart(multipart).await?;

    let document_type_id = form
        .document_type_id
        .ok_or_else(|| AppError::bad_request("document_type_id is required"))?;
    let payment_date = form
        .payment_date
        .ok_or_else(|| AppError::bad_request("payment_date is required"))?;
    let bill_date = form
        .bill_date
        .ok_or_else(|| AppError::bad_request("bill_date is required"))?;
    let bill_concept = form
        .bill_concept
        .take()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request("bill_concept is required"))?;
    let description = form
        .description
        .take()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request("description is required"))?;

    // Every attachment slot needs at least one file at creation time.
    for slot in GROUP_FIELDS {
        if form.groups.get(slot).map(Vec::len).unwrap_or(0) == 0 {
            return Err(AppError::bad_request(format!(
                "{slot}: at least one file is required"
            )));
        }
    }

    {
        let mut conn = state.db()?;

        let document_type: Option<DocumentType> = document_types::table
            .find(document_type_id)
            .filter(document_types::is_active.eq(true))
            .first(&mut conn)
            .optional()?;
        if document_type.is_none() {
            return Err(AppError::bad_request("unknown or inactive document type"));
        }

        if !form.tag_ids.is_empty() {
            let known: i64 = tags::table
                .filter(tags::id.eq_any(&form.tag_ids))
                .filter(tags::is_active.eq(true))
                .count()
                .get_result(&mut conn)?;
            if known != form.tag_ids.len() as i64 {
                return Err(AppError::bad_request("one or more tags are unknown or inactive"));
            }
        }
    }

    // Blobs hit the store before any row references them. A crash between
    // here and the commit leaves orphaned blobs, never dangling rows.
    let mut prepared: Vec<PreparedGroup> = Vec::with_capacity(GROUP_FIELDS.len());
    for slot in GROUP_FIELDS {
        let blobs = form.groups.remove(slot).expect("slot preseeded");
        prepared.push(uploads::prepare_group(&state, user.user_id, blobs).await?);
    }

    let bill_id = Uuid::new_v4();
    let folio = uploads::make_folio(Utc::now());
    let tag_ids = form.tag_ids.clone();

    let bill = {
        let mut conn = state.db()?;
        conn.transaction::<Bill, AppError, _>(|conn| {
            for group in &prepared {
                uploads::insert_group(conn, group)?;
            }

            let new_bill = NewBill {
                id: bill_id,
                author_id: user.user_id,
                document_type_id,
                folio: folio.clone(),
                payment_date,
                bill_date,
                bill_concept: bill_concept.clone(),
                description: description.clone(),
                pdf_group_id: prepared[0].group_id,
                client_deposit_group_id: prepared[1].group_id,
                deposit_group_id: prepared[2].group_id,
            };
            diesel::insert_into(bills::table)
                .values(&new_bill)
                .execute(conn)?;

            for tag_id in &tag_ids {
                diesel::insert_into(bill_tags::table)
                    .values(&NewBillTag {
                        bill_id,
                        tag_id: *tag_id,
                    })
                    .execute(conn)?;
            }

            let bill: Bill = bills::table.find(bill_id).first(conn)?;
            Ok(bill)
        })?
    };

    info!(bill_id = %bill.id, folio = %bill.folio, author_id = %user.user_id, "bill created");

    let mut conn = state.db()?;
    let detail = to_bill_detail(&mut conn, bill)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn update_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateBillRequest>,
) -> AppResult<Json<BillDetailResponse>> {
    let mut conn = state.db()?;
    permissions::require(&mut conn, &user, Permission::EditBills)?;

    let bill: Bill = bills::table.find(bill_id).first(&mut conn)?;

    if let Some(document_type_id) = payload.document_type_id {
        let exists: Option<DocumentType> = document_types::table
            .find(document_type_id)
            .first(&mut conn)
            .optional()?;
        if exists.is_none() {
            return Err(AppError::bad_request("unknown document type"));
        }
    }

    let bill_concept = match payload.bill_concept.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("bill_concept must not be empty")),
        other => other,
    };
    let description = match payload.description.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("description must not be empty")),
        other => other,
    };

    // Metadata only; the attached file groups are never replaced on edit.
    let changeset = BillChangeset {
        document_type_id: payload.document_type_id,
        payment_date: payload.payment_date,
        bill_date: payload.bill_date,
        bill_concept,
        description,
        updated_at: Utc::now().naive_utc(),
    };

    diesel::update(bills::table.find(bill.id))
        .set(&changeset)
        .execute(&mut conn)?;

    let updated: Bill = bills::table.find(bill.id).first(&mut conn)?;
    let detail = to_bill_detail(&mut conn, updated)?;
    Ok(Json(detail))
}

pub async fn delete_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let stored_paths = {
        let mut conn = state.db()?;
        permissions::require(&mut conn, &user, Permission::DeleteBills)?;

        let bill: Bill = bills::table.find(bill_id).first(&mut conn)?;

        conn.transaction::<Vec<String>, AppError, _>(|conn| {
            diesel::delete(bill_tags::table.filter(bill_tags::bill_id.eq(bill.id)))
                .execute(conn)?;
            diesel::delete(bills::table.find(bill.id)).execute(conn)?;

            // Groups are deleted after the bill row so the FK columns never
            // dangle inside the transaction.
            let mut paths = Vec::new();
            for group_id in bill.group_ids() {
                paths.extend(uploads::delete_group_rows(conn, group_id)?);
            }
            Ok(paths)
        })?
    };

    // Blob removal is deliberately outside the transaction: disk is not
    // transactional with the database, and a missing blob is not an error.
    uploads::remove_blobs(&state, &stored_paths).await;

    info!(bill_id = %bill_id, blobs = stored_paths.len(), "bill deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    _user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let file: File = {
        let mut conn = state.db()?;
        files::table.find(file_id).first(&mut conn)?
    };

    let bytes = state.store.get(&file.file_path).await.map_err(|err| {
        warn!(error = %err, file_id = %file.id, path = %file.file_path, "stored blob missing");
        AppError::not_found()
    })?;

    let content_type = file.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&file.original_name)
            .first_or_octet_stream()
            .to_string()
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(disposition) = attachment_content_disposition(&file.original_name) {
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }

    Ok((headers, bytes))
}

fn attachment_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

fn to_bill_responses(conn: &mut PgConnection, loaded: Vec<Bill>) -> AppResult<Vec<BillResponse>> {
    let bill_ids: Vec<Uuid> = loaded.iter().map(|bill| bill.id).collect();
    let tags_map = load_tags_for_bills(conn, &bill_ids)?;

    let author_ids: Vec<Uuid> = loaded.iter().map(|bill| bill.author_id).collect();
    let authors: HashMap<Uuid, User> = users::table
        .filter(users::id.eq_any(&author_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let type_ids: Vec<Uuid> = loaded.iter().map(|bill| bill.document_type_id).collect();
    let types: HashMap<Uuid, DocumentType> = document_types::table
        .filter(document_types::id.eq_any(&type_ids))
        .load::<DocumentType>(conn)?
        .into_iter()
        .map(|doc_type| (doc_type.id, doc_type))
        .collect();

    let mut responses = Vec::with_capacity(loaded.len());
    for bill in loaded {
        let author = authors
            .get(&bill.author_id)
            .ok_or_else(|| AppError::internal("bill author missing"))?;
        let doc_type = types
            .get(&bill.document_type_id)
            .ok_or_else(|| AppError::internal("bill document type missing"))?;
        let bill_tags = tags_map.get(&bill.id).cloned().unwrap_or_default();

        responses.push(BillResponse {
            id: bill.id,
            folio: bill.folio,
            author: AuthorRef {
                id: author.id,
                name: author.name.clone(),
            },
            document_type: doc_type.clone().into(),
            payment_date: bill.payment_date,
            bill_date: bill.bill_date,
            bill_concept: bill.bill_concept,
            description: bill.description,
            tags: bill_tags.into_iter().map(Into::into).collect(),
        });
    }

    Ok(responses)
}

fn to_bill_detail(conn: &mut PgConnection, bill: Bill) -> AppResult<BillDetailResponse> {
    let group_ids = bill.group_ids();
    let mut summaries = to_bill_responses(conn, vec![bill])?;
    let summary = summaries
        .pop()
        .ok_or_else(|| AppError::internal("bill summary missing"))?;

    let [pdf, client_deposit, deposit] = group_ids;
    Ok(BillDetailResponse {
        bill: summary,
        bill_pdf: load_file_group(conn, pdf)?,
        client_deposit_image: load_file_group(conn, client_deposit)?,
        deposit_image: load_file_group(conn, deposit)?,
    })
}

fn load_file_group(conn: &mut PgConnection, group_id: Uuid) -> AppResult<FileGroupRef> {
    let stored: Vec<File> = files::table
        .filter(files::file_group_id.eq(group_id))
        .order(files::file_path.asc())
        .load(conn)?;

    Ok(FileGroupRef {
        id: group_id,
        files: stored
            .into_iter()
            .map(|file| FileRef {
                download_path: format!("/api/bills/files/{}/download", file.id),
                id: file.id,
                original_name: file.original_name,
                content_type: file.content_type,
            })
            .collect(),
    })
}

/// Tags are resolved regardless of their lifecycle state: a bill tagged
/// before a tag was deactivated still shows that tag's name.
fn load_tags_for_bills(
    conn: &mut PgConnection,
    bill_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Tag>>> {
    if bill_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, Tag)> = bill_tags::table
        .inner_join(tags::table)
        .filter(bill_tags::bill_id.eq_any(bill_ids))
        .select((bill_tags::bill_id, tags::all_columns))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for (bill_id, tag) in rows {
        map.entry(bill_id).or_default().push(tag);
    }
    Ok(map)
}
