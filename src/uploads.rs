//! File-group persistence: generated filenames, blob writes and the
//! row bookkeeping that turns a list of uploaded blobs into one FileGroup
//! handle a bill column can point at.

use std::path::Path;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use rand::RngCore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{File, NewFile, NewFileGroup},
    schema::{file_groups, files},
    state::AppState,
};

/// One blob lifted out of a multipart field.
pub struct UploadedBlob {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub content_type: Option<String>,
}

/// A fully prepared group: blobs are on disk, rows are not yet inserted.
pub struct PreparedGroup {
    pub group_id: Uuid,
    pub entries: Vec<PreparedFile>,
}

pub struct PreparedFile {
    pub file_id: Uuid,
    pub file_path: String,
    pub original_name: String,
    pub content_type: Option<String>,
}

/// Bill folios are the creation instant down to the microsecond, formatted
/// without spaces or colons. Lexicographic descending order on folios is the
/// list's reverse-chronological ordering.
pub fn make_folio(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d_%H.%M.%S%.6f").to_string()
}

/// Stored filename: sequence index, timestamp, uploader id, then a random
/// suffix so that two uploads by the same user in the same microsecond
/// cannot collide, keeping the original extension.
pub fn make_stored_filename(
    index: usize,
    now: DateTime<Utc>,
    uploader_id: Uuid,
    original_name: &str,
) -> String {
    let extension = Path::new(original_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!(
        "{index}_{stamp}_{uploader_id}_{rand}{extension}",
        stamp = now.format("%Y-%m-%d_%H.%M.%S%.6f"),
        rand = hex::encode(suffix),
    )
}

/// Writes every blob of one attachment slot to the store and returns the row
/// data for the enclosing transaction to insert. Blobs land on disk before
/// any row references them; a failure here can only orphan blobs, never
/// produce rows pointing at missing files.
pub async fn prepare_group(
    state: &AppState,
    uploader_id: Uuid,
    blobs: Vec<UploadedBlob>,
) -> AppResult<PreparedGroup> {
    let group_id = Uuid::new_v4();
    let now = Utc::now();
    let mut entries = Vec::with_capacity(blobs.len());

    for (index, blob) in blobs.into_iter().enumerate() {
        let file_path = make_stored_filename(index, now, uploader_id, &blob.original_name);
        state
            .store
            .put(&file_path, blob.bytes)
            .await
            .map_err(|err| {
                warn!(error = %err, path = %file_path, "failed to store uploaded blob");
                AppError::internal(format!("failed to store uploaded file: {err}"))
            })?;

        entries.push(PreparedFile {
            file_id: Uuid::new_v4(),
            file_path,
            original_name: blob.original_name,
            content_type: blob.content_type,
        });
    }

    Ok(PreparedGroup { group_id, entries })
}

/// Inserts the group row and its file rows. Runs inside the caller's
/// transaction together with the bill insert.
pub fn insert_group(conn: &mut PgConnection, group: &PreparedGroup) -> QueryResult<()> {
    diesel::insert_into(file_groups::table)
        .values(&NewFileGroup { id: group.group_id })
        .execute(conn)?;

    for entry in &group.entries {
        diesel::insert_into(files::table)
            .values(&NewFile {
                id: entry.file_id,
                file_group_id: group.group_id,
                file_path: entry.file_path.clone(),
                original_name: entry.original_name.clone(),
                content_type: entry.content_type.clone(),
            })
            .execute(conn)?;
    }

    Ok(())
}

/// Deletes the file rows and the group row, returning the stored paths so the
/// caller can drop the blobs after the transaction commits.
pub fn delete_group_rows(conn: &mut PgConnection, group_id: Uuid) -> QueryResult<Vec<String>> {
    let stored: Vec<File> = files::table
        .filter(files::file_group_id.eq(group_id))
        .load(conn)?;

    diesel::delete(files::table.filter(files::file_group_id.eq(group_id))).execute(conn)?;
    diesel::delete(file_groups::table.find(group_id)).execute(conn)?;

    Ok(stored.into_iter().map(|file| file.file_path).collect())
}

/// Best-effort blob removal after the rows are gone. An already-absent blob
/// is not an error.
pub async fn remove_blobs(state: &AppState, paths: &[String]) {
    for path in paths {
        match state.store.remove(path).await {
            Ok(true) => debug!(path = %path, "deleted stored blob"),
            Ok(false) => debug!(path = %path, "stored blob already absent"),
            Err(err) => warn!(error = %err, path = %path, "failed to delete stored blob"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{make_folio, make_stored_filename};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn folio_is_path_safe_and_sortable() {
        let earlier = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 1).unwrap();

        let a = make_folio(earlier);
        let b = make_folio(later);

        assert!(!a.contains(' '));
        assert!(!a.contains(':'));
        assert!(a < b, "folios must sort chronologically: {a} vs {b}");
        assert!(a.starts_with("2024-03-05_09.30.00"));
    }

    #[test]
    fn stored_filename_keeps_extension_and_order() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
        let uploader = Uuid::new_v4();

        let name = make_stored_filename(2, now, uploader, "invoice.PDF");
        assert!(name.starts_with("2_2024-03-05_09.30.00"));
        assert!(name.ends_with(".PDF"));
        assert!(name.contains(&uploader.to_string()));
        assert!(!name.contains(' '));
        assert!(!name.contains(':'));
    }

    #[test]
    fn stored_filename_handles_missing_extension() {
        let now = Utc::now();
        let name = make_stored_filename(0, now, Uuid::new_v4(), "README");
        assert!(!name.contains('.') || !name.ends_with('.'));
    }

    #[test]
    fn same_instant_same_uploader_does_not_collide() {
        let now = Utc::now();
        let uploader = Uuid::new_v4();
        let a = make_stored_filename(0, now, uploader, "a.png");
        let b = make_stored_filename(0, now, uploader, "a.png");
        assert_ne!(a, b);
    }
}
