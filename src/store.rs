use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize as _;
use time::OffsetDateTime;

use crate::error::{ErrorKind, SigningError};
use crate::signature::{NewSignature, Signature, StatusChange};

/// Durable CRUD over signature records. The store is deliberately narrow:
/// records are created, listed per document, fetched and status-updated, and
/// nothing else. There is no uniqueness constraint on `(document_id, page)`
/// because multiple signer fields per page are supported, and there is no
/// delete: records disappear only when the surrounding layer cascades a
/// document deletion.
pub trait SignatureStore {
    /// Inserts a record with a server-assigned id and creation timestamp.
    fn create(&self, new_signature: NewSignature) -> Result<Signature, SigningError>;

    /// All records for a document, in no meaningful order; callers needing
    /// ordering sort by `created_at`.
    fn list_by_document(&self, document_id: &str) -> Result<Vec<Signature>, SigningError>;

    /// Applies a status transition to one record.
    fn update_status(
        &self,
        signature_id: &str,
        change: StatusChange,
    ) -> Result<Signature, SigningError>;

    /// Fetches one record by id.
    fn get(&self, signature_id: &str) -> Result<Signature, SigningError>;
}

/// A single-file JSON store. All records live in one pretty-printed JSON
/// array; every mutation rewrites the file through a temporary sibling that is
/// renamed into place, so a crash mid-write leaves the previous state intact.
/// A mutex serializes writers; concurrent creates are independent appends and
/// concurrent status updates on the same id resolve in lock order, with the
/// terminal-state guard bounding what a late writer can do.
pub struct JsonFileStore {
    records_path: PathBuf,
    records: Mutex<Vec<Signature>>,
}

impl JsonFileStore {
    /// Opens the store at the given path, loading any records already there.
    /// A missing file is an empty store; it is created on the first write.
    pub fn open(records_path: &Path) -> Result<JsonFileStore, SigningError> {
        let records = if records_path.exists() {
            let records_content = std::fs::read_to_string(records_path).map_err(|error| {
                SigningError::with_error(
                    ErrorKind::Storage,
                    format!("Unable to read the signature records {:?}", records_path),
                    &error,
                )
            })?;
            serde_json::from_str(&records_content).map_err(|error| {
                SigningError::with_error(
                    ErrorKind::Storage,
                    format!("Unable to parse the signature records {:?}", records_path),
                    &error,
                )
            })?
        } else {
            Vec::new()
        };

        Ok(JsonFileStore {
            records_path: records_path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, Vec<Signature>>, SigningError> {
        self.records.lock().map_err(|_| {
            SigningError::with_context(
                ErrorKind::Storage,
                "Unable to access the signature records: the lock was poisoned by a panicking writer",
            )
        })
    }

    fn persist(&self, records: &[Signature]) -> Result<(), SigningError> {
        let mut content_buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut content_buffer, formatter);
        records.serialize(&mut serializer).map_err(|error| {
            SigningError::with_error(
                ErrorKind::Storage,
                "Unable to serialize the signature records",
                &error,
            )
        })?;

        let parent_directory = match self.records_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temporary_file = tempfile::NamedTempFile::new_in(parent_directory).map_err(
            |error| {
                SigningError::with_error(
                    ErrorKind::Storage,
                    format!(
                        "Unable to create a temporary file next to the signature records {:?}",
                        self.records_path
                    ),
                    &error,
                )
            },
        )?;
        temporary_file.write_all(&content_buffer).map_err(|error| {
            SigningError::with_error(
                ErrorKind::Storage,
                "Unable to write the signature records to the temporary file",
                &error,
            )
        })?;
        temporary_file.persist(&self.records_path).map_err(|error| {
            SigningError::with_error(
                ErrorKind::Storage,
                format!("Unable to move the signature records into {:?}", self.records_path),
                &error,
            )
        })?;

        Ok(())
    }
}

impl SignatureStore for JsonFileStore {
    fn create(&self, new_signature: NewSignature) -> Result<Signature, SigningError> {
        validate(&new_signature)?;

        let record = Signature {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: new_signature.document_id,
            user_id: new_signature.user_id,
            x: new_signature.x,
            y: new_signature.y,
            page: new_signature.page,
            value: new_signature.value,
            font: new_signature.font,
            status: new_signature.status,
            signer_name: new_signature.signer_name,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        };

        let mut records = self.lock_records()?;
        records.push(record.clone());
        self.persist(&records)?;

        Ok(record)
    }

    fn list_by_document(&self, document_id: &str) -> Result<Vec<Signature>, SigningError> {
        let records = self.lock_records()?;
        Ok(records
            .iter()
            .filter(|record| record.document_id == document_id)
            .cloned()
            .collect())
    }

    fn update_status(
        &self,
        signature_id: &str,
        change: StatusChange,
    ) -> Result<Signature, SigningError> {
        let mut records = self.lock_records()?;
        let record = records
            .iter_mut()
            .find(|record| record.id == signature_id)
            .ok_or(SigningError::with_context(
                ErrorKind::NotFound,
                format!("Unable to find the signature {:?}", signature_id),
            ))?;

        record.status = record.status.apply(change, OffsetDateTime::now_utc())?;
        let updated = record.clone();
        self.persist(&records)?;

        Ok(updated)
    }

    fn get(&self, signature_id: &str) -> Result<Signature, SigningError> {
        let records = self.lock_records()?;
        records
            .iter()
            .find(|record| record.id == signature_id)
            .cloned()
            .ok_or(SigningError::with_context(
                ErrorKind::NotFound,
                format!("Unable to find the signature {:?}", signature_id),
            ))
    }
}

fn validate(new_signature: &NewSignature) -> Result<(), SigningError> {
    if new_signature.document_id.is_empty() {
        return Err(SigningError::with_context(
            ErrorKind::Validation,
            "Unable to create the signature: the document id is missing",
        ));
    }
    if new_signature.page == 0 {
        return Err(SigningError::with_context(
            ErrorKind::Validation,
            "Unable to create the signature: the page number is 1-indexed and cannot be 0",
        ));
    }
    if !new_signature.x.is_finite() || !new_signature.y.is_finite() {
        return Err(SigningError::with_context(
            ErrorKind::Validation,
            format!(
                "Unable to create the signature: the position {}x{} is not finite",
                new_signature.x, new_signature.y
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::signature::SignatureStatus;

    use super::*;

    fn pending_record(document_id: &str) -> NewSignature {
        NewSignature {
            document_id: document_id.into(),
            user_id: Some("user-1".into()),
            x: 100.0,
            y: 200.0,
            page: 1,
            value: Some("Ada Lovelace".into()),
            font: Some("times-italic".into()),
            status: SignatureStatus::Pending,
            signer_name: None,
        }
    }

    fn open_store(directory: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::open(&directory.path().join("signatures.json")).unwrap()
    }

    #[test]
    fn created_records_survive_a_reopen() {
        let directory = tempfile::tempdir().unwrap();
        let store = open_store(&directory);
        let created = store.create(pending_record("doc-1")).unwrap();

        let reopened = open_store(&directory);
        let fetched = reopened.get(&created.id).unwrap();
        similar_asserts::assert_eq!(fetched, created);
    }

    #[test]
    fn listing_filters_by_document() {
        let directory = tempfile::tempdir().unwrap();
        let store = open_store(&directory);
        store.create(pending_record("doc-1")).unwrap();
        store.create(pending_record("doc-1")).unwrap();
        store.create(pending_record("doc-2")).unwrap();

        assert_eq!(store.list_by_document("doc-1").unwrap().len(), 2);
        assert_eq!(store.list_by_document("doc-2").unwrap().len(), 1);
        assert!(store.list_by_document("doc-3").unwrap().is_empty());
    }

    #[test]
    fn multiple_records_per_document_and_page_are_accepted() {
        let directory = tempfile::tempdir().unwrap();
        let store = open_store(&directory);
        let first = store.create(pending_record("doc-1")).unwrap();
        let second = store.create(pending_record("doc-1")).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn missing_required_fields_are_refused() {
        let directory = tempfile::tempdir().unwrap();
        let store = open_store(&directory);

        let mut missing_document = pending_record("");
        missing_document.document_id.clear();
        let error = store.create(missing_document).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);

        let mut zero_page = pending_record("doc-1");
        zero_page.page = 0;
        let error = store.create(zero_page).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);

        let mut non_finite = pending_record("doc-1");
        non_finite.y = f64::NAN;
        let error = store.create(non_finite).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn status_updates_stamp_and_then_freeze_the_record() {
        let directory = tempfile::tempdir().unwrap();
        let store = open_store(&directory);
        let created = store.create(pending_record("doc-1")).unwrap();

        let signed = store
            .update_status(&created.id, StatusChange::Signed)
            .unwrap();
        assert!(matches!(signed.status, SignatureStatus::Signed { .. }));

        let error = store
            .update_status(
                &created.id,
                StatusChange::Rejected {
                    reason: Some("changed my mind".into()),
                },
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);

        // The stamp set by the first transition is still there.
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched.status, signed.status);
    }

    #[test]
    fn unknown_ids_report_not_found() {
        let directory = tempfile::tempdir().unwrap();
        let store = open_store(&directory);
        let error = store.get("missing").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
        let error = store
            .update_status("missing", StatusChange::Signed)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
