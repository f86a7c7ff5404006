use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SigningError};

/// What this library needs to know about an uploaded document. Upload,
/// listing and deletion belong to the surrounding service; here a document is
/// only ever resolved by id to find its stored bytes, its owner and the
/// upload name that finalized artifacts derive their own names from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    /// The authenticated user who uploaded the document.
    pub owner_id: String,
    /// Where the uploaded bytes live on disk.
    pub file_path: PathBuf,
    /// The filename the document was uploaded under.
    pub original_name: String,
}

/// The seam to the document collaborator: resolve an id to its record or
/// report that it does not exist.
pub trait DocumentDirectory {
    fn fetch(&self, document_id: &str) -> Result<DocumentRecord, SigningError>;
}

/// A map-backed directory for embedders that manage documents elsewhere and
/// for the test suite.
#[derive(Default)]
pub struct MemoryDirectory {
    documents: Mutex<HashMap<String, DocumentRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> MemoryDirectory {
        MemoryDirectory::default()
    }

    pub fn insert(&self, record: DocumentRecord) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(record.id.clone(), record);
        }
    }
}

impl DocumentDirectory for MemoryDirectory {
    fn fetch(&self, document_id: &str) -> Result<DocumentRecord, SigningError> {
        let documents = self.documents.lock().map_err(|_| {
            SigningError::with_context(
                ErrorKind::Storage,
                "Unable to access the document directory: the lock was poisoned",
            )
        })?;
        documents
            .get(document_id)
            .cloned()
            .ok_or(SigningError::with_context(
                ErrorKind::NotFound,
                format!("Unable to find the document {:?}", document_id),
            ))
    }
}
