use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::audit::{AuditEntry, AuditSink};
use crate::config::ServiceConfiguration;
use crate::document::DocumentDirectory;
use crate::error::{ErrorKind, SigningError};
use crate::geometry::PageSize;
use crate::link::LinkSigner;
use crate::pdf;
use crate::signature::{NewSignature, Signature, SignatureStatus, StatusChange};
use crate::store::SignatureStore;

/// The authenticated identity an operation runs as. Identity is always an
/// explicit parameter at this boundary, never ambient state, so callers can
/// not accidentally act as whoever happened to be cached somewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
}

/// An authenticated request to place a signature field on a document page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    pub document_id: String,
    /// Position in PDF points, top-left origin (already transformed from
    /// preview space by the caller, see the geometry module).
    pub x: f64,
    pub y: f64,
    pub page: u32,
    pub value: Option<String>,
    pub font: Option<String>,
}

/// A request to burn a signature's text into the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub document_id: String,
    pub signature_text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "first_page")]
    pub page: u32,
    pub font: Option<String>,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn first_page() -> u32 {
    1
}

fn default_font_size() -> f64 {
    pdf::DEFAULT_FONT_SIZE
}

/// Where the finalized artifact was written, served to the caller as a
/// static download.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub signed_path: PathBuf,
}

/// An anonymous signing request made against a capability link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSignRequest {
    pub x: f64,
    pub y: f64,
    pub page: u32,
    pub signer_name: String,
}

/// The operation surface of the signing core, composing the document
/// directory, the signature store, the link signer, the finalization engine
/// and the audit sink. Every operation is a short-lived, stateless handler;
/// the store is the only shared mutable resource and guards itself.
pub struct SigningService<Documents, Store, Audit> {
    documents: Documents,
    store: Store,
    link_signer: LinkSigner,
    audit: Audit,
    storage_directory: PathBuf,
    public_base_url: String,
}

impl<Documents, Store, Audit> SigningService<Documents, Store, Audit>
where
    Documents: DocumentDirectory,
    Store: SignatureStore,
    Audit: AuditSink,
{
    pub fn new(
        configuration: &ServiceConfiguration,
        documents: Documents,
        store: Store,
        audit: Audit,
    ) -> Result<Self, SigningError> {
        let signing_key = configuration.decoded_signing_key()?;
        Ok(SigningService {
            documents,
            store,
            link_signer: LinkSigner::new(signing_key),
            audit,
            storage_directory: configuration.storage_directory.clone(),
            public_base_url: configuration.public_base_url.clone(),
        })
    }

    /// Creates a pending signature field for the acting user. The document
    /// must exist; the position is trusted to already be in PDF-point space.
    pub fn place_signature(
        &self,
        actor: &Actor,
        request: PlacementRequest,
    ) -> Result<Signature, SigningError> {
        let document = self.documents.fetch(&request.document_id)?;
        let record = self.store.create(NewSignature {
            document_id: document.id,
            user_id: Some(actor.user_id.clone()),
            x: request.x,
            y: request.y,
            page: request.page,
            value: request.value,
            font: request.font,
            status: SignatureStatus::Pending,
            signer_name: None,
        })?;
        self.record_audit(&record.document_id, Some(&actor.user_id), "placed");

        Ok(record)
    }

    /// All signature records for a document, oldest first.
    pub fn signatures_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<Signature>, SigningError> {
        let mut records = self.store.list_by_document(document_id)?;
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    /// One signature record by id.
    pub fn signature(&self, signature_id: &str) -> Result<Signature, SigningError> {
        self.store.get(signature_id)
    }

    /// Accepts or rejects a pending signature. Terminal records refuse
    /// further updates (a `Conflict`), so the fields stamped by the first
    /// transition are never overwritten.
    pub fn update_status(
        &self,
        actor: &Actor,
        signature_id: &str,
        change: StatusChange,
    ) -> Result<Signature, SigningError> {
        let updated = self.store.update_status(signature_id, change)?;
        let action = match &updated.status {
            SignatureStatus::Signed { .. } => "signed",
            SignatureStatus::Rejected { .. } => "rejected",
            SignatureStatus::Pending => "placed",
        };
        self.record_audit(&updated.document_id, Some(&actor.user_id), action);

        Ok(updated)
    }

    /// The dimensions of the document's first page in points, for sizing the
    /// preview element. Degrades to the default A4 dimensions when the stored
    /// bytes cannot be read or parsed.
    pub fn preview_page_size(&self, document_id: &str) -> Result<PageSize, SigningError> {
        let document = self.documents.fetch(document_id)?;
        let (width, height) = match std::fs::read(&document.file_path) {
            Ok(document_bytes) => pdf::page_size(&document_bytes),
            Err(_) => pdf::DEFAULT_PAGE_SIZE,
        };
        Ok(PageSize { width, height })
    }

    /// Issues a public signing link for a document the actor owns. The
    /// returned URL embeds a stateless capability token; nothing about it is
    /// persisted.
    pub fn issue_signing_link(
        &self,
        actor: &Actor,
        document_id: &str,
    ) -> Result<String, SigningError> {
        let document = self.documents.fetch(document_id)?;
        if document.owner_id != actor.user_id {
            return Err(SigningError::with_context(
                ErrorKind::Unauthorized,
                "Only the document owner can share a signing link",
            ));
        }
        let token = self.link_signer.issue(&document.id)?;
        self.record_audit(document_id, Some(&actor.user_id), "link_issued");

        Ok(format!(
            "{}/public/sign/{}",
            self.public_base_url.trim_end_matches('/'),
            token
        ))
    }

    /// Resolves a capability token to the document it grants signing on, for
    /// the page that renders the public signing view.
    pub fn resolve_signing_link(&self, token: &str) -> Result<String, SigningError> {
        let document_id = self.link_signer.verify(token)?;
        // The link may outlive its document.
        self.documents.fetch(&document_id)?;
        Ok(document_id)
    }

    /// Creates a signature on behalf of an anonymous holder of a valid
    /// capability token. The record is created directly in `Signed` state:
    /// public signers are not subject to the owner's accept/reject review.
    pub fn public_sign(
        &self,
        token: &str,
        request: PublicSignRequest,
    ) -> Result<Signature, SigningError> {
        let document_id = self.link_signer.verify(token)?;
        let document = self.documents.fetch(&document_id)?;
        let record = self.store.create(NewSignature {
            document_id: document.id,
            user_id: None,
            x: request.x,
            y: request.y,
            page: request.page,
            value: None,
            font: None,
            status: SignatureStatus::Signed {
                signed_at: OffsetDateTime::now_utc().unix_timestamp(),
            },
            signer_name: Some(request.signer_name),
        })?;
        self.record_audit(&record.document_id, None, "public_signed");

        Ok(record)
    }

    /// Draws the signature text into the document's PDF and writes the result
    /// as a new artifact, leaving the original upload untouched. Finalization
    /// never changes any signature record's status; callers compose the two
    /// explicitly.
    pub fn finalize(
        &self,
        actor: &Actor,
        request: FinalizeRequest,
    ) -> Result<FinalizeResponse, SigningError> {
        let document = self.documents.fetch(&request.document_id)?;
        let document_bytes = std::fs::read(&document.file_path).map_err(|error| {
            SigningError::with_error(
                ErrorKind::NotFound,
                format!("Unable to read the stored document {:?}", document.file_path),
                &error,
            )
        })?;
        let mut pdf_document = pdf::load_document(&document_bytes)?;

        pdf::stamp_signature_text(
            &mut pdf_document,
            &request.signature_text,
            request.x,
            request.y,
            request.page,
            pdf::SignatureFont::resolve(request.font.as_deref()),
            request.font_size,
        )?;
        let artifact_path = pdf::write_artifact(
            &mut pdf_document,
            &self.storage_directory,
            &document.original_name,
        )?;
        self.record_audit(&document.id, Some(&actor.user_id), "finalized");

        Ok(FinalizeResponse {
            signed_path: artifact_path,
        })
    }

    fn record_audit(&self, document_id: &str, user_id: Option<&str>, action: &str) {
        if let Err(error) = self
            .audit
            .record(AuditEntry::new(document_id, user_id, action))
        {
            log::error!(
                "Unable to record the audit entry for the document {:?}: {}",
                document_id,
                error
            );
        }
    }
}
