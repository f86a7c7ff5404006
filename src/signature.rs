use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ErrorKind, SigningError};

/// The lifecycle state of a signature record. The state carries the data that
/// only exists in that state, so a rejected record without the possibility of
/// a reason, or a `signedAt` stamp on a pending record, cannot be represented
/// at all.
///
/// Serialized records keep the original wire shape: a `status` discriminator
/// next to the optional `signedAt`/`reason` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SignatureStatus {
    /// Created by the authenticated placement flow, awaiting review.
    Pending,
    /// Terminal. Reached either from `Pending` by an explicit update or
    /// directly at creation through the public signing flow.
    #[serde(rename_all = "camelCase")]
    Signed {
        /// Seconds since the Unix epoch at the moment of signing.
        signed_at: i64,
    },
    /// Terminal. Reached from `Pending` only. The reason is optional metadata;
    /// the surrounding UI should prompt for one but its absence is accepted.
    #[serde(rename_all = "camelCase")]
    Rejected { reason: Option<String> },
}

impl SignatureStatus {
    /// Whether the record can still change state. Only `Pending` can.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignatureStatus::Pending)
    }

    /// Applies a requested transition at the given instant. Transitions are
    /// one-way: once a record is `Signed` or `Rejected` any further update is
    /// refused with a `Conflict` error, which keeps `signedAt` and `reason`
    /// immutable for the rest of the record's life.
    pub fn apply(
        &self,
        change: StatusChange,
        at: OffsetDateTime,
    ) -> Result<SignatureStatus, SigningError> {
        if self.is_terminal() {
            return Err(SigningError::with_context(
                ErrorKind::Conflict,
                format!(
                    "Unable to update the signature status: the record is already {}",
                    self.label()
                ),
            ));
        }
        Ok(match change {
            StatusChange::Signed => SignatureStatus::Signed {
                signed_at: at.unix_timestamp(),
            },
            StatusChange::Rejected { reason } => SignatureStatus::Rejected { reason },
        })
    }

    fn label(&self) -> &'static str {
        match self {
            SignatureStatus::Pending => "pending",
            SignatureStatus::Signed { .. } => "signed",
            SignatureStatus::Rejected { .. } => "rejected",
        }
    }
}

/// A status transition requested by a caller. Mirrors the wire payload of the
/// status-update operation: `{"status": "signed"}` or
/// `{"status": "rejected", "reason": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StatusChange {
    Signed,
    #[serde(rename_all = "camelCase")]
    Rejected { reason: Option<String> },
}

/// One signer's mark on one page of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Server-assigned identity.
    pub id: String,
    /// The owning document. Always references a valid document; cascading
    /// deletion is enforced by the surrounding CRUD layer.
    pub document_id: String,
    /// The authenticated owner, or `None` for anonymous public signatures.
    pub user_id: Option<String>,
    /// Position in PDF points, top-left origin (see the geometry module).
    pub x: f64,
    pub y: f64,
    /// 1-indexed page number.
    pub page: u32,
    /// The typed signature text. Absent for legacy and public records, in
    /// which case `signer_name` is the fallback display identity.
    pub value: Option<String>,
    /// Logical font key, resolved against the fixed font table at draw time.
    pub font: Option<String>,
    #[serde(flatten)]
    pub status: SignatureStatus,
    /// Display identity supplied by the public signing flow.
    pub signer_name: Option<String>,
    /// Seconds since the Unix epoch at creation.
    pub created_at: i64,
}

impl Signature {
    /// The text to display for this record: the typed value when present,
    /// otherwise the public signer's name.
    pub fn display_value(&self) -> Option<&str> {
        self.value.as_deref().or(self.signer_name.as_deref())
    }
}

/// The caller-supplied part of a record, before the store assigns identity
/// and a creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignature {
    pub document_id: String,
    pub user_id: Option<String>,
    pub x: f64,
    pub y: f64,
    pub page: u32,
    pub value: Option<String>,
    pub font: Option<String>,
    #[serde(flatten)]
    pub status: SignatureStatus,
    pub signer_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    #[test]
    fn pending_transitions_to_signed_with_a_timestamp() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let status = SignatureStatus::Pending
            .apply(StatusChange::Signed, at)
            .unwrap();
        assert_eq!(
            status,
            SignatureStatus::Signed {
                signed_at: 1_700_000_000
            }
        );
    }

    #[test]
    fn pending_transitions_to_rejected_with_and_without_a_reason() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let with_reason = SignatureStatus::Pending
            .apply(
                StatusChange::Rejected {
                    reason: Some("illegible".into()),
                },
                at,
            )
            .unwrap();
        assert_eq!(
            with_reason,
            SignatureStatus::Rejected {
                reason: Some("illegible".into())
            }
        );

        let without_reason = SignatureStatus::Pending
            .apply(StatusChange::Rejected { reason: None }, at)
            .unwrap();
        assert_eq!(without_reason, SignatureStatus::Rejected { reason: None });
    }

    #[test]
    fn terminal_states_refuse_any_further_transition() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let signed = SignatureStatus::Signed { signed_at: 1 };
        let rejected = SignatureStatus::Rejected { reason: None };

        for status in [signed, rejected] {
            let error = status
                .apply(StatusChange::Signed, at)
                .unwrap_err();
            assert_eq!(error.kind(), crate::error::ErrorKind::Conflict);
            let error = status
                .apply(StatusChange::Rejected { reason: None }, at)
                .unwrap_err();
            assert_eq!(error.kind(), crate::error::ErrorKind::Conflict);
        }
    }

    #[test]
    fn records_serialize_with_the_inline_status_discriminator() {
        let record = Signature {
            id: "sig-1".into(),
            document_id: "doc-1".into(),
            user_id: Some("user-1".into()),
            x: 148.75,
            y: 140.33,
            page: 1,
            value: Some("Ada Lovelace".into()),
            font: Some("times-italic".into()),
            status: SignatureStatus::Signed {
                signed_at: 1_700_000_000,
            },
            signer_name: None,
            created_at: 1_699_999_000,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "signed");
        assert_eq!(json["signedAt"], 1_700_000_000);
        assert_eq!(json["documentId"], "doc-1");
        assert!(json.get("reason").is_none());

        let round_tripped: Signature = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, record);
    }
}
