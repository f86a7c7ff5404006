use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq as _;
use time::{Duration, OffsetDateTime};

use crate::error::{ErrorKind, SigningError};

type HmacSha256 = Hmac<Sha256>;

/// How long an issued signing link stays valid.
pub const LINK_VALIDITY: Duration = Duration::hours(48);

/// The claims embedded in a signing link token. The token grants exactly one
/// capability, creating a signature for this document, so the document id and
/// the expiry instant are all there is.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkClaims {
    document_id: String,
    /// Seconds since the Unix epoch.
    expires_at: i64,
}

/// Issues and verifies the public-signing capability tokens. The protocol is
/// fully stateless: nothing is persisted per token, validity is a function of
/// the MAC and the embedded expiry alone, and verification keeps working
/// across process restarts as long as the signing key is stable.
///
/// A token is two URL-safe base64 segments joined by a dot: the JSON claims
/// and an HMAC-SHA256 tag over the exact claim bytes.
pub struct LinkSigner {
    key: Vec<u8>,
}

impl LinkSigner {
    pub fn new<K: Into<Vec<u8>>>(key: K) -> LinkSigner {
        LinkSigner { key: key.into() }
    }

    /// Produces a token for the given document, expiring [`LINK_VALIDITY`]
    /// from now.
    pub fn issue(&self, document_id: &str) -> Result<String, SigningError> {
        self.issue_at(document_id, OffsetDateTime::now_utc())
    }

    /// As [`issue`](LinkSigner::issue) with an explicit clock, so expiry
    /// behavior can be exercised deterministically.
    pub fn issue_at(
        &self,
        document_id: &str,
        now: OffsetDateTime,
    ) -> Result<String, SigningError> {
        let claims = LinkClaims {
            document_id: document_id.to_string(),
            expires_at: (now + LINK_VALIDITY).unix_timestamp(),
        };
        let claim_bytes = serde_json::to_vec(&claims).map_err(|error| {
            SigningError::with_error(
                ErrorKind::InvalidToken,
                "Unable to encode the signing link claims",
                &error,
            )
        })?;
        let tag = self.tag(&claim_bytes)?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&claim_bytes),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verifies a token and returns the embedded document id, nothing more.
    pub fn verify(&self, token: &str) -> Result<String, SigningError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// As [`verify`](LinkSigner::verify) with an explicit clock.
    pub fn verify_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<String, SigningError> {
        let (claims_segment, tag_segment) =
            token.split_once('.').ok_or(SigningError::with_context(
                ErrorKind::InvalidToken,
                "Unable to verify the signing link: the token has no signature segment",
            ))?;
        let claim_bytes = URL_SAFE_NO_PAD.decode(claims_segment).map_err(|error| {
            SigningError::with_error(
                ErrorKind::InvalidToken,
                "Unable to decode the signing link claims segment",
                &error,
            )
        })?;
        let tag = URL_SAFE_NO_PAD.decode(tag_segment).map_err(|error| {
            SigningError::with_error(
                ErrorKind::InvalidToken,
                "Unable to decode the signing link signature segment",
                &error,
            )
        })?;

        let expected_tag = self.tag(&claim_bytes)?;
        if tag.len() != expected_tag.len()
            || !bool::from(tag.as_slice().ct_eq(expected_tag.as_slice()))
        {
            return Err(SigningError::with_context(
                ErrorKind::InvalidToken,
                "Unable to verify the signing link: the token signature does not match",
            ));
        }

        // Only a token that carries a valid MAC gets its claims parsed.
        let claims: LinkClaims = serde_json::from_slice(&claim_bytes).map_err(|error| {
            SigningError::with_error(
                ErrorKind::InvalidToken,
                "Unable to parse the signing link claims",
                &error,
            )
        })?;
        if now.unix_timestamp() > claims.expires_at {
            return Err(SigningError::with_context(
                ErrorKind::Expired,
                "Unable to verify the signing link: the link has expired",
            ));
        }

        Ok(claims.document_id)
    }

    fn tag(&self, claim_bytes: &[u8]) -> Result<Vec<u8>, SigningError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|error| {
            SigningError::with_error(
                ErrorKind::InvalidToken,
                "Unable to initialize the link signing key",
                &error,
            )
        })?;
        mac.update(claim_bytes);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
