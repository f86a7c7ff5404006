//! Paraph is the core of a document-signing service: it places typed textual
//! signatures on the pages of uploaded PDFs, tracks each signature through its
//! pending/signed/rejected lifecycle, and finally "finalizes" a signature by
//! drawing its text permanently into the PDF's content stream, producing a new
//! artifact next to the untouched original.
//!
//! The crate is a library with no HTTP layer of its own. The surrounding
//! service owns authentication, uploads and the UI, and reaches this core
//! through the `SigningService` operations in the `service` module; documents
//! and the audit log are collaborators behind small traits. One deliberate
//! exception to the authenticated flow exists: the `link` module issues
//! expiring capability tokens that let an anonymous signer add their mark to
//! one specific document without an account.

/// The module where the preview-space to PDF-space coordinate conversion
/// lives.
///
/// # Introduction
///
/// A signature is placed by clicking a rendered preview of the page, whose
/// on-screen pixel size is arbitrary, but it must be stored in the PDF's own
/// point space so the placement survives any future preview size. The
/// functions here scale each axis independently in both directions and refuse
/// to run on an unmeasured (zero-sized) preview. They also host the one piece
/// of coordinate trickery the rest of the crate relies on: the stored
/// convention is top-left origin like the screen, while the PDF imaging model
/// is bottom-left origin, and `baseline_flip` converts between the two at
/// draw time.
pub mod geometry;

/// This module contains the `SigningError` type which is the error type used
/// throughout this library, a context string plus an optional propagated
/// source error, tagged with an `ErrorKind` so callers can dispatch on the
/// failure class (not-found, unauthorized, expired link, ...). Every kind is
/// terminal for the operation that produced it; nothing in this crate
/// retries.
pub mod error;

/// The signature record and its lifecycle.
///
/// The status is a closed tagged variant, `Pending`, `Signed { signed_at }`
/// or `Rejected { reason }`, so a timestamp without a signature or a reason
/// without a rejection cannot exist by construction. Transitions are one-way
/// out of `Pending`; updating a record already in a terminal state is a
/// `Conflict`.
pub mod signature;

/// Durable CRUD over signature records: the `SignatureStore` trait and a
/// single-file JSON implementation that rewrites its file through a renamed
/// temporary sibling on every mutation.
pub mod store;

/// The seam to the document collaborator: uploads live elsewhere, this crate
/// only resolves document ids to their owner, stored bytes and upload name.
pub mod document;

/// The public capability-link protocol.
///
/// # Introduction
///
/// A document owner can hand out a URL that lets anyone holding it sign that
/// one document for the next 48 hours, without an account. The token in the
/// URL is self-verifying: an HMAC-signed claims segment embedding the
/// document id and the expiry instant, nothing persisted server-side, so a
/// link stays verifiable across process restarts for as long as the signing
/// key is stable. Verification rejects a tampered or malformed token before
/// it ever looks at the claims.
pub mod link;

/// The module where the PDF finalization engine lives.
///
/// # Introduction
///
/// Finalization takes the stored upload, draws the signature text at the
/// stored position in one of the Standard 14 fonts, and writes the result as
/// a new uniquely-named artifact, leaving the upload byte-identical. The
/// engine re-validates the bytes defensively (files can rot between upload
/// and finalize), degrades gracefully on an unknown font key or an
/// out-of-range page, and writes through a temporary file renamed into place
/// so a failed write leaves nothing behind. The page-size probe used for
/// preview sizing lives here too.
pub mod pdf;

/// The operation surface the surrounding service calls: placement, listing,
/// status review, link issuance, public signing and finalization, with
/// camelCase request/response types matching the wire payloads. Identity is
/// an explicit `Actor` parameter on every authenticated operation.
pub mod service;

/// The append-only audit-log seam. Recording is a fire-and-forget side
/// effect; a failing sink is logged and never fails the operation.
pub mod audit;

/// Loading the deployment configuration (storage directory, link signing key,
/// public base URL) from a JSON file.
pub mod config;
