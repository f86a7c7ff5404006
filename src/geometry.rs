use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SigningError};

/// A point measured from the top-left corner of the rendered preview element,
/// in on-screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// A point in the PDF page's own coordinate space, in PDF points. The stored
/// convention is top-left origin with Y increasing downward, matching the
/// preview; the flip to the PDF's bottom-left origin happens at draw time via
/// [`baseline_flip`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfPoint {
    pub x: f64,
    pub y: f64,
}

/// The rendered pixel dimensions of the preview element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSize {
    pub width: f64,
    pub height: f64,
}

/// The dimensions of a PDF page in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Converts a point captured on the preview element into the PDF page's point
/// space. Both axes scale independently, so the result is only meaningful when
/// the preview is displayed at the page's native aspect ratio (the surrounding
/// UI guarantees this).
///
/// The preview dimensions must be strictly positive: a zero or unmeasured
/// preview means the layout has not settled yet and placement must be blocked,
/// so the transform refuses to run instead of producing infinities.
pub fn to_pdf_space(
    screen_point: ScreenPoint,
    preview_size: PreviewSize,
    page_size: PageSize,
) -> Result<PdfPoint, SigningError> {
    require_positive(preview_size.width, preview_size.height, "preview")?;
    Ok(PdfPoint {
        x: screen_point.x / preview_size.width * page_size.width,
        y: screen_point.y / preview_size.height * page_size.height,
    })
}

/// The algebraic inverse of [`to_pdf_space`], used to render already-placed
/// signatures back onto a preview of possibly different size than when they
/// were placed. Here the page dimensions are the divisor, so they carry the
/// positivity requirement.
pub fn to_screen_space(
    pdf_point: PdfPoint,
    preview_size: PreviewSize,
    page_size: PageSize,
) -> Result<ScreenPoint, SigningError> {
    require_positive(page_size.width, page_size.height, "page")?;
    Ok(ScreenPoint {
        x: pdf_point.x / page_size.width * preview_size.width,
        y: pdf_point.y / page_size.height * preview_size.height,
    })
}

/// Converts a stored top-left-origin Y coordinate into the bottom-left-origin
/// baseline the PDF imaging model expects: `page_height - y - font_size`.
pub fn baseline_flip(page_height: f64, y: f64, font_size: f64) -> f64 {
    page_height - y - font_size
}

fn require_positive(width: f64, height: f64, which: &str) -> Result<(), SigningError> {
    if !(width > 0.0 && width.is_finite() && height > 0.0 && height.is_finite()) {
        return Err(SigningError::with_context(
            ErrorKind::Precondition,
            format!(
                "Unable to transform the point: the {} dimensions {}x{} are not strictly positive",
                which, width, height
            ),
        ));
    }
    Ok(())
}
