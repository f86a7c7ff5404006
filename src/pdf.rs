use std::io::Write as _;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, StringFormat};
use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization as _;

use crate::error::{ErrorKind, SigningError};
use crate::geometry::baseline_flip;

/// The fixed accent color signatures are drawn in, as RGB fractions.
const SIGNATURE_COLOR: [f32; 3] = [0.3, 0.2, 0.6];

/// The font size used when a finalize request does not specify one.
pub const DEFAULT_FONT_SIZE: f64 = 24.0;

/// The page dimensions assumed when a document's metadata cannot be read,
/// matching an A4 page in PDF points.
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (595.0, 842.0);

/// The fixed set of fonts a signature can be drawn in. All of them are
/// Standard 14 base fonts, so drawing needs no font file embedded into the
/// document, only a font dictionary naming them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFont {
    TimesRoman,
    TimesItalic,
    HelveticaBold,
    HelveticaOblique,
}

impl SignatureFont {
    /// Resolves a logical font key from a request. Unknown keys fall back to
    /// Times-Roman with a warning instead of failing, which keeps finalization
    /// robust against stale client state.
    pub fn resolve(font_key: Option<&str>) -> SignatureFont {
        match font_key {
            None | Some("TimesRoman") => SignatureFont::TimesRoman,
            Some("times-italic") => SignatureFont::TimesItalic,
            Some("helvetica-bold") => SignatureFont::HelveticaBold,
            Some("helvetica-oblique") => SignatureFont::HelveticaOblique,
            Some(other) => {
                log::warn!(
                    "Unknown font key {:?}, falling back to Times-Roman",
                    other
                );
                SignatureFont::TimesRoman
            }
        }
    }

    /// The PostScript base font name.
    pub fn base_font(&self) -> &'static str {
        match self {
            SignatureFont::TimesRoman => "Times-Roman",
            SignatureFont::TimesItalic => "Times-Italic",
            SignatureFont::HelveticaBold => "Helvetica-Bold",
            SignatureFont::HelveticaOblique => "Helvetica-Oblique",
        }
    }

    /// The name the font is registered under in a page's resource dictionary.
    /// Deterministic per font, so stamping the same page twice reuses the
    /// entry instead of piling up duplicates.
    fn resource_name(&self) -> &'static str {
        match self {
            SignatureFont::TimesRoman => "SigTimesRoman",
            SignatureFont::TimesItalic => "SigTimesItalic",
            SignatureFont::HelveticaBold => "SigHelveticaBold",
            SignatureFont::HelveticaOblique => "SigHelveticaOblique",
        }
    }
}

/// Parses the given bytes as a PDF document. Used both defensively before
/// finalization and by the upload collaborator to refuse non-PDF files at
/// ingestion time.
pub fn load_document(pdf_bytes: &[u8]) -> Result<lopdf::Document, SigningError> {
    lopdf::Document::load_mem(pdf_bytes).map_err(|error| {
        SigningError::with_error(
            ErrorKind::MalformedInput,
            "Unable to parse the bytes as a PDF document",
            &error,
        )
    })
}

/// Probes the dimensions of the first page in points, for sizing the preview
/// element. Any failure along the way, unparseable bytes, a document with no
/// pages, a page tree without a `MediaBox`, degrades to [`DEFAULT_PAGE_SIZE`].
pub fn page_size(pdf_bytes: &[u8]) -> (f64, f64) {
    let document = match lopdf::Document::load_mem(pdf_bytes) {
        Ok(document) => document,
        Err(_) => return DEFAULT_PAGE_SIZE,
    };
    let page_id = document.page_iter().next();
    match page_id {
        Some(page_id) => page_dimensions(&document, page_id),
        None => DEFAULT_PAGE_SIZE,
    }
}

/// Draws the signature text into the loaded document at the stored top-left
/// position, flipping to the PDF's bottom-left baseline convention. The text
/// is appended as a fresh content stream on the target page; nothing already
/// in the document is touched.
///
/// A page number out of range degrades to the first page with a warning; a
/// document with no pages at all is malformed.
pub fn stamp_signature_text(
    document: &mut lopdf::Document,
    signature_text: &str,
    x: f64,
    y: f64,
    page_number: u32,
    font: SignatureFont,
    font_size: f64,
) -> Result<(), SigningError> {
    let pages = document.get_pages();
    let page_id = match pages.get(&page_number) {
        Some(page_id) => *page_id,
        None => {
            let first_page_id = pages.values().next().copied().ok_or(
                SigningError::with_context(
                    ErrorKind::MalformedInput,
                    "Unable to draw the signature: the document has no pages",
                ),
            )?;
            log::warn!(
                "Page {} is out of range for a {}-page document, drawing on the first page",
                page_number,
                pages.len()
            );
            first_page_id
        }
    };

    let (_, page_height) = page_dimensions(document, page_id);
    let draw_y = baseline_flip(page_height, y, font_size);

    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    });
    register_page_font(document, page_id, font.resource_name(), font_id)?;

    let [red, green, blue] = SIGNATURE_COLOR;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![font.resource_name().into(), (font_size as f32).into()],
            ),
            Operation::new(
                "rg",
                vec![red, green, blue]
                    .into_iter()
                    .map(Object::Real)
                    .collect(),
            ),
            Operation::new("Td", vec![(x as f32).into(), (draw_y as f32).into()]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    encode_signature_text(signature_text),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded_content = content.encode().map_err(|error| {
        SigningError::with_error(
            ErrorKind::MalformedInput,
            "Unable to encode the signature content stream",
            &error,
        )
    })?;
    document
        .add_page_contents(page_id, encoded_content)
        .map_err(|error| {
            SigningError::with_error(
                ErrorKind::MalformedInput,
                "Unable to append the signature content stream to the page",
                &error,
            )
        })?;

    Ok(())
}

/// Serializes the document and persists it in the output directory under a
/// name derived from the upload it came from:
/// `{unix milliseconds}-{random fragment}-{original stem}-signed.pdf`. The
/// random fragment keeps two finalizations within the same millisecond from
/// colliding. The bytes go through a temporary file in the same directory and
/// are renamed into place, so a failed write leaves no partial artifact.
pub fn write_artifact(
    document: &mut lopdf::Document,
    output_directory: &Path,
    original_name: &str,
) -> Result<PathBuf, SigningError> {
    let mut document_bytes = Vec::new();
    document.save_to(&mut document_bytes).map_err(|error| {
        SigningError::with_error(
            ErrorKind::Storage,
            "Unable to serialize the finalized document",
            &error,
        )
    })?;

    let stem = original_name.strip_suffix(".pdf").unwrap_or(original_name);
    let milliseconds = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let fragment = uuid::Uuid::new_v4().simple().to_string();
    let artifact_path = output_directory.join(format!(
        "{}-{}-{}-signed.pdf",
        milliseconds,
        &fragment[..8],
        stem
    ));

    let mut temporary_file =
        tempfile::NamedTempFile::new_in(output_directory).map_err(|error| {
            SigningError::with_error(
                ErrorKind::Storage,
                format!(
                    "Unable to create a temporary file in the output directory {:?}",
                    output_directory
                ),
                &error,
            )
        })?;
    temporary_file.write_all(&document_bytes).map_err(|error| {
        SigningError::with_error(
            ErrorKind::Storage,
            "Unable to write the finalized document to the temporary file",
            &error,
        )
    })?;
    temporary_file.persist(&artifact_path).map_err(|error| {
        SigningError::with_error(
            ErrorKind::Storage,
            format!("Unable to move the finalized document into {:?}", artifact_path),
            &error,
        )
    })?;
    log::info!("Wrote the finalized document {:?}", artifact_path);

    Ok(artifact_path)
}

/// Walks a page's `Parent` chain looking for an inherited `MediaBox` and
/// returns its width and height, defaulting to [`DEFAULT_PAGE_SIZE`] when the
/// metadata is missing or mangled.
fn page_dimensions(document: &lopdf::Document, page_id: ObjectId) -> (f64, f64) {
    let mut current = Some(page_id);
    while let Some(object_id) = current {
        let page_dictionary = match document
            .get_object(object_id)
            .and_then(|object| object.as_dict())
        {
            Ok(dictionary) => dictionary,
            Err(_) => return DEFAULT_PAGE_SIZE,
        };
        if let Some(dimensions) = media_box_dimensions(document, page_dictionary) {
            return dimensions;
        }
        current = page_dictionary
            .get(b"Parent")
            .and_then(|parent| parent.as_reference())
            .ok();
    }
    DEFAULT_PAGE_SIZE
}

fn media_box_dimensions(
    document: &lopdf::Document,
    page_dictionary: &Dictionary,
) -> Option<(f64, f64)> {
    let media_box = page_dictionary.get(b"MediaBox").ok()?;
    let resolved = match media_box {
        Object::Reference(object_id) => document.get_object(*object_id).ok()?,
        other => other,
    };
    let corners = resolved.as_array().ok()?;
    if corners.len() != 4 {
        return None;
    }
    let lower_left_x = object_as_f64(&corners[0])?;
    let lower_left_y = object_as_f64(&corners[1])?;
    let upper_right_x = object_as_f64(&corners[2])?;
    let upper_right_y = object_as_f64(&corners[3])?;
    Some((upper_right_x - lower_left_x, upper_right_y - lower_left_y))
}

fn object_as_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(integer) => Some(*integer as f64),
        Object::Real(real) => Some((*real).into()),
        _ => None,
    }
}

/// Where a (sub-)dictionary of a page lives: inline on the page itself or
/// behind an indirect reference.
#[derive(Clone, Copy)]
enum ResourceLocation {
    OnPage,
    Indirect(ObjectId),
}

/// Registers the font under the given name in the page's resource dictionary.
/// Both the resources and the font sub-dictionary may be stored inline or
/// behind an indirect reference; every combination is handled without
/// discarding entries that are already there.
fn register_page_font(
    document: &mut lopdf::Document,
    page_id: ObjectId,
    resource_name: &str,
    font_id: ObjectId,
) -> Result<(), SigningError> {
    // Locate the resource dictionary, creating an inline one when absent.
    let resources_location = {
        let page_dictionary = document
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|_| {
                SigningError::with_context(
                    ErrorKind::MalformedInput,
                    "Unable to register the signature font: the page has no dictionary",
                )
            })?;
        match page_dictionary.get(b"Resources") {
            Ok(Object::Reference(resources_id)) => ResourceLocation::Indirect(*resources_id),
            Ok(Object::Dictionary(_)) => ResourceLocation::OnPage,
            _ => {
                page_dictionary.set("Resources", Object::Dictionary(dictionary! {}));
                ResourceLocation::OnPage
            }
        }
    };

    // Locate the font sub-dictionary the same way.
    let font_location = {
        let resources = resources_dictionary_mut(document, page_id, resources_location)?;
        match resources.get(b"Font") {
            Ok(Object::Reference(fonts_id)) => ResourceLocation::Indirect(*fonts_id),
            Ok(Object::Dictionary(_)) => ResourceLocation::OnPage,
            _ => {
                resources.set("Font", Object::Dictionary(dictionary! {}));
                ResourceLocation::OnPage
            }
        }
    };

    let fonts_error = || {
        SigningError::with_context(
            ErrorKind::MalformedInput,
            "Unable to register the signature font: the font resources are not a dictionary",
        )
    };
    match font_location {
        ResourceLocation::OnPage => {
            resources_dictionary_mut(document, page_id, resources_location)?
                .get_mut(b"Font")
                .and_then(|object| object.as_dict_mut())
                .map_err(|_| fonts_error())?
                .set(resource_name, Object::Reference(font_id));
        }
        ResourceLocation::Indirect(fonts_id) => {
            document
                .get_object_mut(fonts_id)
                .and_then(|object| object.as_dict_mut())
                .map_err(|_| fonts_error())?
                .set(resource_name, Object::Reference(font_id));
        }
    }

    Ok(())
}

fn resources_dictionary_mut(
    document: &mut lopdf::Document,
    page_id: ObjectId,
    location: ResourceLocation,
) -> Result<&mut Dictionary, SigningError> {
    let resources_error = || {
        SigningError::with_context(
            ErrorKind::MalformedInput,
            "Unable to register the signature font: the page resources are not a dictionary",
        )
    };
    match location {
        ResourceLocation::OnPage => document
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|_| resources_error())?
            .get_mut(b"Resources")
            .and_then(|object| object.as_dict_mut())
            .map_err(|_| resources_error()),
        ResourceLocation::Indirect(resources_id) => document
            .get_object_mut(resources_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|_| resources_error()),
    }
}

/// Normalizes the signature text to NFC and encodes it for a `WinAnsiEncoding`
/// literal string. Characters beyond the Latin-1 range have no representation
/// in the Standard 14 single-byte encodings; they are replaced with `?` and
/// logged, the same degrade-don't-fail treatment the unknown-font path gets.
fn encode_signature_text(signature_text: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(signature_text.len());
    for character in signature_text.nfc() {
        if (character as u32) <= 0xFF {
            encoded.push(character as u8);
        } else {
            log::warn!(
                "Unable to encode the character {:?} in the signature font, replacing it",
                character
            );
            encoded.push(b'?');
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use lopdf::Stream;

    use super::*;

    /// A minimal one-page document with the given media box.
    fn sample_document(width: f64, height: f64) -> lopdf::Document {
        let mut document = lopdf::Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let content_id = document.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(width as f32),
                Object::Real(height as f32),
            ],
            "Contents" => Object::Reference(content_id),
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));
        document
    }

    fn document_bytes(document: &mut lopdf::Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        document.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn unknown_font_keys_resolve_to_the_serif_fallback() {
        assert_eq!(
            SignatureFont::resolve(Some("comic-sans")),
            SignatureFont::TimesRoman
        );
        assert_eq!(SignatureFont::resolve(None), SignatureFont::TimesRoman);
        assert_eq!(
            SignatureFont::resolve(Some("helvetica-bold")),
            SignatureFont::HelveticaBold
        );
    }

    #[test]
    fn page_size_reads_the_media_box_and_defaults_on_garbage() {
        let mut document = sample_document(612.0, 792.0);
        let bytes = document_bytes(&mut document);
        let (width, height) = page_size(&bytes);
        assert!((width - 612.0).abs() < 0.5);
        assert!((height - 792.0).abs() < 0.5);

        assert_eq!(page_size(b"not a pdf at all"), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn stamping_appends_a_content_stream_with_the_flipped_baseline() {
        let mut document = sample_document(595.0, 842.0);
        stamp_signature_text(
            &mut document,
            "Ada Lovelace",
            100.0,
            100.0,
            1,
            SignatureFont::TimesItalic,
            16.0,
        )
        .unwrap();

        let page_id = document.page_iter().next().unwrap();
        let content = document.get_page_content(page_id).unwrap();
        let content_text = String::from_utf8_lossy(&content).to_string();
        assert!(content_text.contains("(Ada Lovelace) Tj"));
        // 842 - 100 - 16
        assert!(content_text.contains("726"));
        assert!(content_text.contains("SigTimesItalic"));

        // The font landed in the page resources under its deterministic name.
        let reloaded = load_document(&document_bytes(&mut document)).unwrap();
        let page_id = reloaded.page_iter().next().unwrap();
        let (resources, _) = reloaded.get_page_resources(page_id);
        let fonts = resources
            .unwrap()
            .get(b"Font")
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(fonts.has(b"SigTimesItalic"));
    }

    #[test]
    fn fonts_register_into_an_indirect_resources_dictionary() {
        let mut document = sample_document(595.0, 842.0);
        let page_id = document.page_iter().next().unwrap();

        // The page keeps its resources behind an indirect reference, with a
        // font already registered there.
        let existing_font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => Object::Dictionary(dictionary! {
                "F1" => Object::Reference(existing_font_id),
            }),
        });
        document
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .unwrap()
            .set("Resources", Object::Reference(resources_id));

        stamp_signature_text(
            &mut document,
            "Ada Lovelace",
            100.0,
            100.0,
            1,
            SignatureFont::TimesRoman,
            16.0,
        )
        .unwrap();

        // The font landed in the referenced dictionary, next to the entry
        // that was already there.
        let fonts = document
            .get_object(resources_id)
            .and_then(|object| object.as_dict())
            .unwrap()
            .get(b"Font")
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(fonts.has(b"SigTimesRoman"));
        assert!(fonts.has(b"F1"));

        // The page still points at the same indirect resources object.
        let page_resources = document
            .get_object(page_id)
            .and_then(|object| object.as_dict())
            .unwrap()
            .get(b"Resources")
            .unwrap();
        assert!(matches!(page_resources, Object::Reference(id) if *id == resources_id));
    }

    #[test]
    fn fonts_register_into_an_indirect_font_sub_dictionary() {
        let mut document = sample_document(595.0, 842.0);
        let page_id = document.page_iter().next().unwrap();

        // Inline resources whose font sub-dictionary is itself indirect.
        let existing_font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let fonts_id = document.add_object(dictionary! {
            "F1" => Object::Reference(existing_font_id),
        });
        document
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .unwrap()
            .set(
                "Resources",
                Object::Dictionary(dictionary! {
                    "Font" => Object::Reference(fonts_id),
                }),
            );

        stamp_signature_text(
            &mut document,
            "Ada Lovelace",
            100.0,
            100.0,
            1,
            SignatureFont::HelveticaBold,
            16.0,
        )
        .unwrap();

        let fonts = document
            .get_object(fonts_id)
            .and_then(|object| object.as_dict())
            .unwrap();
        assert!(fonts.has(b"SigHelveticaBold"));
        assert!(fonts.has(b"F1"));
    }

    #[test]
    fn out_of_range_pages_fall_back_to_the_first_page() {
        let mut document = sample_document(595.0, 842.0);
        stamp_signature_text(
            &mut document,
            "Ada Lovelace",
            50.0,
            50.0,
            7,
            SignatureFont::TimesRoman,
            16.0,
        )
        .unwrap();
        let page_id = document.page_iter().next().unwrap();
        let content = document.get_page_content(page_id).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("(Ada Lovelace) Tj"));
    }

    #[test]
    fn characters_outside_latin_1_are_replaced() {
        assert_eq!(encode_signature_text("Ana"), b"Ana".to_vec());
        assert_eq!(encode_signature_text("日本"), b"??".to_vec());
    }

    #[test]
    fn artifact_names_are_traceable_and_unique() {
        let directory = tempfile::tempdir().unwrap();
        let mut document = sample_document(595.0, 842.0);

        let first = write_artifact(&mut document, directory.path(), "contract.pdf").unwrap();
        let second = write_artifact(&mut document, directory.path(), "contract.pdf").unwrap();
        assert_ne!(first, second);

        let file_name = first.file_name().unwrap().to_str().unwrap();
        assert!(file_name.contains("contract"));
        assert!(file_name.ends_with("-signed.pdf"));
        assert!(!file_name.contains(".pdf-signed"));
    }
}
