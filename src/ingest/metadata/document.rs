//! PDF document info and page count, read from the document structure.

use lopdf::{Dictionary, Document, Object};
use serde_json::{json, Value as Json};

use super::{Extracted, FileFacts, MetadataExtractor};
use crate::domain::evidence::MetadataMap;
use crate::error::ExtractionError;

/// Info dictionary entries surfaced as curated fields
const INFO_FIELDS: [(&str, &str); 8] = [
    ("title", "Title"),
    ("author", "Author"),
    ("subject", "Subject"),
    ("keywords", "Keywords"),
    ("creator", "Creator"),
    ("producer", "Producer"),
    ("creationDate", "CreationDate"),
    ("modificationDate", "ModDate"),
];

/// Strategy for `application/pdf`
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl MetadataExtractor for DocumentExtractor {
    fn name(&self) -> &'static str {
        "document"
    }

    fn extract(&self, file: &FileFacts<'_>, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let document = Document::load_mem(bytes).map_err(|e| ExtractionError::Unreadable {
            kind: "PDF",
            reason: e.to_string(),
        })?;

        let info = info_dictionary(&document);

        let mut metadata = MetadataMap::new();
        metadata.insert("pageCount".to_string(), json!(document.get_pages().len()));
        for (key, entry) in INFO_FIELDS {
            let value = info
                .and_then(|dict| dict.get(entry.as_bytes()).ok())
                .and_then(|obj| text(&document, obj));
            metadata.insert(key.to_string(), json!(value));
        }
        metadata.insert("lastModified".to_string(), file.last_modified_json());

        let raw = info.map(|dict| {
            dict.iter()
                .map(|(key, obj)| {
                    let value = text(&document, obj).map(Json::String).unwrap_or(Json::Null);
                    (String::from_utf8_lossy(key).into_owned(), value)
                })
                .collect()
        });

        Ok(Extracted { metadata, raw })
    }
}

/// The trailer's `/Info` dictionary, inline or by reference
fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Text content of an info value, following one level of reference
fn text(document: &Document, obj: &Object) -> Option<String> {
    let obj = match obj {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };

    let value = match obj {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        _ => return None,
    };

    let value = value.trim_matches('\0').trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Decode a PDF text string: UTF-16BE when it carries a byte order mark,
/// otherwise PDFDocEncoding, which agrees with Latin-1 for printable text.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use lopdf::dictionary;

    use super::*;

    fn pdf(pages: usize, info: Option<Dictionary>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                })
                .into()
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if let Some(info) = info {
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn facts() -> FileFacts<'static> {
        FileFacts {
            name: "minutes.pdf",
            media_type: "application/pdf",
            size: 0,
            last_modified: None,
        }
    }

    #[test]
    fn test_info_fields_and_page_count() {
        let bytes = pdf(
            3,
            Some(dictionary! {
                "Title" => Object::string_literal("Board minutes"),
                "Author" => Object::string_literal("Corporate Secretary"),
                "CreationDate" => Object::string_literal("D:20250306090000Z"),
            }),
        );

        let extracted = DocumentExtractor.extract(&facts(), &bytes).unwrap();
        let metadata = &extracted.metadata;

        assert_eq!(metadata["pageCount"], 3);
        assert_eq!(metadata["title"], "Board minutes");
        assert_eq!(metadata["author"], "Corporate Secretary");
        assert_eq!(metadata["creationDate"], "D:20250306090000Z");
        assert!(metadata["producer"].is_null());

        let raw = extracted.raw.unwrap();
        assert_eq!(raw["Title"], "Board minutes");
    }

    #[test]
    fn test_missing_info_dictionary() {
        let bytes = pdf(1, None);
        let extracted = DocumentExtractor.extract(&facts(), &bytes).unwrap();

        assert_eq!(extracted.metadata["pageCount"], 1);
        assert!(extracted.metadata["title"].is_null());
        assert!(extracted.raw.is_none());
    }

    #[test]
    fn test_decode_utf16_strings() {
        let bytes = [0xFE, 0xFF, 0x00, b'M', 0x00, 0xE9, 0x00, b'm'];
        assert_eq!(decode_pdf_string(&bytes), "Mém");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
        assert_eq!(decode_pdf_string(&[0x4D, 0xE9]), "Mé");
    }

    #[test]
    fn test_corrupt_pdf_is_unreadable() {
        let err = DocumentExtractor.extract(&facts(), b"%PDF-1.7 truncated").unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { kind: "PDF", .. }));
    }
}
