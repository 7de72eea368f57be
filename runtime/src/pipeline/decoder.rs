use std::{collections::HashSet, path::Path};

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use super::{
    extractor::PageText,
    utils::{compute_mdhash_id, normalize_extension, sanitize_text},
};

pub const SUPPORTED_EXTENSIONS: &[&str] = &[".txt", ".md", ".json", ".csv", ".pdf"];

const PDF_MAGIC: &[u8] = b"%PDF";

/// Raw document as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentPayload {
    Text {
        text: String,
    },
    File {
        #[serde(default)]
        filename: Option<String>,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
}

/// Uploads travel through the queue file as base64 text.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct DecodedDocument {
    pub text: String,
    pub pages: Vec<PageText>,
    /// `doc-<sha256>` of the submitted bytes (or cleaned text).
    pub content_id: String,
}

pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, payload: &DocumentPayload) -> Result<DecodedDocument>;
}

/// UTF-8 text and PDF decoding.
#[derive(Debug, Clone)]
pub struct DefaultDocumentDecoder {
    supported_extensions: HashSet<String>,
}

impl Default for DefaultDocumentDecoder {
    fn default() -> Self {
        Self::new(SUPPORTED_EXTENSIONS)
    }
}

impl DefaultDocumentDecoder {
    pub fn new(supported_extensions: &[&str]) -> Self {
        Self {
            supported_extensions: supported_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
        }
    }

    pub fn is_supported_file(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|os| os.to_str())
            .map(normalize_extension)
            .is_some_and(|ext| self.supported_extensions.contains(&ext))
    }

    fn decode_file(&self, filename: Option<&str>, bytes: &[u8]) -> Result<(String, Vec<PageText>)> {
        if bytes.is_empty() {
            bail!("file content is empty");
        }
        if let Some(name) = filename {
            if !self.is_supported_file(name) {
                bail!("unsupported file type: {name}");
            }
        }

        if bytes.starts_with(PDF_MAGIC) {
            let raw = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|err| anyhow!("failed to extract pdf text: {err}"))?;
            let pages = split_pages(&raw);
            return Ok((sanitize_text(&raw), pages));
        }

        let text = std::str::from_utf8(bytes).map_err(|_| anyhow!("file is not valid UTF-8"))?;
        Ok((sanitize_text(text), Vec::new()))
    }
}

impl DocumentDecoder for DefaultDocumentDecoder {
    fn decode(&self, payload: &DocumentPayload) -> Result<DecodedDocument> {
        let (text, pages, content_id) = match payload {
            DocumentPayload::Text { text } => {
                let cleaned = sanitize_text(text);
                let id = compute_mdhash_id(&cleaned, "doc-");
                (cleaned, Vec::new(), id)
            }
            DocumentPayload::File { filename, bytes } => {
                let (text, pages) = self.decode_file(filename.as_deref(), bytes)?;
                (text, pages, compute_mdhash_id(bytes, "doc-"))
            }
        };

        if text.is_empty() {
            bail!("document contains no text");
        }

        Ok(DecodedDocument {
            text,
            pages,
            content_id,
        })
    }
}

/// Pages are separated by form feeds in extracted PDF text. Without any
/// separator there is no reliable page information.
fn split_pages(raw: &str) -> Vec<PageText> {
    if !raw.contains('\u{c}') {
        return Vec::new();
    }
    raw.split('\u{c}')
        .enumerate()
        .filter_map(|(index, page)| {
            let text = sanitize_text(page);
            (!text.is_empty()).then(|| PageText {
                page_number: index as u32 + 1,
                text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_bytes_serialize_as_base64() {
        let payload = DocumentPayload::File {
            filename: Some("paper.pdf".into()),
            bytes: b"%PDF-1.7 \x00\xff".to_vec(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["bytes"], "JVBERi0xLjcgAP8=");

        let back: DocumentPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn text_ids_ignore_surrounding_whitespace() {
        let decoder = DefaultDocumentDecoder::default();
        let a = decoder
            .decode(&DocumentPayload::Text {
                text: "Vemurafenib targets BRAF.\r\n".into(),
            })
            .unwrap();
        let b = decoder
            .decode(&DocumentPayload::Text {
                text: "  Vemurafenib targets BRAF.".into(),
            })
            .unwrap();
        assert_eq!(a.content_id, b.content_id);
        assert_eq!(a.text, "Vemurafenib targets BRAF.");
    }

    #[test]
    fn rejects_blank_and_unsupported_input() {
        let decoder = DefaultDocumentDecoder::default();
        assert!(decoder
            .decode(&DocumentPayload::Text { text: "   ".into() })
            .is_err());
        assert!(decoder
            .decode(&DocumentPayload::File {
                filename: Some("paper.docx".into()),
                bytes: b"hello".to_vec(),
            })
            .is_err());
        assert!(decoder
            .decode(&DocumentPayload::File {
                filename: Some("paper.txt".into()),
                bytes: vec![0xff, 0xfe, 0x00],
            })
            .is_err());
    }

    #[test]
    fn file_ids_hash_raw_bytes() {
        let decoder = DefaultDocumentDecoder::default();
        let bytes = b"MEK inhibits ERK.".to_vec();
        let decoded = decoder
            .decode(&DocumentPayload::File {
                filename: Some("notes.md".into()),
                bytes: bytes.clone(),
            })
            .unwrap();
        assert_eq!(decoded.content_id, compute_mdhash_id(&bytes, "doc-"));
        assert!(decoded.pages.is_empty());
    }

    #[test]
    fn form_feeds_become_pages() {
        let pages = split_pages("intro\u{c}\u{c}results");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_number, 3);
        assert_eq!(pages[1].text, "results");
    }
}
