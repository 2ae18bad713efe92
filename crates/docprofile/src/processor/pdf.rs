use crate::error::ExtractError;
use crate::processor::{DocumentFormat, DocumentProcessor};

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

pub struct PdfProcessor;

impl PdfProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for PdfProcessor {
    fn extract_text(&self, content: &[u8]) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        let doc = lopdf::Document::load_mem(content)
            .map_err(|e| ExtractError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(ExtractError::PdfProcessing(
                "PDF has no pages".to_string(),
            ));
        }

        let text = match doc.extract_text(&page_numbers) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    "Whole-document extraction failed ({}), falling back to page-by-page",
                    e
                );
                extract_page_by_page(&doc, &page_numbers)
            }
        };

        Ok(clean_extracted_text(&text))
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }
}

/// Extracts each page on its own, skipping pages lopdf cannot read.
fn extract_page_by_page(doc: &lopdf::Document, page_numbers: &[u32]) -> String {
    let mut text = String::new();

    for &page_num in page_numbers {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => tracing::debug!("Skipping unreadable page {}: {}", page_num, e),
        }
    }

    text
}

fn clean_extracted_text(text: &str) -> String {
    text.replace(IDENTITY_H_PATTERN, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    fn build_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for line in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_extract_two_page_pdf() {
        let pdf = build_pdf(&["Jane Doe", "Rust Engineer"]);
        let text = PdfProcessor::new().extract_text(&pdf).unwrap();
        assert!(text.contains("Jane Doe"));
        assert!(text.contains("Rust Engineer"));
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let err = PdfProcessor::new()
            .extract_text(b"%PDF-1.5 this is not a pdf")
            .unwrap_err();
        assert!(matches!(err, ExtractError::PdfProcessing(_)));
    }

    #[test]
    fn test_identity_h_markers_are_removed() {
        let cleaned = clean_extracted_text("?Identity-H Unimplemented?Skills: Rust");
        assert_eq!(cleaned, "Skills: Rust");
    }

    #[test]
    fn test_supports_pdf_format() {
        let processor = PdfProcessor::new();
        assert!(processor.supports(DocumentFormat::Pdf));
        assert!(!processor.supports(DocumentFormat::Text));
    }
}
