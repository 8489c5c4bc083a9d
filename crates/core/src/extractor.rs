use crate::error::QaError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Returns the pages that carry text, in page order.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, QaError>;

    fn extract_text(&self, path: &Path) -> Result<String, QaError> {
        let pages = self.extract_pages(path)?;
        Ok(join_pages(&pages))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, QaError> {
        if !path.exists() {
            return Err(QaError::FileNotFound(path.to_path_buf()));
        }

        let document = Document::load(path).map_err(|error| QaError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| QaError::PdfParse(error.to_string()))?;

            // Image-only pages come back blank; they are a content gap, not a failure.
            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

/// Extracts the text of every page of the PDF at `path`.
///
/// Pages are joined by a newline and the result is trimmed. A PDF without
/// any extractable text yields an empty string rather than an error.
pub fn extract_text(path: &Path) -> Result<String, QaError> {
    LopdfExtractor.extract_text(path)
}

fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.text);
        text.push('\n');
    }
    text.trim().to_string()
}

/// Builds small text PDFs for tests in this workspace.
#[cfg(any(test, feature = "test-util"))]
pub mod test_pdf {
    use crate::error::QaError;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    /// Writes a PDF with one page per entry; each page shows its lines of text.
    /// An empty entry produces a page with no text at all.
    pub fn write_pdf(path: &Path, pages: &[&[&str]]) -> Result<(), QaError> {
        let mut doc = build(pages)?;
        doc.save(path)?;
        Ok(())
    }

    /// Same document as [`write_pdf`], returned as bytes.
    pub fn pdf_bytes(pages: &[&[&str]]) -> Result<Vec<u8>, QaError> {
        let mut doc = build(pages)?;
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }

    fn build(pages: &[&[&str]]) -> Result<Document, QaError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            if !lines.is_empty() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![72.into(), 720.into()]));
                for line in lines.iter() {
                    operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                    operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
                }
                operations.push(Operation::new("ET", vec![]));
            }
            let encoded = Content { operations }
                .encode()
                .map_err(|error| QaError::PdfParse(error.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Ok(doc)
    }
}
