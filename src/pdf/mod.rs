pub mod form;

use tracing::debug;

/// Errors raised by the PDF capability layer.
#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    /// The text layer could not be read.
    #[error("PDF text extraction failed: {0}")]
    Extraction(String),

    #[error("PDF error: {0}")]
    Lopdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns raw document bytes into one string per page.
pub trait TextSource {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, PdfError>;
}

/// Text layer reader backed by `pdf-extract`.
pub struct PdfTextExtractor;

impl TextSource for PdfTextExtractor {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, PdfError> {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| PdfError::Extraction(e.to_string()))
    }
}

/// All pages joined by `\n`, with `\r\n` / `\r` normalized to `\n`.
pub fn extract_full_text(source: &dyn TextSource, bytes: &[u8]) -> Result<String, PdfError> {
    let pages = source.page_texts(bytes)?;
    debug!(pages = pages.len(), "text layer read");
    let text = pages.join("\n");
    Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Split into trimmed lines. Blank lines are kept.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(|l| l.trim().to_string()).collect()
}

/// Single-page PDF with one Helvetica text line per entry of `lines`.
#[cfg(test)]
pub(crate) fn text_pdf(lines: &[&str]) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.4");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut content = String::from("BT /F1 12 Tf 72 740 Td");
    for line in lines {
        content.push_str(&format!(" ({}) Tj 0 -24 Td", line));
    }
    content.push_str(" ET");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
