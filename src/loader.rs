//! Document loader: turns a file on disk into a [`Document`].
//!
//! | Format | Extraction |
//! |--------|------------|
//! | `txt` | UTF-8 text as-is |
//! | `md` | Markdown rendered to plain text (pulldown-cmark) |
//! | `csv` | One block per row, `header: value` per line |
//! | `pdf` | Text layer via `pdf-extract` |
//!
//! Failures are reported as [`DeskError::Parsing`] naming the file, so a
//! bad file in a batch does not affect the others.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::path::Path;

use support_desk_core::models::{Document, DocumentFormat};
use support_desk_core::{DeskError, Result};

/// Load `path`, using `format` when given and the extension otherwise.
pub fn load_document(path: &Path, format: Option<DocumentFormat>) -> Result<Document> {
    let shown = path.display().to_string();

    let format = match format.or_else(|| DocumentFormat::from_path(path)) {
        Some(f) => f,
        None => {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| "(none)".to_string());
            return Err(DeskError::parsing(
                shown,
                format!("unsupported file type {}; expected .txt, .pdf, .md or .csv", ext),
            ));
        }
    };

    if !path.is_file() {
        return Err(DeskError::NotFound(format!("file {}", shown)));
    }

    let bytes = std::fs::read(path).map_err(|e| DeskError::parsing(&shown, e.to_string()))?;
    let text = extract_text(&bytes, format).map_err(|message| DeskError::parsing(&shown, message))?;

    tracing::debug!(path = %shown, %format, chars = text.chars().count(), "loaded document");
    Ok(Document::new(shown, format, text))
}

/// Extract plain text from raw file bytes.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> std::result::Result<String, String> {
    match format {
        DocumentFormat::Txt => utf8(bytes),
        DocumentFormat::Md => utf8(bytes).map(|md| markdown_to_text(&md)),
        DocumentFormat::Csv => csv_to_text(bytes),
        DocumentFormat::Pdf => pdf_extract::extract_text_from_mem(bytes).map_err(|e| format!("invalid PDF: {}", e)),
    }
}

fn utf8(bytes: &[u8]) -> std::result::Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("not valid UTF-8: {}", e))
}

fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Start(Tag::Item) => out.push_str("- "),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock) => {
                out.push('\n')
            }
            _ => {}
        }
    }
    out.trim_end().to_string()
}

fn csv_to_text(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| format!("invalid CSV header: {}", e))?
        .clone();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("invalid CSV row {}: {}", i + 1, e))?;
        let lines: Vec<String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| format!("{}: {}", h.trim(), v.trim()))
            .collect();
        rows.push(lines.join("\n"));
    }
    Ok(rows.join("\n\n"))
}
