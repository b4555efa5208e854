use anyhow::{anyhow, Context, Result};
use lopdf::Document;

use crate::domain::document::PageText;

/// Parses a PDF from memory into per-page text units. Page labels are the
/// 1-based page numbers. Pages with no extractable text are skipped; a
/// document where every page is empty is an error.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
    let doc = Document::load_mem(bytes).context("Failed to parse PDF document")?;

    let mut pages = Vec::new();
    for (page_number, _object_id) in doc.get_pages() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to extract text from page {}: {}", page_number, e);
                continue;
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        pages.push(PageText {
            page_label: page_number.to_string(),
            text: trimmed.to_string(),
        });
    }

    if pages.is_empty() {
        return Err(anyhow!("No extractable text found in PDF"));
    }
    log::debug!("Extracted text from {} pages", pages.len());
    Ok(pages)
}
