use std::path::Path;

use anyhow::{anyhow, Result};
use pdfium_render::prelude::*;

/// Splits a source document into ordered page texts, 1-indexed by position.
/// Implementations are blocking; the pipeline runs them on a blocking task.
pub trait PageExtractor: Send + Sync + 'static {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

pub struct PdfiumExtractor;

impl PageExtractor for PdfiumExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let pdfium = Pdfium::default();
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|err| anyhow!("load pdf: {err}"))?;

        let pages = document.pages();
        let mut texts = Vec::with_capacity(pages.len() as usize);

        for page_index in 0..pages.len() {
            let page = pages
                .get(page_index)
                .map_err(|err| anyhow!("load page {page_index}: {err}"))?;

            let mut combined = String::new();
            if let Ok(page_text) = page.text() {
                for segment in page_text.segments().iter() {
                    combined.push_str(&segment.text());
                    combined.push('\n');
                }
            }

            texts.push(combined.trim().to_string());
        }

        Ok(texts)
    }
}
