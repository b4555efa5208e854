use crate::domain::document::{Chunk, PageText};

/// Fixed-size sliding-window splitter. Windows are `chunk_size` characters
/// with `overlap` characters shared between neighbors, so content spanning a
/// window boundary is still retrievable from the overlapping neighbor.
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// `overlap` must be smaller than `chunk_size`; config validation
    /// guarantees this for the wired instance.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Splits one page into overlapping chunks carrying the page label.
    pub fn chunk_page(&self, page: &PageText) -> Vec<Chunk> {
        self.split_text(&page.text)
            .into_iter()
            .map(|text| Chunk {
                text,
                page_label: page.page_label.clone(),
            })
            .collect()
    }

    /// Splits all pages, preserving page order.
    pub fn chunk_pages(&self, pages: &[PageText]) -> Vec<Chunk> {
        pages.iter().flat_map(|page| self.chunk_page(page)).collect()
    }

    /// Character-based windowing that never splits a UTF-8 scalar value.
    fn split_text(&self, text: &str) -> Vec<String> {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        if char_count == 0 {
            return Vec::new();
        }
        if char_count <= self.chunk_size {
            return vec![text.to_string()];
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_count);
            chunks.push(text[boundaries[start]..boundaries[end]].to_string());
            if end == char_count {
                break;
            }
            start += step;
        }
        chunks
    }
}
