//! Fixed-window text chunker.
//!
//! Splits reference contents into overlapping windows of `chunk_size`
//! characters, starting every `chunk_size - chunk_overlap` characters.
//! Windows are measured in `char`s, never bytes, so multi-byte text is never
//! split inside a code point. Chunk boundaries depend only on the text and
//! the two sizes.

use serde_json::{Map, Value};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Reference};

/// Split text into overlapping windows.
///
/// - empty text → no chunks
/// - text shorter than `chunk_size` → one chunk holding the whole text
/// - otherwise windows start at multiples of the stride while the start is
///   inside the text; the last window may be shorter
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let stride = chunk_size.saturating_sub(chunk_overlap).max(1);

    // Byte offset of every char start, plus the end of the text.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_len = offsets.len();
    offsets.push(text.len());

    if char_len < chunk_size {
        return vec![make_chunk(text)];
    }

    (0..char_len)
        .step_by(stride)
        .map(|start| {
            let end = (start + chunk_size).min(char_len);
            make_chunk(&text[offsets[start]..offsets[end]])
        })
        .collect()
}

/// Chunk a reference's contents, tagging every chunk with its source file.
pub fn chunk_reference(reference: &Reference, config: &ChunkingConfig) -> Vec<Chunk> {
    let text = reference.contents.as_deref().unwrap_or_default();
    let mut chunks = chunk_text(text, config.chunk_size, config.chunk_overlap);
    for chunk in &mut chunks {
        chunk.metadata.insert(
            "source_filename".to_string(),
            Value::String(reference.source_filename.clone()),
        );
    }
    chunks
}

fn make_chunk(text: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        vector: Vec::new(),
        metadata: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IngestStatus;

    /// Reassemble text from overlapping windows produced with the given stride.
    fn stitch(chunks: &[Chunk], stride: usize) -> String {
        let mut out: Vec<char> = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            let start = i * stride;
            let already = out.len() - start.min(out.len());
            out.extend(c.text.chars().skip(already));
        }
        out.into_iter().collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert!(chunks[0].vector.is_empty());
    }

    #[test]
    fn test_windows_and_stride() {
        let text: String = ('a'..='z').cycle().take(25).collect();
        let chunks = chunk_text(&text, 10, 2);
        // starts at 0, 8, 16, 24
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text.chars().count(), 10);
        assert_eq!(chunks[1].text, text.chars().skip(8).take(10).collect::<String>());
        assert_eq!(chunks[3].text, "y");
    }

    #[test]
    fn test_text_equal_to_chunk_size() {
        let text = "x".repeat(10);
        let chunks = chunk_text(&text, 10, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.len(), 10);
        assert_eq!(chunks[1].text.len(), 2);
    }

    #[test]
    fn test_stitching_reconstructs_text() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(60);
        for (size, overlap) in [(1000, 200), (100, 0), (37, 36), (64, 10)] {
            let chunks = chunk_text(&text, size, overlap);
            assert_eq!(stitch(&chunks, size - overlap), text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "naïve café — über ".repeat(20);
        let chunks = chunk_text(&text, 16, 4);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        assert_eq!(stitch(&chunks, 12), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha Beta Gamma Delta ".repeat(100);
        let c1 = chunk_text(&text, 50, 10);
        let c2 = chunk_text(&text, 50, 10);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_chunk_reference_tags_source() {
        let mut r = Reference::new("paper.pdf", IngestStatus::Complete);
        r.contents = Some("some body text".into());
        let chunks = chunk_reference(&r, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata["source_filename"], "paper.pdf");

        r.contents = None;
        assert!(chunk_reference(&r, &ChunkingConfig::default()).is_empty());
    }
}
