
use tracing::debug;

use crate::config::Config;

/// A bounded slice of a source document's text plus positional metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text, exactly as it appears in the source.
    pub content: String,
    /// Path of the source file, relative to the indexed folder.
    pub source: String,
    /// Position of this chunk's window within the document. Indices count
    /// windows, not emitted chunks, so they stay stable when whitespace-only
    /// windows are dropped.
    pub chunk_index: u32,
    /// Lowercase file extension of the source, without the dot.
    pub file_type: String,
}

impl Chunk {
    /// Identity key used as the vector store's primary key.
    ///
    /// Re-chunking the same file with the same window parameters reproduces
    /// the same ids.
    #[inline]
    pub fn id(&self) -> String {
        format!("{}_{}", self.source, self.chunk_index)
    }
}

/// Split document text into overlapping fixed-size windows.
///
/// Windows are `config.chunk_size` characters long and each one starts
/// `chunk_size - chunk_overlap` characters after the previous, with the last
/// window clipped to the end of the text. Offsets are character counts, so a
/// window never splits a UTF-8 code point. `Config::validate` guarantees the
/// advance step is positive.
#[inline]
pub fn chunk_text(text: &str, source: &str, file_type: &str, config: &Config) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Byte offset of every character, plus the end of the text, so windows
    // can be sliced without scanning from the start each time.
    let mut char_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    char_offsets.push(text.len());
    let char_count = char_offsets.len() - 1;

    let step = config.chunk_size - config.chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0u32;

    while start < char_count {
        let end = (start + config.chunk_size).min(char_count);
        // Offsets come from char_indices, so the range is always on
        // character boundaries and the lookup cannot fail.
        let content = text
            .get(char_offsets[start]..char_offsets[end])
            .unwrap_or("");

        if !content.trim().is_empty() {
            chunks.push(Chunk {
                content: content.to_string(),
                source: source.to_string(),
                chunk_index,
                file_type: file_type.to_string(),
            });
        }

        start += step;
        chunk_index += 1;
    }

    debug!(
        "Chunked {} ({} chars) into {} chunks across {} windows",
        source, char_count, chunks.len(), chunk_index
    );

    chunks
}
