use crate::error::QaError;
use crate::models::{DocumentChunk, QaOptions};
use std::collections::VecDeque;
use tracing::warn;

/// Separators tried in order; the empty separator means hard character cuts.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        QaOptions::default().into()
    }
}

impl From<QaOptions> for ChunkingConfig {
    fn from(value: QaOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), QaError> {
        if self.chunk_size == 0 {
            return Err(QaError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(QaError::InvalidChunkConfig(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Paragraph breaks are preferred over line breaks, line breaks over spaces,
/// and spaces over cutting inside a word. Pieces are greedily packed back
/// together and each new chunk starts with up to `chunk_overlap` characters
/// taken from the end of the previous one.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
}

pub fn build_chunks(text: &str, config: ChunkingConfig) -> Result<Vec<DocumentChunk>, QaError> {
    config.validate()?;

    Ok(split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| DocumentChunk {
            chunk_index: index as u64,
            text,
        })
        .collect())
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut separator = "";
    let mut remaining: &[&str] = &[];
    for (position, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() || text.contains(candidate) {
            separator = candidate;
            remaining = &separators[position + 1..];
            break;
        }
    }

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect()
    } else {
        // Empty pieces stay so that re-joining reproduces the original slice.
        text.split(separator).collect()
    };

    let mut chunks = Vec::new();
    let mut short_pieces = Vec::new();
    for piece in pieces {
        if char_len(piece) < config.chunk_size {
            short_pieces.push(piece);
            continue;
        }

        if !short_pieces.is_empty() {
            chunks.extend(merge_pieces(&short_pieces, separator, config));
            short_pieces.clear();
        }

        if remaining.is_empty() {
            chunks.push(piece.trim().to_string());
        } else {
            chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !short_pieces.is_empty() {
        chunks.extend(merge_pieces(&short_pieces, separator, config));
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

fn merge_pieces(pieces: &[&str], separator: &str, config: ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut merged = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let piece_len = char_len(piece);
        let joiner = if window.is_empty() { 0 } else { separator_len };

        if total + piece_len + joiner > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    length = total,
                    chunk_size = config.chunk_size,
                    "created a chunk longer than the configured size"
                );
            }

            if !window.is_empty() {
                if let Some(chunk) = join_window(&window, separator) {
                    merged.push(chunk);
                }

                // Keep dropping from the front until what is left fits as overlap
                // and leaves room for the incoming piece.
                loop {
                    let joiner = if window.is_empty() { 0 } else { separator_len };
                    let oversized = total > 0 && total + piece_len + joiner > config.chunk_size;
                    if total <= config.chunk_overlap && !oversized {
                        break;
                    }
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    let joined = if window.is_empty() { 0 } else { separator_len };
                    total -= char_len(front) + joined;
                }
            }
        }

        let joiner = if window.is_empty() { 0 } else { separator_len };
        window.push_back(piece);
        total += piece_len + joiner;
    }

    if let Some(chunk) = join_window(&window, separator) {
        merged.push(chunk);
    }

    merged
}

fn join_window(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn defaults_match_pipeline_parameters() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_size, 700);
        assert_eq!(config.chunk_overlap, 100);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", config(10, 2)).is_empty());
        assert!(split_text(" \n\n \n ", config(10, 2)).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("Invoice #1001, Total: $500.00", ChunkingConfig::default());
        assert_eq!(chunks, vec!["Invoice #1001, Total: $500.00".to_string()]);
    }

    #[test]
    fn hard_cuts_share_exactly_the_overlap() {
        let chunks = split_text("abcdefghij", config(4, 2));
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij"]);

        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].chars().collect();
            let tail: String = previous[previous.len() - 2..].iter().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn words_are_not_cut_when_spaces_exist() {
        let chunks = split_text("alpha beta gamma delta", config(11, 0));
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn word_overlap_carries_whole_words() {
        let chunks = split_text("one two three four five", config(9, 4));
        assert_eq!(chunks, vec!["one two", "two three", "four five"]);
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let text = "Bill to: ACME Corp\n\nInvoice #1001\n\nTotal: $500.00";
        let chunks = split_text(text, config(20, 0));
        assert_eq!(chunks, vec!["Bill to: ACME Corp", "Invoice #1001", "Total: $500.00"]);
    }

    #[test]
    fn long_paragraph_falls_back_to_smaller_separators() {
        let text = "Header\n\nline one here\nline two here";
        let chunks = split_text(text, config(14, 0));
        assert_eq!(chunks, vec!["Header", "line one here", "line two here"]);
    }

    #[test]
    fn multibyte_text_is_measured_in_characters() {
        let chunks = split_text("ééééé", config(2, 1));
        assert_eq!(chunks, vec!["éé", "éé", "éé", "éé"]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Item A 10.00\nItem B 20.00\n\nSubtotal 30.00\nTax 3.00\nTotal 33.00";
        assert_eq!(split_text(text, config(16, 4)), split_text(text, config(16, 4)));
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            build_chunks("text", config(0, 0)),
            Err(QaError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            build_chunks("text", config(10, 10)),
            Err(QaError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn build_chunks_numbers_in_order() -> Result<(), QaError> {
        let chunks = build_chunks("aaaa bbbb cccc", config(4, 0))?;
        let indexes: Vec<u64> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(chunks[2].text, "cccc");
        Ok(())
    }

    proptest! {
        #[test]
        fn chunks_never_exceed_size_and_come_from_the_text(
            text in "[a-z \\n]{0,400}",
            size in 2usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let chunks = split_text(&text, config(size, overlap));
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
                prop_assert!(!chunk.is_empty());
                prop_assert!(text.contains(chunk.as_str()));
            }
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert!(!chunks.is_empty());
            }
        }

        #[test]
        fn hard_cut_neighbours_share_exactly_the_overlap(
            text in "[a-z0-9]{0,400}",
            size in 2usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % size;
            let chunks = split_text(&text, config(size, overlap));
            if text.is_empty() {
                prop_assert!(chunks.is_empty());
                return Ok(());
            }

            let mut rebuilt = chunks[0].clone();
            for pair in chunks.windows(2) {
                let previous = &pair[0];
                let next = &pair[1];
                prop_assert!(next.len() > overlap);
                prop_assert_eq!(&previous[previous.len() - overlap..], &next[..overlap]);
                rebuilt.push_str(&next[overlap..]);
            }
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn neighbours_never_share_more_than_the_overlap(
            separators in proptest::collection::vec(0usize..3, 0..80),
            size in 8usize..60,
            overlap_seed in 0usize..60,
        ) {
            const JOINERS: [&str; 3] = [" ", "\n", "\n\n"];
            let overlap = overlap_seed % size;
            let mut text = String::from("t000");
            for (index, joiner) in separators.iter().enumerate() {
                text.push_str(JOINERS[*joiner]);
                text.push_str(&format!("t{:03}", index + 1));
            }

            let chunks = split_text(&text, config(size, overlap));
            for pair in chunks.windows(2) {
                let previous = &pair[0];
                let next = &pair[1];
                let shared = (1..=previous.len().min(next.len()))
                    .rev()
                    .find(|&k| previous.ends_with(&next[..k]))
                    .unwrap_or(0);
                prop_assert!(
                    shared <= overlap,
                    "{:?} and {:?} share {} chars, overlap is {}",
                    previous,
                    next,
                    shared,
                    overlap
                );
            }
        }
    }
}
