
use tracing::debug;

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap in characters carried from one chunk into the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }
}

/// Split text into bounded, overlapping chunks.
///
/// Cuts prefer a paragraph break, then a sentence end, then a hard character
/// cut, so each emitted piece is at most `chunk_size` characters and
/// consecutive pieces overlap by `chunk_overlap` characters. The function is
/// pure: the same input always yields the same ordered chunk list, which the
/// delete-then-replace indexing scheme depends on.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total <= config.chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let window_end = (start + config.chunk_size).min(total);

        if window_end == total {
            chunks.push(chars[start..total].iter().collect());
            break;
        }

        let cut = boundary_cut(&chars, start, window_end).unwrap_or(window_end);
        chunks.push(chars[start..cut].iter().collect());

        // Guaranteed progress even when the overlap swallows the whole cut.
        start = (start + 1).max(cut.saturating_sub(config.chunk_overlap));
    }

    debug!(
        "Split {} characters into {} chunks",
        total,
        chunks.len()
    );

    chunks
}

/// Find the best cut position in `(start, end]`, preferring a paragraph break
/// over a sentence end. Cuts in the first half of the window are rejected so a
/// stray early boundary cannot produce degenerate slivers.
fn boundary_cut(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let min_cut = start + (end - start) / 2;

    for cut in ((min_cut + 1)..=end).rev() {
        if cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n' {
            return Some(cut);
        }
    }

    for cut in ((min_cut + 1)..=end).rev() {
        if cut >= 2
            && matches!(chars[cut - 2], '.' | '!' | '?')
            && chars[cut - 1].is_whitespace()
        {
            return Some(cut);
        }
    }

    None
}
