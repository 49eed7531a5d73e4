//! Bounded text segmentation for speech synthesis.
//!
//! [`segment_text`] turns arbitrary input into an ordered list of
//! [`TextSegment`]s that are short enough to keep every inference call brief.
//! Sentences are packed greedily up to a character budget. A sentence that is
//! too long on its own is split once more at clause boundaries (`,` and `;`).
//! The budget is advisory: a clause without any delimiter is emitted whole.

use once_cell::sync::Lazy;
use regex::Regex;

/// Character budget used when the caller does not pick one.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 200;

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?;\n]+").expect("sentence boundary pattern"));
static CLAUSE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;]").expect("clause boundary pattern"));

/// A bounded slice of input text destined for one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Position of the segment in synthesis and playback order.
    pub index: usize,
    /// Trimmed, non-empty text.
    pub text: String,
}

impl TextSegment {
    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Collapse every run of whitespace into one space and trim both ends.
///
/// ```
/// use lingproc::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("  Hello \n\t world  "), "Hello world");
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into segments of at most `max_chunk_size` characters.
///
/// # Examples
/// ```
/// use lingproc::segment_text;
///
/// let segments = segment_text("Hello world. How are you?", 200);
/// assert_eq!(segments.len(), 1);
/// assert_eq!(segments[0].text, "Hello world. How are you?");
/// ```
pub fn segment_text(text: &str, max_chunk_size: usize) -> Vec<TextSegment> {
    let normalized = normalize_whitespace(text);
    let mut packer = Packer::new(max_chunk_size);

    for sentence in split_after(&normalized, &SENTENCE_END) {
        if char_len(sentence) > max_chunk_size {
            packer.flush();
            for clause in split_after(sentence, &CLAUSE_END) {
                packer.push(clause);
            }
        } else {
            packer.push(sentence);
        }
    }

    packer
        .finish()
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextSegment { index, text })
        .collect()
}

/// Like [`segment_text`] with [`DEFAULT_MAX_CHUNK_SIZE`].
pub fn segment_text_default(text: &str) -> Vec<TextSegment> {
    segment_text(text, DEFAULT_MAX_CHUNK_SIZE)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split after every `boundary` match that is followed by whitespace or the
/// end of the text. The matched delimiter stays with the preceding piece.
fn split_after<'a>(text: &'a str, boundary: &Regex) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in boundary.find_iter(text) {
        let rest = &text[m.end()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let piece = text[start..m.end()].trim();
            if !piece.is_empty() {
                pieces.push(piece);
            }
            start = m.end();
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces
}

/// Greedy accumulator that flushes whenever the next piece would not fit.
struct Packer {
    max: usize,
    buf: String,
    buf_len: usize,
    out: Vec<String>,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            buf: String::new(),
            buf_len: 0,
            out: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str) {
        let len = char_len(piece);
        if self.buf_len > 0 && self.buf_len + 1 + len > self.max {
            self.flush();
        }
        if self.buf_len > 0 {
            self.buf.push(' ');
            self.buf_len += 1;
        }
        self.buf.push_str(piece);
        self.buf_len += len;
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            self.out.push(std::mem::take(&mut self.buf));
        }
        self.buf_len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.out
    }
}
