//! Transcript normalization and chunking.
//!
//! A cleaned transcript is split into bounded chunks so that each one fits a
//! single summarization call. Concatenating the chunks of one pass gives back
//! the normalized text exactly.

mod normalize;

pub use normalize::{clean_text, normalize};

use crate::caption_source::VideoId;
use serde::{Deserialize, Serialize};

/// Cleaned transcript text, ready to be chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTranscript {
    pub(crate) video_id: VideoId,
    pub(crate) language: Option<String>,
    pub(crate) text: String,
}

impl NormalizedTranscript {
    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Split the text into chunks of at most `max_chars` characters.
    ///
    /// Each call starts a fresh pass; chunks are produced lazily.
    pub fn chunks(&self, max_chars: usize) -> Chunks<'_> {
        Chunks::new(&self.text, max_chars)
    }
}

/// A bounded piece of a normalized transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of this chunk in the transcript, starting at 0.
    pub sequence_index: usize,
    pub text: String,
}

/// Lazy iterator over the chunks of a text.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    remaining: &'a str,
    next_index: usize,
    max_chars: usize,
}

impl<'a> Chunks<'a> {
    pub fn new(text: &'a str, max_chars: usize) -> Self {
        Self {
            remaining: text,
            next_index: 0,
            max_chars: max_chars.max(1),
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining.is_empty() {
            return None;
        }

        let cut = split_point(self.remaining, self.max_chars);
        let (head, tail) = self.remaining.split_at(cut);
        self.remaining = tail;

        let chunk = Chunk {
            sequence_index: self.next_index,
            text: head.to_string(),
        };
        self.next_index += 1;
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

/// Byte offset at which the next chunk of `text` ends.
///
/// Preference: after a sentence end followed by a space (when that keeps at
/// least half the budget), after the last space, at the budget edge when a
/// space follows it. Only a word longer than the budget is cut inside.
///
/// A word exactly the budget long leaves the following space at the start of
/// the next window; that space alone then becomes a chunk.
fn split_point(text: &str, max_chars: usize) -> usize {
    let Some((window_end, next)) = text.char_indices().nth(max_chars) else {
        return text.len();
    };
    let window = &text[..window_end];

    let mut sentence_cut = None;
    let mut space_cut = None;
    let mut prev = None;
    for (count, (i, c)) in window.char_indices().enumerate() {
        if c == ' ' {
            space_cut = Some(i + 1);
            let kept = count + 1;
            if prev.is_some_and(is_sentence_end) && kept * 2 >= max_chars {
                sentence_cut = Some(i + 1);
            }
        }
        prev = Some(c);
    }

    sentence_cut
        .or(space_cut)
        .or((next == ' ').then_some(window_end))
        .unwrap_or(window_end)
}
