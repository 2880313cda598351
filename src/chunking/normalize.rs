//! Transcript cleanup.
//!
//! Captions carry artifacts that cost tokens without adding meaning: cue
//! annotations, music markers, speaker chevrons, escaped entities and stray
//! timestamps. They are stripped before chunking.

use super::NormalizedTranscript;
use crate::error::NormalizationError;
use crate::transcript::Transcript;
use regex::Regex;
use std::sync::LazyLock;

static ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex"));

static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        [\[(<] \d{1,2}:\d{2}(?::\d{2})?(?:[.,]\d{1,3})? [\])>]   # [01:02] (1:02:03) <00:00:01.500>
        |
        \b \d{1,2}:\d{2}:\d{2}[.,]\d{3} \b                        # 00:01:02.345
        ",
    )
    .expect("valid timestamp regex")
});

static ANNOTATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
        \[[^\]]*\]
        |
        \(\s*(?:laughs?|laughter|applause|music|cheering|sighs?|inaudible|silence
              |rires?|musique|applaudissements|soupirs?)\s*\)
        ",
    )
    .expect("valid annotation regex")
});

static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[♪♫]|>>").expect("valid marker regex"));

/// Clean a transcript into a single line of text.
pub fn normalize(transcript: &Transcript) -> Result<NormalizedTranscript, NormalizationError> {
    let joined = transcript
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let text = clean_text(&joined);
    if text.is_empty() {
        return Err(NormalizationError::EmptyInput);
    }

    Ok(NormalizedTranscript {
        video_id: transcript.video_id.clone(),
        language: transcript.language.clone(),
        text,
    })
}

/// Strip caption artifacts and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let decoded = decode_entities(raw);
    let text = TIMESTAMP_REGEX.replace_all(&decoded, " ");
    let text = ANNOTATION_REGEX.replace_all(&text, " ");
    let text = MARKER_REGEX.replace_all(&text, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(raw: &str) -> String {
    ENTITY_REGEX
        .replace_all(raw, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
