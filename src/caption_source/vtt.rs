//! WebVTT caption parsing.

use crate::error::AcquisitionError;
use crate::transcript::TranscriptSegment;
use regex::Regex;
use std::sync::LazyLock;

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Parse a WebVTT payload into time-ordered segments.
///
/// Cue settings, inline tags and cue identifiers are dropped. Auto-generated
/// captions repeat the previous line at the top of each cue; repeated lines
/// are collapsed so every spoken line appears once.
pub fn parse_vtt(payload: &str) -> Result<Vec<TranscriptSegment>, AcquisitionError> {
    let payload = payload.trim_start_matches('\u{feff}');
    let mut lines = payload.lines();

    let header = lines.by_ref().find(|l| !l.trim().is_empty()).unwrap_or("");
    if !header.trim_start().starts_with("WEBVTT") {
        return Err(AcquisitionError::Unsupported(
            "caption payload is missing the WEBVTT header".to_string(),
        ));
    }

    let mut segments = Vec::new();
    let mut last_line: Option<String> = None;
    let mut block: Vec<&str> = Vec::new();

    for line in lines.chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            block.push(line);
            continue;
        }
        if block.is_empty() {
            continue;
        }

        if let Some(segment) = parse_block(&block, &mut last_line)? {
            segments.push(segment);
        }
        block.clear();
    }

    Ok(segments)
}

/// Parse one blank-line separated block. Returns `None` for blocks without new text.
fn parse_block(
    block: &[&str],
    last_line: &mut Option<String>,
) -> Result<Option<TranscriptSegment>, AcquisitionError> {
    let first = block[0].trim_start();
    if first.starts_with("NOTE") || first.starts_with("STYLE") || first.starts_with("REGION") {
        return Ok(None);
    }
    // Header metadata such as "Kind: captions" or "Language: fr"
    let Some(timing_idx) = block.iter().position(|l| l.contains("-->")) else {
        return Ok(None);
    };

    let (start, end) = parse_timing(block[timing_idx])?;

    let mut fresh = Vec::new();
    for raw in &block[timing_idx + 1..] {
        let text = TAG_REGEX.replace_all(raw, "");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if last_line.as_deref() == Some(text.as_str()) {
            continue;
        }
        *last_line = Some(text.clone());
        fresh.push(text);
    }

    if fresh.is_empty() {
        return Ok(None);
    }

    Ok(Some(TranscriptSegment::new(start, end, fresh.join(" "))))
}

fn parse_timing(line: &str) -> Result<(f64, f64), AcquisitionError> {
    let malformed = || AcquisitionError::Unsupported(format!("malformed cue timing: {}", line.trim()));

    let (start, rest) = line.split_once("-->").ok_or_else(malformed)?;
    let end = rest.split_whitespace().next().ok_or_else(malformed)?;

    let start = parse_timestamp(start.trim()).ok_or_else(malformed)?;
    let end = parse_timestamp(end).ok_or_else(malformed)?;
    if end < start {
        return Err(malformed());
    }
    Ok((start, end))
}

/// Parse `hh:mm:ss.ttt` or `mm:ss.ttt` into seconds.
fn parse_timestamp(ts: &str) -> Option<f64> {
    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };
    if !seconds.contains('.') {
        return None;
    }
    let seconds: f64 = seconds.parse().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Some(whole as f64 + seconds)
}
