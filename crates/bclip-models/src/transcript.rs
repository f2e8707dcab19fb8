//! Transcript alignment.
//!
//! Transcripts carry bracketed time markers (`[125]`, `[02:05]`,
//! `[00:02:05]`) in front of the text spoken at that point. Given a clip
//! window we cut out the slice of text that covers it, widened by a fixed
//! context buffer on both sides.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::timestamp::parse_time_marker;

/// Context added on each side of the requested window, in seconds.
pub const CONTEXT_BUFFER_SECS: f64 = 5.0;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\r\n]{1,24})\]").expect("valid marker regex"));

/// A time marker found in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeMarker {
    /// Playback time the marker denotes
    pub time_seconds: f64,
    /// Byte offset of the opening bracket in the transcript
    pub text_offset: usize,
}

/// Collect every parseable marker, in textual order.
///
/// Bracketed text that is not a timestamp (`[music]`, `[laughs]`) is skipped.
pub fn collect_markers(transcript: &str) -> Vec<TimeMarker> {
    MARKER_RE
        .captures_iter(transcript)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let time_seconds = parse_time_marker(caps.get(1)?.as_str()).ok()?;
            Some(TimeMarker {
                time_seconds,
                text_offset: whole.start(),
            })
        })
        .collect()
}

/// Extract the transcript fragment covering `[start, end]` plus the context buffer.
///
/// The fragment begins at the last marker at or before the buffered start
/// (or the top of the transcript) and stops at the first marker at or after
/// the buffered end (or the end of the transcript). Markers are queried as
/// collected, so sparse, duplicated or out-of-order markers are tolerated.
pub fn extract_fragment(transcript: &str, start: f64, end: f64) -> String {
    let markers = collect_markers(transcript);
    let (from, to) = fragment_bounds(&markers, transcript.len(), start, end);
    transcript[from..to].trim().to_string()
}

/// Byte range of the fragment for an already-collected marker set.
pub fn fragment_bounds(markers: &[TimeMarker], len: usize, start: f64, end: f64) -> (usize, usize) {
    let buffered_start = (start - CONTEXT_BUFFER_SECS).max(0.0);
    let buffered_end = end + CONTEXT_BUFFER_SECS;

    let from = markers
        .iter()
        .rev()
        .find(|m| m.time_seconds <= buffered_start)
        .map_or(0, |m| m.text_offset);

    let to = markers
        .iter()
        .find(|m| m.time_seconds >= buffered_end)
        .map_or(len, |m| m.text_offset);

    // Out-of-order markers can put the end in front of the start; read on
    // to the end of the transcript rather than returning nothing.
    if to <= from {
        (from, len)
    } else {
        (from, to)
    }
}
