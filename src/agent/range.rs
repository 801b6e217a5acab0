//! Single byte-range parsing for the video path.

use std::str::FromStr;

use crate::error::AgentError;

/// A parsed `Range: bytes=...` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=<start>-[<end>]`, `end` inclusive.
    From { start: u64, end: Option<u64> },
    /// `bytes=-<len>`: the last `len` bytes.
    Suffix(u64),
}

impl FromStr for ByteRange {
    type Err = AgentError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let malformed = || AgentError::MalformedRange(header.to_string());

        let (unit, set) = header.trim().split_once('=').ok_or_else(malformed)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") || set.contains(',') {
            return Err(malformed());
        }
        let (start, end) = set.split_once('-').ok_or_else(malformed)?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            return parse_offset(end).map(ByteRange::Suffix).ok_or_else(malformed);
        }

        let start = parse_offset(start).ok_or_else(malformed)?;
        let end = if end.is_empty() {
            None
        } else {
            Some(parse_offset(end).ok_or_else(malformed)?)
        };
        if matches!(end, Some(end) if end < start) {
            return Err(malformed());
        }

        Ok(ByteRange::From { start, end })
    }
}

fn parse_offset(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl ByteRange {
    /// Inclusive `(start, end)` within a body of `total` bytes.
    ///
    /// Bounds clamp silently; `None` means the selection is empty.
    pub fn resolve(&self, total: usize) -> Option<(usize, usize)> {
        if total == 0 {
            return None;
        }
        let last = total - 1;
        match *self {
            ByteRange::From { start, end } => {
                let start = usize::try_from(start).ok()?;
                if start > last {
                    return None;
                }
                let end = end
                    .and_then(|e| usize::try_from(e).ok())
                    .map_or(last, |e| e.min(last));
                Some((start, end))
            }
            ByteRange::Suffix(0) => None,
            ByteRange::Suffix(len) => {
                let len = usize::try_from(len).unwrap_or(usize::MAX);
                Some((total.saturating_sub(len), last))
            }
        }
    }
}
