//! Frame comparison and body verification.
//!
//! Comparison results are classifications, not errors: verification code
//! collects them and decides what a mismatch means for the run.

use tracing::debug;

use crate::codec::{read_i32, write_i32, CHECKSUM_OFFSET, INT_LEN, PATTERN_OFFSET};
use crate::error::Result;
use crate::pattern::Pattern;

/// Outcome of comparing two frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Success,
    HeaderMismatch,
    BodyMismatch,
    HeaderFormatInvalid,
    BodyFormatInvalid,
}

impl Comparison {
    pub fn is_success(self) -> bool {
        self == Comparison::Success
    }
}

/// Compare the header regions of two frames.
///
/// Length disagreement is a mismatch. A header that claims to extend past
/// its own frame is a format error, checked per operand before any bytes
/// are compared.
pub fn compare_headers(a: &[u8], b: &[u8]) -> Comparison {
    let (Some(a_lens), Some(b_lens)) = (header_lens(a), header_lens(b)) else {
        return Comparison::HeaderFormatInvalid;
    };
    if a_lens.total != b_lens.total || a_lens.header != b_lens.header {
        return Comparison::HeaderMismatch;
    }
    for (frame, lens) in [(a, a_lens), (b, b_lens)] {
        if !lens.header_fits(frame.len()) {
            return Comparison::HeaderFormatInvalid;
        }
    }

    let range = INT_LEN..INT_LEN + a_lens.header as usize;
    if a[range.clone()] == b[range] {
        Comparison::Success
    } else {
        Comparison::HeaderMismatch
    }
}

/// Compare the bodies of two frames, using each frame's declared body length.
pub fn compare_bodies(a: &[u8], b: &[u8]) -> Comparison {
    let (Some(a_lens), Some(b_lens)) = (body_lens(a), body_lens(b)) else {
        return Comparison::BodyFormatInvalid;
    };
    if a_lens.total != b_lens.total || a_lens.body != b_lens.body {
        return Comparison::BodyMismatch;
    }
    for (frame, lens) in [(a, a_lens), (b, b_lens)] {
        if !lens.body_fits(frame.len()) {
            return Comparison::BodyFormatInvalid;
        }
    }

    let a_start = a_lens.body_offset();
    let b_start = b_lens.body_offset();
    let len = a_lens.body as usize;
    if a[a_start..a_start + len] == b[b_start..b_start + len] {
        Comparison::Success
    } else {
        Comparison::BodyMismatch
    }
}

/// Compare headers, then bodies. The first failure is returned.
pub fn compare_frames(a: &[u8], b: &[u8]) -> Comparison {
    match compare_headers(a, b) {
        Comparison::Success => compare_bodies(a, b),
        failure => failure,
    }
}

/// Result of checking a body against its declared pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Every body byte matches the pattern.
    Valid,
    /// Random body whose stored checksum disagreed; it was overwritten with
    /// the recomputed value.
    ChecksumRewritten { stored: i32, computed: i32 },
    /// First body byte that does not match the pattern.
    Corrupt { offset: usize, expected: u8, found: u8 },
}

impl Verification {
    /// `ChecksumRewritten` counts as valid: the body itself was not checked.
    pub fn is_valid(self) -> bool {
        !matches!(self, Verification::Corrupt { .. })
    }
}

/// Check the body bytes against the frame's pattern field.
///
/// Only the branch for the declared pattern runs. A random body cannot be
/// checked byte by byte; its checksum is recomputed and a stale stored value
/// is replaced rather than reported as a failure.
pub fn verify_body(buf: &mut [u8]) -> Result<Verification> {
    let pattern = Pattern::try_from(read_i32(buf, PATTERN_OFFSET)?)?;
    let body = crate::codec::body(buf)?;

    if pattern == Pattern::Random {
        let computed = body
            .iter()
            .fold(0i32, |acc, b| acc.wrapping_add(*b as i8 as i32));
        let stored = read_i32(buf, CHECKSUM_OFFSET)?;
        if stored == computed {
            return Ok(Verification::Valid);
        }
        debug!(stored, computed, "rewriting random-body checksum");
        write_i32(buf, CHECKSUM_OFFSET, computed)?;
        return Ok(Verification::ChecksumRewritten { stored, computed });
    }

    for (offset, found) in body.iter().copied().enumerate() {
        let expected = pattern.expected_byte(offset).unwrap_or_default();
        if found != expected {
            return Ok(Verification::Corrupt {
                offset,
                expected,
                found,
            });
        }
    }
    Ok(Verification::Valid)
}

#[derive(Clone, Copy)]
struct HeaderLens {
    total: i32,
    header: i32,
}

impl HeaderLens {
    fn header_fits(self, buf_len: usize) -> bool {
        let end = INT_LEN as i64 + self.header as i64;
        self.header >= 0 && end <= self.total as i64 && end <= buf_len as i64
    }
}

#[derive(Clone, Copy)]
struct BodyLens {
    total: i32,
    header: i32,
    body: i32,
}

impl BodyLens {
    fn body_offset(self) -> usize {
        2 * INT_LEN + self.header as usize
    }

    fn body_fits(self, buf_len: usize) -> bool {
        let end = 2 * INT_LEN as i64 + self.header as i64 + self.body as i64;
        self.body >= 0 && end <= self.total as i64 && end <= buf_len as i64
    }
}

fn header_lens(buf: &[u8]) -> Option<HeaderLens> {
    Some(HeaderLens {
        total: read_i32(buf, 0).ok()?,
        header: read_i32(buf, INT_LEN).ok()?,
    })
}

fn body_lens(buf: &[u8]) -> Option<BodyLens> {
    let total = read_i32(buf, 0).ok()?;
    let header = read_i32(buf, INT_LEN).ok()?;
    if header < 0 {
        return None;
    }
    let body = read_i32(buf, INT_LEN + header as usize).ok()?;
    Some(BodyLens {
        total,
        header,
        body,
    })
}
