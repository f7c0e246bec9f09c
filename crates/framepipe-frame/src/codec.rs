use bytes::{Buf, BufMut, BytesMut};
use rand::Rng;

use crate::error::{FrameError, Result};
use crate::pattern::Pattern;

/// Width of every integer field on the wire.
pub const INT_LEN: usize = 4;

/// Header length written into every frame built here.
pub const HEADER_LEN: usize = 32;

/// Smallest buffer that can hold a frame: length, header, body length and
/// the reserved trailer word.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 3 * INT_LEN;

/// Total length of the stop sentinel unit.
pub const STOP_LEN: usize = INT_LEN;

/// Default receive buffer size. Larger frames get a dedicated allocation.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32_000;

pub const TOTAL_LEN_OFFSET: usize = 0;
pub const HEADER_LEN_OFFSET: usize = 4;
pub const SEQUENCE_OFFSET: usize = 8;
pub const PATTERN_OFFSET: usize = 12;
pub const CHECKSUM_OFFSET: usize = 16;
pub const LAST_FLAG_OFFSET: usize = 20;

const LAST_MESSAGE: i32 = 1;
const NOT_LAST_MESSAGE: i32 = 0;

/// Buffer size needed for a frame carrying `body_len` body bytes.
///
/// ```text
/// ┌──────────┬─────────────────────────────┬──────────┬──────────┬─────────┐
/// │ total    │ header (32B)                │ body len │ body     │ trailer │
/// │ (4B BE)  │ hdr len|seq|type|sum|last|… │ (4B BE)  │ (N B)    │ (4B)    │
/// └──────────┴─────────────────────────────┴──────────┴──────────┴─────────┘
/// ```
pub fn required_capacity(body_len: usize) -> usize {
    body_len + HEADER_LEN + 3 * INT_LEN
}

/// Stamp the buffer's full length into the total-length field.
pub fn create_frame(buf: &mut [u8]) -> Result<()> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(FrameError::Capacity {
            required: MIN_FRAME_LEN,
            available: buf.len(),
        });
    }
    let total = i32::try_from(buf.len()).map_err(|_| FrameError::Capacity {
        required: buf.len(),
        available: i32::MAX as usize,
    })?;
    write_i32(buf, TOTAL_LEN_OFFSET, total)
}

/// Write header length, sequence number and pattern; clear the last flag.
pub fn fill_header(buf: &mut [u8], seq: i32, pattern: Pattern) -> Result<()> {
    write_i32(buf, HEADER_LEN_OFFSET, HEADER_LEN as i32)?;
    write_i32(buf, SEQUENCE_OFFSET, seq)?;
    write_i32(buf, PATTERN_OFFSET, pattern.as_i32())?;
    write_i32(buf, LAST_FLAG_OFFSET, NOT_LAST_MESSAGE)
}

/// Write the body length and `body_len` bytes of the header's pattern.
///
/// The space check uses the lengths already declared in the buffer, so
/// [`create_frame`] and [`fill_header`] must run first.
pub fn fill_body<R: Rng + ?Sized>(buf: &mut [u8], body_len: usize, rng: &mut R) -> Result<()> {
    let total = declared_len(buf, TOTAL_LEN_OFFSET, "total length")?;
    let header = declared_len(buf, HEADER_LEN_OFFSET, "header length")?;
    let available = total.saturating_sub(header + 3 * INT_LEN);
    if body_len > available {
        return Err(FrameError::Capacity {
            required: body_len + header + 3 * INT_LEN,
            available: total,
        });
    }
    let pattern = Pattern::try_from(read_i32(buf, PATTERN_OFFSET)?)?;

    let len_offset = INT_LEN + header;
    let body_offset = len_offset + INT_LEN;
    ensure_len(buf, body_offset, body_len)?;
    let body_len_field = i32::try_from(body_len).map_err(|_| FrameError::InvalidLength {
        field: "body length",
        value: i32::MAX,
    })?;
    write_i32(buf, len_offset, body_len_field)?;

    let body = &mut buf[body_offset..body_offset + body_len];
    match pattern {
        Pattern::Random => {
            let mut sum = 0i32;
            for byte in body.iter_mut() {
                *byte = rng.gen();
                sum = sum.wrapping_add(*byte as i8 as i32);
            }
            write_i32(buf, CHECKSUM_OFFSET, sum)?;
        }
        fixed => {
            for (i, byte) in body.iter_mut().enumerate() {
                *byte = fixed.expected_byte(i).unwrap_or_default();
            }
        }
    }
    Ok(())
}

/// Allocate, create and fill a complete frame in one call.
pub fn build_frame<R: Rng + ?Sized>(
    body_len: usize,
    seq: i32,
    pattern: Pattern,
    rng: &mut R,
) -> Result<BytesMut> {
    let mut buf = BytesMut::zeroed(required_capacity(body_len));
    create_frame(&mut buf)?;
    fill_header(&mut buf, seq, pattern)?;
    fill_body(&mut buf, body_len, rng)?;
    Ok(buf)
}

/// Total length declared at offset 0.
pub fn frame_length(buf: &[u8]) -> Result<i32> {
    read_i32(buf, TOTAL_LEN_OFFSET)
}

/// Header length declared at offset 4.
pub fn header_length(buf: &[u8]) -> Result<i32> {
    read_i32(buf, HEADER_LEN_OFFSET)
}

pub fn sequence_number(buf: &[u8]) -> Result<i32> {
    read_i32(buf, SEQUENCE_OFFSET)
}

pub fn set_sequence_number(buf: &mut [u8], seq: i32) -> Result<()> {
    write_i32(buf, SEQUENCE_OFFSET, seq)
}

/// Raw pattern field; use [`Pattern::try_from`] to interpret it.
pub fn pattern_type(buf: &[u8]) -> Result<i32> {
    read_i32(buf, PATTERN_OFFSET)
}

pub fn checksum(buf: &[u8]) -> Result<i32> {
    read_i32(buf, CHECKSUM_OFFSET)
}

pub fn set_last_flag(buf: &mut [u8]) -> Result<()> {
    write_i32(buf, LAST_FLAG_OFFSET, LAST_MESSAGE)
}

pub fn set_not_last_flag(buf: &mut [u8]) -> Result<()> {
    write_i32(buf, LAST_FLAG_OFFSET, NOT_LAST_MESSAGE)
}

pub fn is_last_message(buf: &[u8]) -> Result<bool> {
    Ok(read_i32(buf, LAST_FLAG_OFFSET)? == LAST_MESSAGE)
}

/// Body length declared right after the header.
pub fn body_length(buf: &[u8]) -> Result<i32> {
    let header = declared_len(buf, HEADER_LEN_OFFSET, "header length")?;
    read_i32(buf, INT_LEN + header)
}

/// Borrow the body bytes as declared by the header and body length fields.
pub fn body(buf: &[u8]) -> Result<&[u8]> {
    let header = declared_len(buf, HEADER_LEN_OFFSET, "header length")?;
    let len_offset = INT_LEN + header;
    let body_len = declared_len(buf, len_offset, "body length")?;
    let start = len_offset + INT_LEN;
    ensure_len(buf, start, body_len)?;
    Ok(&buf[start..start + body_len])
}

/// Mutable counterpart of [`body`].
pub fn body_mut(buf: &mut [u8]) -> Result<&mut [u8]> {
    let header = declared_len(buf, HEADER_LEN_OFFSET, "header length")?;
    let len_offset = INT_LEN + header;
    let body_len = declared_len(buf, len_offset, "body length")?;
    let start = len_offset + INT_LEN;
    ensure_len(buf, start, body_len)?;
    Ok(&mut buf[start..start + body_len])
}

/// True when the unit is the 4-byte stop sentinel.
pub fn is_stop(buf: &[u8]) -> bool {
    matches!(read_i32(buf, TOTAL_LEN_OFFSET), Ok(len) if len == STOP_LEN as i32)
}

/// The stop sentinel as wire bytes.
pub fn stop_unit() -> [u8; STOP_LEN] {
    (STOP_LEN as i32).to_be_bytes()
}

/// Decoded copy of the fixed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub total_length: i32,
    pub header_length: i32,
    pub sequence_number: i32,
    pub pattern: Pattern,
    pub checksum: i32,
    pub last_message: bool,
    pub body_length: i32,
}

impl FrameHeader {
    /// Parse the header fields out of a frame buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            total_length: frame_length(buf)?,
            header_length: header_length(buf)?,
            sequence_number: sequence_number(buf)?,
            pattern: Pattern::try_from(pattern_type(buf)?)?,
            checksum: checksum(buf)?,
            last_message: is_last_message(buf)?,
            body_length: body_length(buf)?,
        })
    }
}

pub(crate) fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    ensure_len(buf, offset, INT_LEN)?;
    Ok((&buf[offset..offset + INT_LEN]).get_i32())
}

pub(crate) fn write_i32(buf: &mut [u8], offset: usize, value: i32) -> Result<()> {
    ensure_len(buf, offset, INT_LEN)?;
    (&mut buf[offset..offset + INT_LEN]).put_i32(value);
    Ok(())
}

fn declared_len(buf: &[u8], offset: usize, field: &'static str) -> Result<usize> {
    let value = read_i32(buf, offset)?;
    usize::try_from(value).map_err(|_| FrameError::InvalidLength { field, value })
}

fn ensure_len(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    match offset.checked_add(needed) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(FrameError::Truncated {
            offset,
            needed,
            len: buf.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn required_capacity_adds_header_and_three_ints() {
        assert_eq!(required_capacity(0), 44);
        assert_eq!(required_capacity(100), 144);
        assert_eq!(MIN_FRAME_LEN, required_capacity(0));
    }

    #[test]
    fn create_frame_writes_capacity() {
        let mut buf = vec![0u8; 64];
        create_frame(&mut buf).unwrap();
        assert_eq!(frame_length(&buf).unwrap(), 64);
    }

    #[test]
    fn create_frame_rejects_small_buffer() {
        let mut buf = vec![0u8; MIN_FRAME_LEN - 1];
        let err = create_frame(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Capacity { .. }));
    }

    #[test]
    fn fill_header_resets_last_flag() {
        let mut buf = vec![0u8; 64];
        create_frame(&mut buf).unwrap();
        set_last_flag(&mut buf).unwrap();
        fill_header(&mut buf, 9, Pattern::One).unwrap();

        assert_eq!(header_length(&buf).unwrap(), HEADER_LEN as i32);
        assert_eq!(sequence_number(&buf).unwrap(), 9);
        assert_eq!(pattern_type(&buf).unwrap(), Pattern::One.as_i32());
        assert!(!is_last_message(&buf).unwrap());
    }

    #[test]
    fn fill_body_rejects_oversized_body() {
        let mut buf = vec![0u8; required_capacity(10)];
        create_frame(&mut buf).unwrap();
        fill_header(&mut buf, 0, Pattern::Zero).unwrap();
        let err = fill_body(&mut buf, 11, &mut rng()).unwrap_err();
        assert!(matches!(err, FrameError::Capacity { .. }));
        fill_body(&mut buf, 10, &mut rng()).unwrap();
    }

    #[test]
    fn build_preserves_fields_for_every_pattern() {
        for pattern in Pattern::ALL {
            for body_len in [0usize, 1, 17, 300] {
                let frame = build_frame(body_len, 42, pattern, &mut rng()).unwrap();
                let header = FrameHeader::parse(&frame).unwrap();
                assert_eq!(header.body_length, body_len as i32);
                assert_eq!(header.pattern, pattern);
                assert_eq!(header.sequence_number, 42);
                assert_eq!(header.total_length as usize, frame.len());
                assert_eq!(body(&frame).unwrap().len(), body_len);
            }
        }
    }

    #[test]
    fn incrementing_body_wraps() {
        let frame = build_frame(300, 0, Pattern::Incrementing, &mut rng()).unwrap();
        let body = body(&frame).unwrap();
        for (i, byte) in body.iter().enumerate() {
            assert_eq!(*byte as usize, i % 256);
        }
    }

    #[test]
    fn fixed_patterns_fill_uniform_bytes() {
        let cases = [
            (Pattern::Zero, 0x00u8),
            (Pattern::One, 0x01),
            (Pattern::AlternatingBits, 0xCC),
        ];
        for (pattern, expected) in cases {
            for body_len in [1usize, 64, 1000] {
                let frame = build_frame(body_len, 1, pattern, &mut rng()).unwrap();
                assert!(body(&frame).unwrap().iter().all(|b| *b == expected));
            }
        }
    }

    #[test]
    fn random_body_checksum_is_signed_sum() {
        let frame = build_frame(512, 3, Pattern::Random, &mut rng()).unwrap();
        let sum = body(&frame)
            .unwrap()
            .iter()
            .fold(0i32, |acc, b| acc.wrapping_add(*b as i8 as i32));
        assert_eq!(checksum(&frame).unwrap(), sum);
    }

    #[test]
    fn sequence_and_flag_accessors() {
        let mut frame = build_frame(8, 1, Pattern::Zero, &mut rng()).unwrap();
        set_sequence_number(&mut frame, 77).unwrap();
        assert_eq!(sequence_number(&frame).unwrap(), 77);

        set_last_flag(&mut frame).unwrap();
        assert!(is_last_message(&frame).unwrap());
        set_not_last_flag(&mut frame).unwrap();
        assert!(!is_last_message(&frame).unwrap());
    }

    #[test]
    fn accessors_check_bounds() {
        let short = [0u8; 10];
        assert!(matches!(
            sequence_number(&short),
            Err(FrameError::Truncated { offset: 8, .. })
        ));
        assert!(is_last_message(&short).is_err());
    }

    #[test]
    fn stop_unit_is_recognized() {
        let unit = stop_unit();
        assert!(is_stop(&unit));
        assert_eq!(frame_length(&unit).unwrap(), 4);

        let frame = build_frame(0, 0, Pattern::Zero, &mut rng()).unwrap();
        assert!(!is_stop(&frame));
    }

    #[test]
    fn integers_are_big_endian() {
        let frame = build_frame(0, 0x0102_0304, Pattern::Zero, &mut rng()).unwrap();
        assert_eq!(&frame[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 4], &[1, 2, 3, 4]);
    }
}
