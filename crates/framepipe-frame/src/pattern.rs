//! Body fill patterns.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Body-fill algorithm selected by a frame's pattern field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum Pattern {
    /// Every body byte is `0x00`.
    Zero = 0,
    /// Every body byte is `0x01`.
    One = 1,
    /// Every body byte is `0xCC`.
    AlternatingBits = 2,
    /// Byte at body offset `i` is `i mod 256`.
    #[default]
    Incrementing = 3,
    /// Uniform random bytes; the header carries their signed sum.
    Random = 4,
}

impl Pattern {
    /// Every pattern, in wire-value order.
    pub const ALL: [Pattern; 5] = [
        Pattern::Zero,
        Pattern::One,
        Pattern::AlternatingBits,
        Pattern::Incrementing,
        Pattern::Random,
    ];

    /// Wire value of this pattern.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Pattern::Zero => "zero",
            Pattern::One => "one",
            Pattern::AlternatingBits => "alternating_bits",
            Pattern::Incrementing => "incrementing",
            Pattern::Random => "random",
        }
    }

    /// Expected byte at body offset `index`, or `None` for [`Pattern::Random`].
    pub fn expected_byte(self, index: usize) -> Option<u8> {
        match self {
            Pattern::Zero => Some(0x00),
            Pattern::One => Some(0x01),
            Pattern::AlternatingBits => Some(0xCC),
            Pattern::Incrementing => Some((index % 256) as u8),
            Pattern::Random => None,
        }
    }
}

impl TryFrom<i32> for Pattern {
    type Error = FrameError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Pattern::Zero),
            1 => Ok(Pattern::One),
            2 => Ok(Pattern::AlternatingBits),
            3 => Ok(Pattern::Incrementing),
            4 => Ok(Pattern::Random),
            other => Err(FrameError::UnknownPattern(other)),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
