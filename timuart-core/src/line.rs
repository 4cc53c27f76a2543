//! Serial line levels

use core::ops::Not;

use timuart_hal::{Edge, MatchAction};

/// Logic level of a serial line
///
/// The idle (mark) level of an 8-N-1 line is [`Level::High`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Level of the least significant bit of `byte`
    pub const fn lsb(byte: u8) -> Self {
        if byte & 1 != 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Bit value to shift into the top of a receive accumulator
    pub const fn msb_mask(self) -> u8 {
        match self {
            Level::Low => 0x00,
            Level::High => 0x80,
        }
    }

    /// Compare match action that leaves the line at this level
    pub const fn match_action(self) -> MatchAction {
        match self {
            Level::Low => MatchAction::ForceLow,
            Level::High => MatchAction::ForceHigh,
        }
    }

    /// Edge that leaves this level
    pub const fn leaving_edge(self) -> Edge {
        match self {
            Level::Low => Edge::Rising,
            Level::High => Edge::Falling,
        }
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}
