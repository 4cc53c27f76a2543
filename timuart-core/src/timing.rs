//! Bit timing derived from the baud rate
//!
//! All scheduling happens in timer ticks on a 16-bit counter. The longest
//! interval the engines ever schedule is the receive stop window, a little
//! over nine bit periods, so a bit period is only representable when that
//! window still fits the counter. Slow baud rates fall back to the /8
//! prescaler; anything slower than that is rejected.

use core::fmt;

use timuart_hal::Prescale;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest bit period, in ticks, whose stop window fits 16 bits
pub const MAX_TICKS_PER_BIT: u32 = 7084;

/// Errors from deriving a timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Bit period is zero or too long even with the coarsest prescaler
    Unsupported,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Unsupported => f.write_str("bit period not representable on a 16-bit timer"),
        }
    }
}

/// An event handler ran later than its scheduled time allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Late {
    /// Ticks between the scheduled time and handler entry
    pub ticks: u16,
}

/// Bit timing in counter ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    ticks_per_bit: u16,
    stop_window_ticks: u16,
    prescale: Prescale,
}

impl TimingConfig {
    /// Derive timing from the number of CPU cycles in one bit period
    pub fn from_cycles_per_bit(cycles_per_bit: u32) -> Result<Self, ConfigError> {
        let (ticks, prescale) = if cycles_per_bit == 0 {
            return Err(ConfigError::Unsupported);
        } else if cycles_per_bit <= MAX_TICKS_PER_BIT {
            (cycles_per_bit, Prescale::Div1)
        } else if cycles_per_bit / 8 <= MAX_TICKS_PER_BIT {
            (cycles_per_bit / 8, Prescale::Div8)
        } else {
            return Err(ConfigError::Unsupported);
        };

        let stop_window = ticks * 37 / 4;
        Ok(Self {
            ticks_per_bit: ticks as u16,
            stop_window_ticks: stop_window as u16,
            prescale,
        })
    }

    /// One bit period
    pub const fn ticks_per_bit(&self) -> u16 {
        self.ticks_per_bit
    }

    /// Time after a start edge by which a frame is presumed complete
    ///
    /// 9.25 bit periods: past the middle of the last data bit but before
    /// the earliest possible next start edge.
    pub const fn stop_window_ticks(&self) -> u16 {
        self.stop_window_ticks
    }

    /// Counter prescaler
    pub const fn prescale(&self) -> Prescale {
        self.prescale
    }

    /// Largest tolerated delay between an event and its handler
    ///
    /// Beyond one bit period the next scheduled target may already have
    /// passed.
    pub const fn max_latency_ticks(&self) -> u16 {
        self.ticks_per_bit
    }

    /// Compare handler entry time against the time the event was due
    pub fn check_latency(&self, scheduled: u16, now: u16) -> Result<(), Late> {
        let ticks = now.wrapping_sub(scheduled);
        if ticks > self.max_latency_ticks() {
            Err(Late { ticks })
        } else {
            Ok(())
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerialConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Timer input clock before prescaling, in Hz
    pub clock_hz: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baudrate: 9600,
            clock_hz: 16_000_000,
        }
    }
}

impl SerialConfig {
    /// Create a configuration for the given baud rate and clock
    pub const fn new(baudrate: u32, clock_hz: u32) -> Self {
        Self { baudrate, clock_hz }
    }

    /// CPU cycles per bit, rounded to nearest
    ///
    /// Returns 0 for a zero baud rate, which timing derivation rejects.
    pub fn cycles_per_bit(&self) -> u32 {
        if self.baudrate == 0 {
            return 0;
        }
        let baud = u64::from(self.baudrate);
        ((u64::from(self.clock_hz) + baud / 2) / baud) as u32
    }

    /// Derive the timer timing for this configuration
    pub fn timing(&self) -> Result<TimingConfig, ConfigError> {
        TimingConfig::from_cycles_per_bit(self.cycles_per_bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_baud_no_prescale() {
        let timing = TimingConfig::from_cycles_per_bit(1667).unwrap();
        assert_eq!(timing.prescale(), Prescale::Div1);
        assert_eq!(timing.ticks_per_bit(), 1667);
        assert_eq!(timing.stop_window_ticks(), 1667 * 37 / 4);
    }

    #[test]
    fn test_boundary_stays_unscaled() {
        let timing = TimingConfig::from_cycles_per_bit(MAX_TICKS_PER_BIT).unwrap();
        assert_eq!(timing.prescale(), Prescale::Div1);
        assert_eq!(timing.stop_window_ticks(), 65_527);

        let timing = TimingConfig::from_cycles_per_bit(MAX_TICKS_PER_BIT + 1).unwrap();
        assert_eq!(timing.prescale(), Prescale::Div8);
        assert_eq!(timing.ticks_per_bit(), 885);
    }

    #[test]
    fn test_prescale_matches_unscaled_division() {
        for cycles in [7085u32, 10_000, 10_007, 33_333, 56_679] {
            let timing = TimingConfig::from_cycles_per_bit(cycles).unwrap();
            assert_eq!(timing.prescale(), Prescale::Div8);
            assert_eq!(u32::from(timing.ticks_per_bit()), cycles / 8);
            // Nine bit periods always fit the counter
            assert!(u32::from(timing.ticks_per_bit()) * 9 <= u32::from(u16::MAX));
        }
    }

    #[test]
    fn test_unrepresentable_rejected() {
        assert_eq!(
            TimingConfig::from_cycles_per_bit(56_680),
            Err(ConfigError::Unsupported)
        );
        assert_eq!(
            TimingConfig::from_cycles_per_bit(u32::MAX),
            Err(ConfigError::Unsupported)
        );
        assert_eq!(
            TimingConfig::from_cycles_per_bit(0),
            Err(ConfigError::Unsupported)
        );
    }

    #[test]
    fn test_serial_config_rounding() {
        let config = SerialConfig::default();
        assert_eq!(config.cycles_per_bit(), 1667); // 1666.67 rounds up

        let config = SerialConfig::new(115_200, 16_000_000);
        assert_eq!(config.cycles_per_bit(), 139);
    }

    #[test]
    fn test_minimum_baud_at_16mhz() {
        assert!(SerialConfig::new(283, 16_000_000).timing().is_ok());
        assert_eq!(
            SerialConfig::new(282, 16_000_000).timing(),
            Err(ConfigError::Unsupported)
        );
        assert_eq!(
            SerialConfig::new(0, 16_000_000).timing(),
            Err(ConfigError::Unsupported)
        );
    }

    #[test]
    fn test_latency_check() {
        let timing = TimingConfig::from_cycles_per_bit(100).unwrap();
        assert_eq!(timing.check_latency(1000, 1000), Ok(()));
        assert_eq!(timing.check_latency(1000, 1100), Ok(()));
        assert_eq!(timing.check_latency(1000, 1101), Err(Late { ticks: 101 }));
        // Across counter wrap
        assert_eq!(timing.check_latency(0xFFF0, 0x0010), Ok(()));
    }
}
