//! Timer capability abstractions
//!
//! A [`TimerPort`] is one hardware timer instance with a free-running
//! 16-bit counter, an input-capture channel wired to the receive line and
//! two compare channels. The transmit compare channel drives the transmit
//! line through its match action; the receive compare channel is only used
//! as a timeout and never drives a pin.

/// Output-compare channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompareChannel {
    /// Drives the transmit line
    Tx,
    /// Receive stop-window timeout
    Rx,
}

impl CompareChannel {
    /// Interrupt source raised by a match on this channel
    pub const fn event(self) -> EventSource {
        match self {
            CompareChannel::Tx => EventSource::TxCompare,
            CompareChannel::Rx => EventSource::RxTimeout,
        }
    }
}

/// Interrupt sources of one timer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventSource {
    /// Edge captured on the receive line
    Capture,
    /// Match on [`CompareChannel::Tx`]
    TxCompare,
    /// Match on [`CompareChannel::Rx`]
    RxTimeout,
}

/// What a compare match does to the channel's output pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MatchAction {
    /// Pin disconnected from the compare unit; keeps its last level
    #[default]
    None,
    /// Drive the pin high on match
    ForceHigh,
    /// Drive the pin low on match
    ForceLow,
    /// Invert the pin on match
    Toggle,
}

/// Capture edge polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Low to high transition
    Rising,
    /// High to low transition
    Falling,
}

/// Counter clock prescaler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescale {
    /// Counter runs at the CPU clock
    #[default]
    Div1,
    /// Counter runs at CPU clock / 8
    Div8,
}

impl Prescale {
    /// Clock divisor
    pub const fn divisor(self) -> u32 {
        match self {
            Prescale::Div1 => 1,
            Prescale::Div8 => 8,
        }
    }
}

/// One hardware timer instance dedicated to a software serial port
///
/// Implementations map these operations onto chip registers. None of the
/// methods may block; they are called from interrupt handlers.
pub trait TimerPort {
    /// Read the free-running counter
    fn now(&self) -> u16;

    /// Program the compare value of a channel
    fn set_compare(&mut self, channel: CompareChannel, target: u16);

    /// Read back the compare value of a channel
    fn compare(&self, channel: CompareChannel) -> u16;

    /// Select what a match on `channel` does to its output pin
    fn set_match_action(&mut self, channel: CompareChannel, action: MatchAction);

    /// Unmask an interrupt source
    fn enable_interrupt(&mut self, source: EventSource);

    /// Mask an interrupt source
    fn disable_interrupt(&mut self, source: EventSource);

    /// Select the edge the capture channel latches on
    fn set_capture_edge(&mut self, edge: Edge);

    /// Counter value latched by the most recent capture
    fn last_capture_time(&self) -> u16;

    /// Select the counter clock prescaler
    fn set_prescale(&mut self, prescale: Prescale);

    /// Configure the receive line as an input with pull-up
    fn enable_input_pullup(&mut self);

    /// Configure the transmit line as a driven output
    fn enable_output_drive(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_channel_events() {
        assert_eq!(CompareChannel::Tx.event(), EventSource::TxCompare);
        assert_eq!(CompareChannel::Rx.event(), EventSource::RxTimeout);
    }

    #[test]
    fn test_default_action_disconnects() {
        assert_eq!(MatchAction::default(), MatchAction::None);
    }

    #[test]
    fn test_prescale_divisor() {
        assert_eq!(Prescale::Div1.divisor(), 1);
        assert_eq!(Prescale::Div8.divisor(), 8);
    }
}
