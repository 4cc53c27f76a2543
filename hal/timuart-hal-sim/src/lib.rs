//! Host-side simulated timer for timuart
//!
//! [`SimTimer`] implements [`TimerPort`] over a virtual tick clock so the
//! serial engines can be exercised without hardware:
//!
//! - Compare matches apply their [`MatchAction`] to the transmit line
//! - The capture channel latches edges of the receive line
//! - The transmit line can be looped back into the receive line
//! - Receive waveforms can be scripted ahead of time
//!
//! Time only moves in [`SimTimer::next_event`], which jumps to the next
//! instant where an enabled interrupt source fires and reports it. The
//! caller then runs the matching handler, exactly like an interrupt vector
//! would.

#![no_std]
#![deny(unsafe_code)]

use heapless::{Deque, Vec};
use timuart_hal::{CompareChannel, Edge, EventSource, MatchAction, Prescale, TimerPort};

/// Capacity of the scripted receive waveform (level transitions)
pub const MAX_SCRIPTED_EDGES: usize = 1024;

/// Number of transmit line transitions kept in the trace
pub const TRACE_LEN: usize = 256;

/// Events that can fire at one instant: both compares plus a capture
const PENDING_LEN: usize = 4;

/// Errors from scripting the receive line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimError {
    /// Script buffer is full
    ScriptFull,
    /// Transition scheduled before the previous one or in the past
    OutOfOrder,
}

/// One transition of the transmit line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineEdge {
    /// Virtual time of the transition
    pub at: u64,
    /// Level after the transition
    pub high: bool,
}

/// Simulated 16-bit timer with one capture and two compare channels
#[derive(Debug)]
pub struct SimTimer {
    /// Virtual time in counter ticks; the counter is the low 16 bits
    time: u64,
    /// Extra ticks `now()` reports past the current event
    latency: u16,
    prescale: Prescale,
    compare: [u16; 2],
    action: [MatchAction; 2],
    /// Interrupt enables: capture, tx compare, rx timeout
    enabled: [bool; 3],
    capture_edge: Edge,
    capture_time: u16,
    /// Transmit line level
    output: bool,
    /// Receive line level
    input: bool,
    pulled_up: bool,
    driving: bool,
    loopback: bool,
    /// Scripted receive transitions, in time order
    script: Deque<LineEdge, MAX_SCRIPTED_EDGES>,
    /// Level the receive line has after the last scripted transition
    script_level: bool,
    pending: Deque<EventSource, PENDING_LEN>,
    trace: Vec<LineEdge, TRACE_LEN>,
}

impl Default for SimTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTimer {
    /// Create a timer at time zero with both lines idle (high)
    pub fn new() -> Self {
        Self {
            time: 0,
            latency: 0,
            prescale: Prescale::Div1,
            compare: [0; 2],
            action: [MatchAction::None; 2],
            enabled: [false; 3],
            capture_edge: Edge::Falling,
            capture_time: 0,
            output: true,
            input: true,
            pulled_up: false,
            driving: false,
            loopback: false,
            script: Deque::new(),
            script_level: true,
            pending: Deque::new(),
            trace: Vec::new(),
        }
    }

    /// Create a timer whose transmit line drives its receive line
    pub fn looped() -> Self {
        let mut timer = Self::new();
        timer.set_loopback(true);
        timer
    }

    /// Connect or disconnect the transmit line to the receive line
    pub fn set_loopback(&mut self, enabled: bool) {
        self.loopback = enabled;
    }

    /// Make `now()` read `ticks` past the time of the event being handled
    pub fn set_latency(&mut self, ticks: u16) {
        self.latency = ticks;
    }

    /// Current virtual time
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Level of the transmit line
    pub fn output_level(&self) -> bool {
        self.output
    }

    /// Level of the receive line
    pub fn input_level(&self) -> bool {
        self.input
    }

    /// Transitions of the transmit line, oldest first
    ///
    /// Recording stops once [`TRACE_LEN`] transitions have been kept.
    pub fn output_trace(&self) -> &[LineEdge] {
        &self.trace
    }

    /// Prescaler selected by the port
    pub fn prescale(&self) -> Prescale {
        self.prescale
    }

    /// Whether an interrupt source is unmasked
    pub fn is_enabled(&self, source: EventSource) -> bool {
        self.enabled[source_index(source)]
    }

    /// Current match action of a compare channel
    pub fn match_action(&self, channel: CompareChannel) -> MatchAction {
        self.action[channel_index(channel)]
    }

    /// Edge the capture channel is waiting for
    pub fn capture_edge(&self) -> Edge {
        self.capture_edge
    }

    /// Whether the receive pull-up was enabled
    pub fn is_pulled_up(&self) -> bool {
        self.pulled_up
    }

    /// Whether the transmit output driver was enabled
    pub fn is_driving(&self) -> bool {
        self.driving
    }

    /// Number of scripted receive transitions not yet reached
    pub fn scripted_remaining(&self) -> usize {
        self.script.len()
    }

    /// Schedule the receive line to change to `high` at time `at`
    ///
    /// Transitions must be scheduled in time order. Scheduling the level
    /// the line already has is a no-op.
    pub fn drive_level(&mut self, at: u64, high: bool) -> Result<(), SimError> {
        let last = self.script.back().map_or(self.time, |edge| edge.at);
        if at < last || at < self.time {
            return Err(SimError::OutOfOrder);
        }
        if high == self.script_level {
            return Ok(());
        }
        self.script
            .push_back(LineEdge { at, high })
            .map_err(|_| SimError::ScriptFull)?;
        self.script_level = high;
        Ok(())
    }

    /// Schedule one 8-N-1 frame on the receive line starting at `at`
    ///
    /// Returns the time the stop bit ends.
    pub fn drive_frame(&mut self, at: u64, byte: u8, ticks_per_bit: u16) -> Result<u64, SimError> {
        let bit = u64::from(ticks_per_bit);
        self.drive_level(at, false)?;
        for i in 0..8 {
            self.drive_level(at + bit * (i + 1), (byte >> i) & 1 != 0)?;
        }
        self.drive_level(at + bit * 9, true)?;
        Ok(at + bit * 10)
    }

    /// Schedule back-to-back frames starting at `at`
    ///
    /// Returns the time the last stop bit ends.
    pub fn drive_bytes(&mut self, at: u64, bytes: &[u8], ticks_per_bit: u16) -> Result<u64, SimError> {
        bytes
            .iter()
            .try_fold(at, |start, &byte| self.drive_frame(start, byte, ticks_per_bit))
    }

    /// Advance to the next interrupt and report its source
    ///
    /// Returns `None` when no enabled source will ever fire again. When a
    /// transmit match changes a looped-back line, the compare event is
    /// reported before the capture it causes.
    pub fn next_event(&mut self) -> Option<EventSource> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let tx = self.match_time(CompareChannel::Tx);
            let rx = self.match_time(CompareChannel::Rx);
            let edge = self.script.front().map(|edge| edge.at);
            let next = [tx, rx, edge].into_iter().flatten().min()?;
            self.time = next;

            if tx == Some(next) {
                self.pend(EventSource::TxCompare);
                let level = match self.action[channel_index(CompareChannel::Tx)] {
                    MatchAction::None => self.output,
                    MatchAction::ForceHigh => true,
                    MatchAction::ForceLow => false,
                    MatchAction::Toggle => !self.output,
                };
                self.set_output(level);
            }
            if rx == Some(next) {
                self.pend(EventSource::RxTimeout);
            }
            while let Some(edge) = self.script.front().copied() {
                if edge.at != next {
                    break;
                }
                self.script.pop_front();
                self.set_input(edge.high);
            }
        }
    }

    /// Time of the next match on `channel`, if its interrupt is enabled
    fn match_time(&self, channel: CompareChannel) -> Option<u64> {
        if !self.is_enabled(channel.event()) {
            return None;
        }
        let counter = self.time as u16;
        let delta = match self.compare[channel_index(channel)].wrapping_sub(counter) {
            // The counter already sits on the target; the next match is a
            // full wrap away.
            0 => 0x1_0000,
            d => u64::from(d),
        };
        Some(self.time + delta)
    }

    fn pend(&mut self, source: EventSource) {
        // A source already pending is latched once, like a hardware flag
        if !self.pending.iter().any(|&p| p == source) {
            let _ = self.pending.push_back(source);
        }
    }

    fn set_output(&mut self, high: bool) {
        if high == self.output {
            return;
        }
        self.output = high;
        let _ = self.trace.push(LineEdge { at: self.time, high });
        if self.loopback && self.driving {
            self.set_input(high);
        }
    }

    fn set_input(&mut self, high: bool) {
        if high == self.input {
            return;
        }
        self.input = high;
        let edge = if high { Edge::Rising } else { Edge::Falling };
        if self.is_enabled(EventSource::Capture) && edge == self.capture_edge {
            self.capture_time = self.time as u16;
            self.pend(EventSource::Capture);
        }
    }
}

impl TimerPort for SimTimer {
    fn now(&self) -> u16 {
        (self.time as u16).wrapping_add(self.latency)
    }

    fn set_compare(&mut self, channel: CompareChannel, target: u16) {
        self.compare[channel_index(channel)] = target;
    }

    fn compare(&self, channel: CompareChannel) -> u16 {
        self.compare[channel_index(channel)]
    }

    fn set_match_action(&mut self, channel: CompareChannel, action: MatchAction) {
        self.action[channel_index(channel)] = action;
    }

    fn enable_interrupt(&mut self, source: EventSource) {
        self.enabled[source_index(source)] = true;
    }

    fn disable_interrupt(&mut self, source: EventSource) {
        self.enabled[source_index(source)] = false;
        // Masking also discards a latched request
        let mut kept = Deque::<EventSource, PENDING_LEN>::new();
        while let Some(p) = self.pending.pop_front() {
            if p != source {
                let _ = kept.push_back(p);
            }
        }
        self.pending = kept;
    }

    fn set_capture_edge(&mut self, edge: Edge) {
        self.capture_edge = edge;
    }

    fn last_capture_time(&self) -> u16 {
        self.capture_time
    }

    fn set_prescale(&mut self, prescale: Prescale) {
        self.prescale = prescale;
    }

    fn enable_input_pullup(&mut self) {
        self.pulled_up = true;
    }

    fn enable_output_drive(&mut self) {
        self.driving = true;
    }
}

fn channel_index(channel: CompareChannel) -> usize {
    match channel {
        CompareChannel::Tx => 0,
        CompareChannel::Rx => 1,
    }
}

fn source_index(source: EventSource) -> usize {
    match source {
        EventSource::Capture => 0,
        EventSource::TxCompare => 1,
        EventSource::RxTimeout => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timer_has_no_events() {
        let mut timer = SimTimer::new();
        assert_eq!(timer.next_event(), None);
        assert_eq!(timer.time(), 0);
    }

    #[test]
    fn test_compare_fires_at_target() {
        let mut timer = SimTimer::new();
        timer.set_compare(CompareChannel::Rx, 500);
        timer.enable_interrupt(EventSource::RxTimeout);

        assert_eq!(timer.next_event(), Some(EventSource::RxTimeout));
        assert_eq!(timer.time(), 500);
        assert_eq!(timer.now(), 500);

        // Left armed, the same target matches again one wrap later
        assert_eq!(timer.next_event(), Some(EventSource::RxTimeout));
        assert_eq!(timer.time(), 500 + 0x1_0000);
    }

    #[test]
    fn test_disabled_compare_never_fires() {
        let mut timer = SimTimer::new();
        timer.set_compare(CompareChannel::Tx, 100);
        timer.set_match_action(CompareChannel::Tx, MatchAction::ForceLow);
        assert_eq!(timer.next_event(), None);
        assert!(timer.output_level());
    }

    #[test]
    fn test_match_action_drives_output() {
        let mut timer = SimTimer::new();
        timer.enable_output_drive();
        timer.set_compare(CompareChannel::Tx, 40);
        timer.set_match_action(CompareChannel::Tx, MatchAction::ForceLow);
        timer.enable_interrupt(EventSource::TxCompare);

        assert_eq!(timer.next_event(), Some(EventSource::TxCompare));
        assert!(!timer.output_level());
        assert_eq!(timer.output_trace(), &[LineEdge { at: 40, high: false }]);

        timer.set_match_action(CompareChannel::Tx, MatchAction::Toggle);
        timer.set_compare(CompareChannel::Tx, 90);
        assert_eq!(timer.next_event(), Some(EventSource::TxCompare));
        assert!(timer.output_level());
    }

    #[test]
    fn test_loopback_compare_before_capture() {
        let mut timer = SimTimer::looped();
        timer.enable_output_drive();
        timer.set_capture_edge(Edge::Falling);
        timer.enable_interrupt(EventSource::Capture);
        timer.set_compare(CompareChannel::Tx, 16);
        timer.set_match_action(CompareChannel::Tx, MatchAction::ForceLow);
        timer.enable_interrupt(EventSource::TxCompare);

        assert_eq!(timer.next_event(), Some(EventSource::TxCompare));
        assert_eq!(timer.next_event(), Some(EventSource::Capture));
        assert_eq!(timer.last_capture_time(), 16);
        assert!(!timer.input_level());
    }

    #[test]
    fn test_capture_honours_edge() {
        let mut timer = SimTimer::new();
        timer.set_capture_edge(Edge::Rising);
        timer.enable_interrupt(EventSource::Capture);
        timer.drive_level(10, false).unwrap();
        timer.drive_level(30, true).unwrap();

        // The falling edge at 10 is not latched
        assert_eq!(timer.next_event(), Some(EventSource::Capture));
        assert_eq!(timer.last_capture_time(), 30);
        assert_eq!(timer.next_event(), None);
    }

    #[test]
    fn test_scripted_frame_levels() {
        let mut timer = SimTimer::new();
        // 0x0F: four high bits then four low bits
        let end = timer.drive_frame(100, 0x0F, 10).unwrap();
        assert_eq!(end, 200);
        // start low, rise at bit 0, fall at bit 4, rise at stop bit
        assert_eq!(timer.scripted_remaining(), 4);
    }

    #[test]
    fn test_script_rejects_out_of_order() {
        let mut timer = SimTimer::new();
        timer.drive_level(50, false).unwrap();
        assert_eq!(timer.drive_level(40, true), Err(SimError::OutOfOrder));
    }

    #[test]
    fn test_latency_shifts_now() {
        let mut timer = SimTimer::new();
        timer.set_latency(7);
        timer.set_compare(CompareChannel::Rx, 0xFFFE);
        timer.enable_interrupt(EventSource::RxTimeout);
        assert_eq!(timer.next_event(), Some(EventSource::RxTimeout));
        assert_eq!(timer.now(), 5);
    }

    #[test]
    fn test_disable_discards_pending() {
        let mut timer = SimTimer::looped();
        timer.enable_output_drive();
        timer.enable_interrupt(EventSource::Capture);
        timer.set_compare(CompareChannel::Tx, 16);
        timer.set_match_action(CompareChannel::Tx, MatchAction::ForceLow);
        timer.enable_interrupt(EventSource::TxCompare);

        assert_eq!(timer.next_event(), Some(EventSource::TxCompare));
        timer.disable_interrupt(EventSource::Capture);
        timer.disable_interrupt(EventSource::TxCompare);
        assert_eq!(timer.next_event(), None);
    }
}
