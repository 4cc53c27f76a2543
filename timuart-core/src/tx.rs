//! Transmit engine
//!
//! The transmit line is driven by the compare unit itself: each compare
//! match forces the line to a preprogrammed level at an exact counter
//! value, and the handler only has to program the *next* level change.
//! Consecutive bits of the same level need no match at all, so a byte
//! costs one interrupt per level change plus one for the stop bit tail.
//!
//! Frame positions, counted by `state`:
//!
//! ```text
//! state  0     idle
//! state  1..9  start bit on the line, data bits state-1.. still pending
//! state 10     all ten positions consumed, stop bit on the line
//! state 11     holding the stop bit for its full period
//! ```

use timuart_hal::{CompareChannel, EventSource, MatchAction, TimerPort};

use crate::line::Level;
use crate::queue::ByteQueue;
use crate::timing::{Late, TimingConfig};

/// Delay from arming an idle engine to the leading edge of its start bit
pub const START_DELAY_TICKS: u16 = 16;

const IDLE: u8 = 0;
const FIRST_DATA: u8 = 1;
const STOP_BIT: u8 = 9;
const FRAME_DONE: u8 = 10;
const STOP_HOLD: u8 = 11;

/// What the compare unit must do after a transmit transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxAction {
    /// Force the line to `level` when the counter reaches `at`
    Drive { level: Level, at: u16 },
    /// Leave the line alone and wake again at `at`
    Hold { at: u16 },
    /// Take the peeked byte off the queue and start its start bit at `at`
    Load { at: u16 },
    /// Disconnect the line from the compare unit and stop interrupting
    Release,
}

/// Transmit frame state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxFrame {
    state: u8,
    /// Data bits not yet emitted, next bit in the LSB
    byte: u8,
    /// Level the line has once the scheduled match fires
    level: Level,
    /// Counter value of the scheduled match
    target: u16,
}

impl Default for TxFrame {
    fn default() -> Self {
        Self::IDLE
    }
}

impl TxFrame {
    /// Nothing on the line
    pub const IDLE: Self = Self {
        state: IDLE,
        byte: 0,
        level: Level::High,
        target: 0,
    };

    /// Frame for `byte` whose start bit begins shortly after `now`
    pub const fn load(byte: u8, now: u16) -> Self {
        Self::starting_at(byte, now.wrapping_add(START_DELAY_TICKS))
    }

    const fn starting_at(byte: u8, at: u16) -> Self {
        Self {
            state: FIRST_DATA,
            byte,
            level: Level::Low,
            target: at,
        }
    }

    /// Position counter (0 = idle)
    pub const fn state(&self) -> u8 {
        self.state
    }

    /// Level after the scheduled match
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Counter value of the scheduled match
    pub const fn target(&self) -> u16 {
        self.target
    }

    /// Check if no frame is in progress
    pub const fn is_idle(&self) -> bool {
        self.state == IDLE
    }

    /// Advance past the compare match that just fired at `self.target`
    ///
    /// `next` is the byte waiting in the queue, if any. It is only
    /// consumed when the returned action is [`TxAction::Load`].
    pub fn on_compare(self, ticks_per_bit: u16, now: u16, next: Option<u8>) -> (Self, TxAction) {
        if self.is_idle() {
            return (Self::IDLE, TxAction::Release);
        }

        let mut frame = self;
        let mut target = self.target;
        while frame.state < FRAME_DONE {
            target = target.wrapping_add(ticks_per_bit);
            let bit = if frame.state < STOP_BIT {
                Level::lsb(frame.byte)
            } else {
                Level::High
            };
            frame.byte >>= 1;
            frame.state += 1;
            if bit != frame.level {
                frame.level = bit;
                frame.target = target;
                return (frame, TxAction::Drive { level: bit, at: target });
            }
        }

        let stop_end = target.wrapping_add(ticks_per_bit);
        match next {
            None if frame.state == FRAME_DONE => {
                frame.state = STOP_HOLD;
                frame.target = stop_end;
                (frame, TxAction::Hold { at: stop_end })
            }
            None => (Self::IDLE, TxAction::Release),
            Some(byte) => {
                // Straight out of a consumed stop bit the next start bit
                // follows without a gap; after the hold it is re-armed.
                let at = if frame.state == FRAME_DONE {
                    stop_end
                } else {
                    now.wrapping_add(START_DELAY_TICKS)
                };
                (Self::starting_at(byte, at), TxAction::Load { at })
            }
        }
    }
}

/// Transmit side of a port: frame state plus its effect on the timer
#[derive(Debug, Default)]
pub struct TxEngine {
    frame: TxFrame,
}

impl TxEngine {
    /// Create an idle engine
    pub const fn new() -> Self {
        Self {
            frame: TxFrame::IDLE,
        }
    }

    /// Current frame state
    pub fn frame(&self) -> TxFrame {
        self.frame
    }

    /// Check if the line is quiet
    pub fn is_idle(&self) -> bool {
        self.frame.is_idle()
    }

    /// Forget any frame in progress
    pub fn reset(&mut self) {
        self.frame = TxFrame::IDLE;
    }

    /// Start sending `byte` on an idle engine
    pub fn start<T: TimerPort>(&mut self, timer: &mut T, byte: u8) {
        self.frame = TxFrame::load(byte, timer.now());
        timer.enable_interrupt(EventSource::TxCompare);
        timer.set_match_action(CompareChannel::Tx, MatchAction::ForceLow);
        timer.set_compare(CompareChannel::Tx, self.frame.target());
    }

    /// Handle a match on the transmit compare channel
    ///
    /// The transition always completes; `Err` only reports that the
    /// handler started too long after the match.
    pub fn on_compare<T: TimerPort, const N: usize>(
        &mut self,
        timer: &mut T,
        timing: &TimingConfig,
        queue: &ByteQueue<N>,
    ) -> Result<(), Late> {
        let now = timer.now();
        let late = if self.frame.is_idle() {
            Ok(())
        } else {
            timing.check_latency(self.frame.target(), now)
        };

        let next = queue.peek();
        let (frame, action) = self.frame.on_compare(timing.ticks_per_bit(), now, next);
        self.frame = frame;

        match action {
            TxAction::Drive { level, at } => {
                timer.set_match_action(CompareChannel::Tx, level.match_action());
                timer.set_compare(CompareChannel::Tx, at);
            }
            TxAction::Hold { at } => timer.set_compare(CompareChannel::Tx, at),
            TxAction::Load { at } => {
                // Only this handler consumes the queue, so the pop returns
                // the byte that was peeked
                let popped = queue.pop();
                debug_assert_eq!(popped, next);
                if let Some(byte) = popped {
                    self.frame = TxFrame::starting_at(byte, at);
                }
                timer.set_match_action(CompareChannel::Tx, MatchAction::ForceLow);
                timer.set_compare(CompareChannel::Tx, at);
            }
            TxAction::Release => {
                timer.set_match_action(CompareChannel::Tx, MatchAction::None);
                timer.disable_interrupt(EventSource::TxCompare);
            }
        }
        late
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    const TPB: u16 = 100;

    /// Step a frame until it releases, collecting every action
    fn run(byte: u8, start_now: u16) -> Vec<TxAction> {
        let mut frame = TxFrame::load(byte, start_now);
        let mut actions = Vec::new();
        loop {
            let (next, action) = frame.on_compare(TPB, frame.target(), None);
            actions.push(action);
            frame = next;
            if action == TxAction::Release {
                return actions;
            }
        }
    }

    #[test]
    fn test_load_schedules_start_bit() {
        let frame = TxFrame::load(0x41, 1000);
        assert_eq!(frame.state(), 1);
        assert_eq!(frame.level(), Level::Low);
        assert_eq!(frame.target(), 1000 + START_DELAY_TICKS);
    }

    #[test]
    fn test_zero_byte_single_edge() {
        // Start bit and eight zero bits are one low run; only the stop
        // bit needs a match.
        let actions = run(0x00, 0);
        assert_eq!(
            actions,
            [
                TxAction::Drive { level: Level::High, at: 16 + 9 * TPB },
                TxAction::Hold { at: 16 + 10 * TPB },
                TxAction::Release,
            ]
        );
    }

    #[test]
    fn test_ff_byte_single_edge() {
        let actions = run(0xFF, 0);
        assert_eq!(
            actions,
            [
                TxAction::Drive { level: Level::High, at: 16 + TPB },
                TxAction::Hold { at: 16 + 10 * TPB },
                TxAction::Release,
            ]
        );
    }

    #[test]
    fn test_alternating_byte_edge_per_bit() {
        // 0x55 LSB first: 1 0 1 0 1 0 1 0, then the stop bit
        let actions = run(0x55, 0);
        let drives: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                TxAction::Drive { level, at } => Some((*level, *at)),
                _ => None,
            })
            .collect();
        assert_eq!(drives.len(), 9);
        for (i, (level, at)) in drives.iter().enumerate() {
            let expected = if i % 2 == 0 { Level::High } else { Level::Low };
            assert_eq!(*level, expected);
            assert_eq!(*at, 16 + (i as u16 + 1) * TPB);
        }
    }

    #[test]
    fn test_queued_byte_follows_without_gap() {
        let frame = TxFrame::load(0x00, 0);
        // Fires at start bit, schedules the stop bit edge
        let (frame, _) = frame.on_compare(TPB, frame.target(), Some(0x33));
        // Stop bit edge fires with a byte queued
        let (frame, action) = frame.on_compare(TPB, frame.target(), Some(0x33));
        assert_eq!(action, TxAction::Load { at: 16 + 10 * TPB });
        assert_eq!(frame.state(), 1);
        assert_eq!(frame.level(), Level::Low);
    }

    #[test]
    fn test_byte_during_hold_restarts_soon() {
        let frame = TxFrame::load(0xFF, 0);
        let (frame, _) = frame.on_compare(TPB, frame.target(), None);
        let (frame, action) = frame.on_compare(TPB, frame.target(), None);
        assert_eq!(action, TxAction::Hold { at: 16 + 10 * TPB });

        let now = frame.target() + 3;
        let (_, action) = frame.on_compare(TPB, now, Some(0x01));
        assert_eq!(action, TxAction::Load { at: now + START_DELAY_TICKS });
    }

    #[test]
    fn test_idle_compare_releases() {
        let (frame, action) = TxFrame::IDLE.on_compare(TPB, 0, Some(1));
        assert!(frame.is_idle());
        assert_eq!(action, TxAction::Release);
    }

    #[test]
    fn test_engine_load_takes_byte_from_queue() {
        use timuart_hal_sim::SimTimer;

        let timing = TimingConfig::from_cycles_per_bit(u32::from(TPB)).unwrap();
        let queue = ByteQueue::<4>::new();
        let mut timer = SimTimer::new();
        let mut engine = TxEngine::new();

        engine.start(&mut timer, 0x00);
        assert!(queue.push(0x33));
        assert!(queue.push(0x44));

        // Start bit match, then the stop bit edge loads the next byte
        let fire = |engine: &mut TxEngine, timer: &mut SimTimer| {
            assert_eq!(timer.next_event(), Some(EventSource::TxCompare));
            engine.on_compare(timer, &timing, &queue).unwrap();
        };
        fire(&mut engine, &mut timer);
        let stop_at = engine.frame().target();
        fire(&mut engine, &mut timer);

        let load_at = stop_at.wrapping_add(TPB);
        assert_eq!(engine.frame(), TxFrame::starting_at(0x33, load_at));
        assert_eq!(timer.compare(CompareChannel::Tx), load_at);
        assert_eq!(timer.match_action(CompareChannel::Tx), MatchAction::ForceLow);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek(), Some(0x44));

        // 0x33 starts with a high bit
        fire(&mut engine, &mut timer);
        assert_eq!(engine.frame().target(), load_at.wrapping_add(TPB));
        assert_eq!(timer.match_action(CompareChannel::Tx), MatchAction::ForceHigh);
    }

    #[test]
    fn test_targets_wrap_counter() {
        let actions = run(0x00, 0xFFF0);
        assert_eq!(
            actions[0],
            TxAction::Drive {
                level: Level::High,
                at: 0xFFF0u16.wrapping_add(16 + 9 * TPB)
            }
        );
    }
}
