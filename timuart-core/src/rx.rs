//! Receive engine
//!
//! Bits are never sampled. The capture channel timestamps every level
//! change on the receive line, and each data bit is reconstructed from
//! those timestamps: when an edge arrives, every bit centre that passed
//! since the previous edge held the level that this edge is leaving.
//!
//! A frame that ends in a run of high bits produces no closing edge, so a
//! second compare channel is armed as a timeout 9.25 bit periods after the
//! start edge. When it fires, the remaining bits take the current line
//! level.

use timuart_hal::{CompareChannel, Edge, EventSource, TimerPort};

use crate::line::Level;
use crate::queue::ByteQueue;
use crate::timing::{Late, TimingConfig};

const IDLE: u8 = 0;
const FIRST_DATA: u8 = 1;
const COMPLETE: u8 = 9;

/// Input to the receive state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxEvent {
    /// Edge captured at counter value `at`
    Capture { at: u16 },
    /// Stop window elapsed
    Timeout,
}

/// Output of the receive state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxAction {
    /// Event carried no frame information
    Ignore,
    /// Start edge seen; arm the timeout for `timeout_at`
    Start { timeout_at: u16 },
    /// Frame still in progress
    Continue,
    /// Frame finished with this byte; disarm the timeout
    Complete(u8),
}

/// Receive frame state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxFrame {
    /// 0 when idle, otherwise one more than the bits received
    state: u8,
    /// Bits received so far, shifted in from the top
    byte: u8,
    /// Capture time of the start edge
    start: u16,
    /// Centre of the next data bit not yet accounted for
    target: u16,
    /// Line level after the most recent edge
    level: Level,
}

impl Default for RxFrame {
    fn default() -> Self {
        Self::IDLE
    }
}

impl RxFrame {
    /// Line at mark, waiting for a start edge
    pub const IDLE: Self = Self {
        state: IDLE,
        byte: 0,
        start: 0,
        target: 0,
        level: Level::High,
    };

    /// Position counter (0 = idle)
    pub const fn state(&self) -> u8 {
        self.state
    }

    /// Tracked line level
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Centre of the next unaccounted data bit
    pub const fn target(&self) -> u16 {
        self.target
    }

    /// Check if no frame is in progress
    pub const fn is_idle(&self) -> bool {
        self.state == IDLE
    }

    /// Edge the capture channel must listen for next
    pub const fn expected_edge(&self) -> Edge {
        self.level.leaving_edge()
    }

    /// Process one event
    pub fn on_event(self, event: RxEvent, timing: &TimingConfig) -> (Self, RxAction) {
        match event {
            RxEvent::Capture { at } => self.on_capture(at, timing),
            RxEvent::Timeout => self.on_timeout(),
        }
    }

    fn on_capture(self, at: u16, timing: &TimingConfig) -> (Self, RxAction) {
        let tpb = timing.ticks_per_bit();
        let held = self.level;
        let mut frame = self;
        frame.level = !held;

        if frame.is_idle() {
            if held == Level::High {
                frame.state = FIRST_DATA;
                frame.byte = 0;
                frame.start = at;
                frame.target = at.wrapping_add(tpb).wrapping_add(tpb / 2);
                let timeout_at = at.wrapping_add(timing.stop_window_ticks());
                return (frame, RxAction::Start { timeout_at });
            }
            return (frame, RxAction::Ignore);
        }

        // Every bit centre up to this edge saw the level being left. Both
        // sides are offsets from the start edge; at slow rates a frame spans
        // more than half the counter, so a signed difference would wrap.
        let elapsed = at.wrapping_sub(frame.start);
        while elapsed >= frame.target.wrapping_sub(frame.start) {
            frame.byte = (frame.byte >> 1) | held.msb_mask();
            frame.target = frame.target.wrapping_add(tpb);
            frame.state += 1;
            if frame.state >= COMPLETE {
                return (Self::IDLE, RxAction::Complete(frame.byte));
            }
        }
        (frame, RxAction::Continue)
    }

    fn on_timeout(self) -> (Self, RxAction) {
        if self.is_idle() {
            return (self, RxAction::Ignore);
        }
        let mut byte = self.byte;
        for _ in self.state..COMPLETE {
            byte = (byte >> 1) | self.level.msb_mask();
        }
        (Self::IDLE, RxAction::Complete(byte))
    }
}

/// Receive side of a port: frame state plus its effect on the timer
#[derive(Debug, Default)]
pub struct RxEngine {
    frame: RxFrame,
}

impl RxEngine {
    /// Create an idle engine
    pub const fn new() -> Self {
        Self {
            frame: RxFrame::IDLE,
        }
    }

    /// Current frame state
    pub fn frame(&self) -> RxFrame {
        self.frame
    }

    /// Check if no frame is in progress
    pub fn is_idle(&self) -> bool {
        self.frame.is_idle()
    }

    /// Forget any frame in progress
    pub fn reset(&mut self) {
        self.frame = RxFrame::IDLE;
    }

    /// Handle an edge latched by the capture channel
    pub fn on_capture<T: TimerPort, const N: usize>(
        &mut self,
        timer: &mut T,
        timing: &TimingConfig,
        queue: &ByteQueue<N>,
    ) -> Result<(), Late> {
        let at = timer.last_capture_time();
        let late = timing.check_latency(at, timer.now());
        self.step(timer, timing, queue, RxEvent::Capture { at });
        late
    }

    /// Handle expiry of the stop window
    pub fn on_timeout<T: TimerPort, const N: usize>(
        &mut self,
        timer: &mut T,
        timing: &TimingConfig,
        queue: &ByteQueue<N>,
    ) -> Result<(), Late> {
        timer.disable_interrupt(EventSource::RxTimeout);
        let late = if self.frame.is_idle() {
            Ok(())
        } else {
            timing.check_latency(timer.compare(CompareChannel::Rx), timer.now())
        };
        self.step(timer, timing, queue, RxEvent::Timeout);
        late
    }

    fn step<T: TimerPort, const N: usize>(
        &mut self,
        timer: &mut T,
        timing: &TimingConfig,
        queue: &ByteQueue<N>,
        event: RxEvent,
    ) {
        let (frame, action) = self.frame.on_event(event, timing);
        self.frame = frame;
        timer.set_capture_edge(frame.expected_edge());

        match action {
            RxAction::Start { timeout_at } => {
                timer.set_compare(CompareChannel::Rx, timeout_at);
                timer.enable_interrupt(EventSource::RxTimeout);
            }
            RxAction::Complete(byte) => {
                timer.disable_interrupt(EventSource::RxTimeout);
                if !queue.push(byte) {
                    trace!("rx queue full, dropped {=u8:#x}", byte);
                }
            }
            RxAction::Ignore | RxAction::Continue => {}
        }
    }
}
