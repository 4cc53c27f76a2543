//! Software serial port
//!
//! [`SoftSerial`] ties the two engines, their queues and a [`TimerPort`]
//! together. It is meant to live in a `static` shared between the
//! application and the timer interrupt handlers:
//!
//! ```text
//! application                      interrupt handlers
//! ───────────                      ──────────────────
//! write ──► tx_queue ──────────►   on_tx_compare (TxEngine)
//! read  ◄── rx_queue ◄──────────   on_capture / on_rx_timeout (RxEngine)
//!              │                          │
//!              └── engines: Mutex<RefCell<timer, frames>> ──┘
//! ```
//!
//! The timer and both frames are only touched inside a critical section.
//! The queues are lock-free single-producer single-consumer rings, so
//! `read`, `available` and `flush_input` never mask interrupts.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use timuart_hal::{CompareChannel, Edge, EventSource, MatchAction, TimerPort};

use crate::queue::ByteQueue;
use crate::rx::RxEngine;
use crate::timing::{ConfigError, Late, SerialConfig, TimingConfig};
use crate::tx::TxEngine;

/// Default transmit ring size (15 usable bytes)
pub const DEFAULT_TX_CAPACITY: usize = 16;

/// Default receive ring size (63 usable bytes)
pub const DEFAULT_RX_CAPACITY: usize = 64;

/// Errors from [`SoftSerial::try_write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError {
    /// Transmit queue is full; retry once the engine drains it
    WouldBlock,
    /// Port has not been initialised or has been ended
    NotReady,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::WouldBlock => f.write_str("transmit queue full"),
            WriteError::NotReady => f.write_str("port not initialised"),
        }
    }
}

/// State only touched with interrupts masked
struct Engines<T> {
    timer: T,
    /// `None` until `init` succeeds
    timing: Option<TimingConfig>,
    tx: TxEngine,
    rx: RxEngine,
}

/// Full-duplex 8-N-1 serial port on one capture and two compare channels
pub struct SoftSerial<
    T,
    const TX: usize = DEFAULT_TX_CAPACITY,
    const RX: usize = DEFAULT_RX_CAPACITY,
> {
    engines: Mutex<CriticalSectionRawMutex, RefCell<Engines<T>>>,
    tx_queue: ByteQueue<TX>,
    rx_queue: ByteQueue<RX>,
    ready: AtomicBool,
    timing_error: AtomicBool,
}

impl<T, const TX: usize, const RX: usize> SoftSerial<T, TX, RX> {
    /// Create a port around `timer`; nothing is touched until [`init`](Self::init)
    pub const fn new(timer: T) -> Self {
        Self {
            engines: Mutex::new(RefCell::new(Engines {
                timer,
                timing: None,
                tx: TxEngine::new(),
                rx: RxEngine::new(),
            })),
            tx_queue: ByteQueue::new(),
            rx_queue: ByteQueue::new(),
            ready: AtomicBool::new(false),
            timing_error: AtomicBool::new(false),
        }
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> SoftSerial<T, TX, RX> {
    /// Configure the timer for a bit period of `cycles_per_bit` CPU cycles
    /// and start listening for incoming frames
    ///
    /// On error the port is left exactly as it was.
    pub fn init(&self, cycles_per_bit: u32) -> Result<TimingConfig, ConfigError> {
        let timing = match TimingConfig::from_cycles_per_bit(cycles_per_bit) {
            Ok(timing) => timing,
            Err(e) => {
                warn!("unsupported bit period: {=u32} cycles", cycles_per_bit);
                return Err(e);
            }
        };

        self.engines.lock(|cell| {
            let mut engines = cell.borrow_mut();
            let e = &mut *engines;
            e.timer.set_prescale(timing.prescale());
            e.timer.enable_input_pullup();
            e.timer.enable_output_drive();

            e.timer.disable_interrupt(EventSource::TxCompare);
            e.timer.disable_interrupt(EventSource::RxTimeout);
            e.timer.set_match_action(CompareChannel::Tx, MatchAction::None);
            e.timing = Some(timing);
            e.tx.reset();
            e.rx.reset();
            self.tx_queue.reset();
            self.rx_queue.reset();

            e.timer.set_capture_edge(Edge::Falling);
            e.timer.enable_interrupt(EventSource::Capture);
            self.timing_error.store(false, Ordering::Relaxed);
            self.ready.store(true, Ordering::Release);
        });

        info!(
            "soft serial ready: {=u16} ticks/bit, prescale /{=u32}",
            timing.ticks_per_bit(),
            timing.prescale().divisor()
        );
        Ok(timing)
    }

    /// Initialise from a baud rate and clock frequency
    pub fn init_with(&self, config: &SerialConfig) -> Result<TimingConfig, ConfigError> {
        self.init(config.cycles_per_bit())
    }

    /// Check if `init` has succeeded and `end` has not been called since
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Active bit timing, if initialised
    pub fn timing(&self) -> Option<TimingConfig> {
        self.engines.lock(|cell| cell.borrow().timing)
    }

    /// Shut the port down
    ///
    /// Reception stops at once and buffered input is discarded. Writes are
    /// refused from here on; output accepted before is still sent, so this
    /// blocks until the transmitter is idle.
    pub fn end(&self) {
        self.engines.lock(|cell| {
            let mut engines = cell.borrow_mut();
            self.ready.store(false, Ordering::Release);
            engines.timer.disable_interrupt(EventSource::RxTimeout);
            engines.timer.disable_interrupt(EventSource::Capture);
            engines.rx.reset();
        });
        self.flush_input();
        self.flush_output();
        self.engines.lock(|cell| {
            let mut engines = cell.borrow_mut();
            engines.timer.disable_interrupt(EventSource::TxCompare);
            engines.timer.set_match_action(CompareChannel::Tx, MatchAction::None);
            engines.tx.reset();
            engines.timing = None;
        });
        info!("soft serial ended");
    }

    /// Queue one byte for transmission without blocking
    ///
    /// Starts the transmitter directly when it is idle. Must not be called
    /// from this port's own event handlers.
    pub fn try_write(&self, byte: u8) -> Result<(), WriteError> {
        self.engines.lock(|cell| {
            // Checked under the lock so `end` cannot slip in between the
            // check and the start, leaving an accepted byte unsent
            if !self.is_ready() {
                return Err(WriteError::NotReady);
            }
            let mut engines = cell.borrow_mut();
            let e = &mut *engines;
            if e.tx.is_idle() {
                e.tx.start(&mut e.timer, byte);
                Ok(())
            } else if self.tx_queue.push(byte) {
                Ok(())
            } else {
                Err(WriteError::WouldBlock)
            }
        })
    }

    /// Queue one byte, waiting for room if the queue is full
    ///
    /// Returns the number of bytes accepted: 1, or 0 if the port is not
    /// ready. Never drops data.
    pub fn write(&self, byte: u8) -> usize {
        loop {
            match self.try_write(byte) {
                Ok(()) => return 1,
                Err(WriteError::NotReady) => return 0,
                Err(WriteError::WouldBlock) => core::hint::spin_loop(),
            }
        }
    }

    /// Check if a `try_write` would currently be accepted
    pub fn can_write(&self) -> bool {
        self.is_ready() && !self.tx_queue.is_full()
    }

    /// Wait until every queued byte has left the line
    pub fn flush_output(&self) {
        while !self.engines.lock(|cell| cell.borrow().tx.is_idle()) {
            core::hint::spin_loop();
        }
    }

    /// Take the oldest received byte
    pub fn try_read(&self) -> Option<u8> {
        self.rx_queue.pop()
    }

    /// Look at the oldest received byte without taking it
    pub fn try_peek(&self) -> Option<u8> {
        self.rx_queue.peek()
    }

    /// Take the oldest received byte, or 0 if there is none
    ///
    /// A received 0 is indistinguishable from an empty queue here; use
    /// [`try_read`](Self::try_read) or [`is_empty`](Self::is_empty).
    pub fn read(&self) -> u8 {
        self.try_read().unwrap_or(0)
    }

    /// Oldest received byte without taking it, or 0 if there is none
    pub fn peek(&self) -> u8 {
        self.try_peek().unwrap_or(0)
    }

    /// Check if no received byte is waiting
    pub fn is_empty(&self) -> bool {
        self.rx_queue.is_empty()
    }

    /// Number of received bytes waiting
    pub fn available(&self) -> usize {
        self.rx_queue.len()
    }

    /// Discard every received byte not yet read
    pub fn flush_input(&self) {
        self.rx_queue.clear();
    }

    /// Check if any handler has run too late since the last clear
    pub fn timing_error(&self) -> bool {
        self.timing_error.load(Ordering::Relaxed)
    }

    /// Reset the timing error flag
    pub fn clear_timing_error(&self) {
        self.timing_error.store(false, Ordering::Relaxed);
    }

    /// Dispatch a timer interrupt to its handler
    pub fn handle(&self, source: EventSource) {
        match source {
            EventSource::Capture => self.on_capture(),
            EventSource::TxCompare => self.on_tx_compare(),
            EventSource::RxTimeout => self.on_rx_timeout(),
        }
    }

    /// Capture channel interrupt
    pub fn on_capture(&self) {
        self.run(|e, timing| e.rx.on_capture(&mut e.timer, timing, &self.rx_queue));
    }

    /// Transmit compare channel interrupt
    pub fn on_tx_compare(&self) {
        self.run(|e, timing| e.tx.on_compare(&mut e.timer, timing, &self.tx_queue));
    }

    /// Receive timeout compare channel interrupt
    pub fn on_rx_timeout(&self) {
        self.run(|e, timing| e.rx.on_timeout(&mut e.timer, timing, &self.rx_queue));
    }

    /// Run `f` on the timer inside the port's critical section
    ///
    /// Gives chip glue and tests access to the timer without tearing the
    /// engines' view of it.
    pub fn with_timer<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.engines.lock(|cell| f(&mut cell.borrow_mut().timer))
    }

    fn run(&self, f: impl FnOnce(&mut Engines<T>, &TimingConfig) -> Result<(), Late>) {
        let result = self.engines.lock(|cell| {
            let mut engines = cell.borrow_mut();
            match engines.timing {
                Some(timing) => f(&mut engines, &timing),
                // Stray interrupt before init or after end
                None => Ok(()),
            }
        });
        if let Err(late) = result {
            trace!("handler late by {=u16} ticks", late.ticks);
            self.timing_error.store(true, Ordering::Relaxed);
        }
    }
}
