//! timuart Core Library
//!
//! A full-duplex 8-N-1 serial port built from one 16-bit hardware timer:
//! an input-capture channel timestamps edges on the receive line, one
//! output-compare channel drives the transmit line, and a second compare
//! channel times out frames whose last bits produce no edge.
//!
//! The crate is hardware-agnostic. Everything it needs from the chip goes
//! through [`timuart_hal::TimerPort`].
//!
//! # Modules
//!
//! - [`queue`] - Lock-free byte rings between application and handlers
//! - [`timing`] - Bit period, prescaler and latency budget
//! - [`tx`] - Transmit state machine
//! - [`rx`] - Receive state machine
//! - [`port`] - [`SoftSerial`], the port object and its lifecycle
//! - [`stream`] - `embedded-io` and UART trait implementations

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod line;
pub mod port;
pub mod queue;
pub mod rx;
pub mod stream;
pub mod timing;
pub mod tx;

pub use line::Level;
pub use port::{SoftSerial, WriteError, DEFAULT_RX_CAPACITY, DEFAULT_TX_CAPACITY};
pub use queue::ByteQueue;
pub use rx::{RxAction, RxEngine, RxEvent, RxFrame};
pub use stream::SerialError;
pub use timing::{ConfigError, Late, SerialConfig, TimingConfig, MAX_TICKS_PER_BIT};
pub use tx::{TxAction, TxEngine, TxFrame, START_DELAY_TICKS};
