//! timuart Hardware Abstraction Layer
//!
//! This crate defines the capability a chip must expose for the timuart
//! engines to run a serial port on it: one free-running 16-bit counter,
//! one edge-capture channel and two output-compare channels. Chip crates
//! implement [`TimerPort`]; the core crate only ever talks to the trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  timuart-core (engines, SoftSerial)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  timuart-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ timuart-hal-  │       │  chip timer   │
//! │     sim       │       │  (external)   │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`timer::TimerPort`] - Counter, capture and compare channels
//! - [`uart::UartTx`], [`uart::UartRx`] - Blocking serial byte streams

#![no_std]
#![deny(unsafe_code)]

pub mod timer;
pub mod uart;

// Re-export key items at crate root for convenience
pub use timer::{CompareChannel, Edge, EventSource, MatchAction, Prescale, TimerPort};
pub use uart::{UartRx, UartTx};
