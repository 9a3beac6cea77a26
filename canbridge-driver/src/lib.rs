//! canbridge driver interface
//!
//! The crate defines what a CAN peripheral driver exchanges with the bridge: the [`frame::Frame`]
//! value type and the non-blocking [`transmit::Transmitter`] send primitive.
//! Driver crates should depend on this crate. Applications should depend on `canbridge` instead.
//!
//! Received frames travel the other way through the bridge relay. A driver interrupt handler
//! pushes them with `Bridge::relay_from_isr`, which never blocks.
//!
//! The send primitive must not block either. A driver reports a full mailbox with
//! [`transmit::Busy`]; the bridge keeps the frame queued and offers the same frame again
//! on the next drain.

#![no_std]

pub mod frame;
pub mod transmit;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
