//! # canbridge
//!
//! This library lets a single non-reentrant Cyphal/CAN protocol engine be driven from several
//! real-time contexts at once: interrupt handlers that deliver raw bus frames, application tasks
//! that publish, subscribe and answer requests, and one consumer task that performs reassembly.
//! All memory comes from a fixed-capacity [`arena::Allocator`], no heap is required.
//!
//! The library targets the Embassy async framework.
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────┐ relay_from_isr ┌───────────────┐ receive ┌────────┐
//!  │ ISR ├───────────────►│               ├────────►│ Runner ├──► handler(&Transfer)
//!  └─────┘                │  relay queue  │         └───┬────┘
//!  ┌──────┐ relay         │  (RXN frames) │             │ accept_frame
//!  │ Task ├──────────────►│               │             ▼
//!  └──────┘               └───────────────┘     ┌──────────────────┐
//!  ┌──────┐ transmit / subscribe / set_node_id  │ Guard            │
//!  │ Task ├────────────────────────────────────►│  Engine          │
//!  └──────┘                                     │  Arena           │
//!                                               │  TX queue ───────┼──► Transmitter
//!                                               └──────────────────┘
//! ```
//! Components:
//! * _Bridge_ owns the guard, the relay queue, the relay counters and an application value.
//! * _Guard_ is an async mutex around the engine, its allocator, the outbound frame queue,
//!   the transmitter and the node identity. Every engine call happens inside it.
//! * _Relay queue_ is a bounded channel of received frames. Interrupt handlers push without
//!   waiting, tasks push with a timeout.
//! * _Runner_ is the only consumer of the relay queue. It takes one frame at a time, runs one
//!   reassembly step under the guard and calls the transfer handler on completion.
//! * _Engine_ is the external protocol implementation, see [`engine::Engine`].
//! * _Transmitter_ is the driver send primitive, see [`transmit::Transmitter`].
//!
//! ## Concurrency model
//!
//! The relay queue is the only structure touched outside the guard. Interrupt handlers never
//! take the guard. Guard acquisition has no timeout.
//!
//! There are two mutex implementation options:
//! * _CriticalSectionRawMutex_ is required when frames are relayed from interrupt handlers.
//! * _ThreadModeRawMutex_ suffices when all producers run in thread-mode executors.
//!
//! Transmission is opportunistic. Every transmit serializes the transfer into the outbound queue
//! and then drains the queue until the transmitter reports busy. Frames refused as busy stay
//! queued in priority order, FIFO within a priority, and are retried by the next transmit or
//! an explicit [`Bridge::drain`].
//!
//! The transfer handler runs with the guard held. It must not await guarded bridge methods.
//!
//! ## Limitations
//!
//! * One runner per bridge, enforced by [`Bridge::split`].
//! * The outbound queue has no deadlines, queued frames wait for the next drain indefinitely.
//! * The no_std target supports single-CPU systems only (embassy_sync limitation).
#![no_std]

pub use canbridge_core as core;
pub use canbridge_driver::{frame, time, transmit};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod arena;
mod bridge;
pub mod config;
pub mod engine;
pub mod transfer;
mod tx_queue;

pub use bridge::{Bridge, Error, QueueItem, RelayError, RelayStats, Runner};
pub use config::Config;
