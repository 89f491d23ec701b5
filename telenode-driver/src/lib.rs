//! Telenode transport contract
//!
//! The crate provides the interface between a CAN transceiver and the telenode stack.
//! Limited scope facilitates compatibility across versions.
//! Transceiver crates should depend on this crate. Node users should depend on
//! the `telenode` crate instead.
//!
//! The node runs a single cooperative task, so the contract is poll-based rather than
//! channel-based:
//! * `Interface` opens a link with the requested MTU and bit rates
//! * `Transport::poll_readable` reports that at least one frame can be received
//! * `Transport::try_send` hands one frame over without blocking
//! * `Transport::receive` fetches one frame after readiness was reported
//!
//! Backpressure is expressed through `SendOutcome::Busy`. The node keeps the frame and retries
//! it on the next drain until its deadline passes. Transceivers must not queue frames that they
//! reported as busy.

#![no_std]

pub mod can_id;
pub mod frame;
pub mod transport;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
