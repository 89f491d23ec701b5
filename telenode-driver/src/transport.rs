//! Transceiver interface consumed by the node task

use core::task::{Context, Poll};

use crate::frame::{Frame, Mtu};

/// Link parameters requested when opening a transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    pub mtu: Mtu,
    /// Nominal (arbitration phase) bit rate, bit/s
    pub bitrate: u32,
    /// Data phase bit rate, bit/s. Ignored with Classic MTU.
    pub fd_bitrate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenError {
    /// The device does not exist or cannot be opened
    Device,
    /// The device rejected the requested bit rates
    Bitrate,
}

/// Result of a successful non-blocking send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    /// The transceiver took ownership of the frame
    Accepted,
    /// The transceiver has no room now; the same frame may be offered again later
    Busy,
}

/// The transceiver refused the frame permanently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    Device,
    InvalidFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveError {
    /// Nothing to receive; readiness was spurious
    Empty,
    Device,
    /// A frame arrived but it is not a valid Cyphal frame
    Malformed,
}

/// Opens links
pub trait Interface {
    type Transport: Transport;

    fn open(&mut self, device: &str, config: &LinkConfig) -> Result<Self::Transport, OpenError>;
}

/// An open link
///
/// All methods are non-blocking. The node waits for inbound traffic through `poll_readable`
/// and retries busy sends on its own schedule.
pub trait Transport {
    fn mtu(&self) -> Mtu;

    /// Resolves once `receive` is expected to yield a frame.
    ///
    /// Must register the waker when returning `Pending`.
    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Offers a frame for transmission. The frame timestamp is its deadline.
    fn try_send(&mut self, frame: &Frame) -> Result<SendOutcome, SendError>;

    /// Fetches one received frame. The frame timestamp is its reception instant.
    fn receive(&mut self) -> Result<Frame, ReceiveError>;
}
