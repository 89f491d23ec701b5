//! Inbound transfer reassembly
//!
//! Frames on subscribed ports are grouped into sessions keyed by port and source node. A
//! session borrows an arena block while a multi-frame transfer is in progress; the block of a
//! completed transfer is handed over to the caller, who must free it after use.

use core::cmp::min;
use heapless::Vec;

use crate::arena::{Arena, Block};
use crate::config::{ARENA_BLOCK_SIZE, ROUTE_CAPACITY, SESSION_COUNT};
use crate::core::{NodeId, Priority, TransferId};
use crate::frame::{DataSpecifier, Frame};
use crate::time::{Duration, Instant};
use crate::transfer::TailByte;
use crate::transfer::gather::{Gather, Step};

pub use crate::transfer::gather::GatherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReassemblyError {
    Frame(GatherError),
    /// Anonymous transfers are single-frame by definition
    AnonymousMultiFrame,
    /// No arena block available; the arena is undersized for the session count
    OutOfMemory,
}

impl From<GatherError> for ReassemblyError {
    fn from(value: GatherError) -> Self {
        Self::Frame(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubscribeError {
    Full,
}

/// A completed inbound transfer
///
/// The payload block is truncated to the stored length, which never exceeds the subscription
/// extent.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    pub priority: Priority,
    pub data_spec: DataSpecifier,
    pub source: Option<NodeId>,
    pub transfer_id: TransferId,
    /// Reception instant of the first frame
    pub timestamp: Instant,
    pub payload: Block,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    data_spec: DataSpecifier,
    extent: usize,
}

#[derive(Debug)]
struct Session {
    data_spec: DataSpecifier,
    source: NodeId,
    gather: Gather,
    block: Option<Block>,
}

pub struct Reassembler {
    subscriptions: Vec<Subscription, ROUTE_CAPACITY>,
    sessions: Vec<Session, SESSION_COUNT>,
    timeout: Duration,
}

impl Reassembler {
    pub fn new(transfer_id_timeout: Duration) -> Self {
        Self {
            subscriptions: Vec::new(),
            sessions: Vec::new(),
            timeout: transfer_id_timeout,
        }
    }

    /// Starts accepting transfers on a port. Payload beyond `extent` bytes is dropped;
    /// the extent is capped at the arena block size.
    pub fn subscribe(&mut self, data_spec: DataSpecifier, extent: usize) -> Result<(), SubscribeError> {
        let extent = min(extent, ARENA_BLOCK_SIZE);
        if let Some(subscription) = self
            .subscriptions
            .iter_mut()
            .find(|subscription| subscription.data_spec == data_spec)
        {
            subscription.extent = extent;
            return Ok(());
        }
        self.subscriptions
            .push(Subscription { data_spec, extent })
            .map_err(|_| SubscribeError::Full)
    }

    /// Feeds one received frame.
    ///
    /// Returns `Ok(None)` for frames that are filtered out or do not complete a transfer.
    /// Service frames are accepted only when addressed to `local`.
    pub fn accept<const COUNT: usize, const SIZE: usize>(
        &mut self,
        frame: &Frame,
        local: Option<NodeId>,
        arena: &mut Arena<COUNT, SIZE>,
    ) -> Result<Option<Transfer>, ReassemblyError> {
        let header = &frame.header;
        let Some(subscription) = self
            .subscriptions
            .iter()
            .find(|subscription| subscription.data_spec == header.data_spec)
            .copied()
        else {
            return Ok(None);
        };
        if header.data_spec.is_service() && (local.is_none() || header.destination != local) {
            return Ok(None);
        }

        let Some(source) = header.source else {
            return Self::accept_anonymous(frame, subscription, arena);
        };

        let timeout = self.timeout;
        let session = self.session(header.data_spec, source, arena);
        let mut block = match session.block.take() {
            Some(block) => block,
            None => arena
                .allocate(subscription.extent)
                .ok_or(ReassemblyError::OutOfMemory)?,
        };

        let step = session.gather.push(
            arena.bytes_mut(&mut block),
            &frame.data,
            frame.timestamp,
            timeout,
        );

        match step {
            Ok(Step::Complete {
                transfer_id,
                timestamp,
                stored,
            }) => {
                block.truncate(stored);
                Ok(Some(Transfer {
                    priority: header.priority,
                    data_spec: header.data_spec,
                    source: Some(source),
                    transfer_id,
                    timestamp,
                    payload: block,
                }))
            }
            other => {
                if session.gather.is_receiving() {
                    session.block = Some(block);
                } else {
                    arena.free(block);
                }
                other.map(|_| None).map_err(ReassemblyError::from)
            }
        }
    }

    fn accept_anonymous<const COUNT: usize, const SIZE: usize>(
        frame: &Frame,
        subscription: Subscription,
        arena: &mut Arena<COUNT, SIZE>,
    ) -> Result<Option<Transfer>, ReassemblyError> {
        let (&tail, payload) = frame
            .data
            .split_last()
            .ok_or(GatherError::EmptyFrame)?;
        let tail = TailByte::decode(tail);
        if !(tail.sot && tail.eot) {
            return Err(ReassemblyError::AnonymousMultiFrame);
        }
        if tail.toggle != TailByte::INITIAL_TOGGLE {
            return Err(GatherError::Toggle.into());
        }

        let stored = min(payload.len(), subscription.extent);
        let mut block = arena
            .allocate(stored)
            .ok_or(ReassemblyError::OutOfMemory)?;
        arena
            .bytes_mut(&mut block)
            .copy_from_slice(&payload[..stored]);
        Ok(Some(Transfer {
            priority: frame.header.priority,
            data_spec: frame.header.data_spec,
            source: None,
            transfer_id: tail.transfer_id,
            timestamp: frame.timestamp,
            payload: block,
        }))
    }

    /// Finds the session of a port and source, creating it if needed. A full table evicts the
    /// least recently started session.
    fn session<const COUNT: usize, const SIZE: usize>(
        &mut self,
        data_spec: DataSpecifier,
        source: NodeId,
        arena: &mut Arena<COUNT, SIZE>,
    ) -> &mut Session {
        let found = self
            .sessions
            .iter()
            .position(|session| session.data_spec == data_spec && session.source == source);

        let index = match found {
            Some(index) => index,
            None => {
                if self.sessions.is_full() {
                    let oldest = unwrap!(
                        self.sessions
                            .iter()
                            .enumerate()
                            .min_by_key(|(_, session)| session.gather.last_activity())
                            .map(|(index, _)| index)
                    );
                    let evicted = self.sessions.swap_remove(oldest);
                    debug!("evict session {:?} from {}", evicted.data_spec, evicted.source.into_u8());
                    if let Some(block) = evicted.block {
                        arena.free(block);
                    }
                }
                unwrap!(
                    self.sessions
                        .push(Session {
                            data_spec,
                            source,
                            gather: Gather::default(),
                            block: None,
                        })
                        .ok()
                );
                self.sessions.len() - 1
            }
        };
        &mut self.sessions[index]
    }
}
