//! Plug-and-play node-ID negotiation
//!
//! An anonymous node repeatedly publishes an allocation request carrying a hash of its
//! unique-ID. Requests are spaced by a fresh random delay in `[0, 1 s)`, with no upper bound on
//! the number of attempts. The first response that carries the same hash and a valid node-ID
//! ends the negotiation.

use crate::config::UNIQUE_ID_LENGTH;
use crate::core::{NodeId, Priority, TransferId};
use crate::data_types::NodeIdAllocationData;
use crate::frame::{Header, Mtu};
use crate::queue::{PushError, TxQueue};
use crate::time::{Duration, Instant};
use telenode_encoding::{BufferType, Deserialize};

/// Upper bound (exclusive) of the delay before each request, µs
const MAX_JITTER_US: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NegotiationState {
    /// No request sent yet
    Unconfigured { first_request: Instant },
    /// At least one request sent; `unique_id_hash` correlates responses
    RequestSent {
        unique_id_hash: u64,
        next_request: Instant,
    },
    /// Terminal
    Allocated(NodeId),
}

pub struct Negotiator {
    unique_id_hash: u64,
    rng: fastrand::Rng,
    state: NegotiationState,
    transfer_id: TransferId,
    requests: u32,
}

impl Negotiator {
    pub fn new(unique_id: &[u8; UNIQUE_ID_LENGTH], now: Instant) -> Self {
        let unique_id_hash = unique_id_hash(unique_id);
        let mut rng = fastrand::Rng::with_seed(unique_id_hash);
        let first_request = now + jitter(&mut rng);
        Self {
            unique_id_hash,
            rng,
            state: NegotiationState::Unconfigured { first_request },
            transfer_id: TransferId::default(),
            requests: 0,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self.state {
            NegotiationState::Allocated(node_id) => Some(node_id),
            _ => None,
        }
    }

    pub fn unique_id_hash(&self) -> u64 {
        self.unique_id_hash
    }

    /// Allocation requests queued so far
    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Instant of the next permitted request, `None` once allocated
    pub fn next_request(&self) -> Option<Instant> {
        match self.state {
            NegotiationState::Unconfigured { first_request } => Some(first_request),
            NegotiationState::RequestSent { next_request, .. } => Some(next_request),
            NegotiationState::Allocated(_) => None,
        }
    }

    /// Queues an allocation request if one is due at `now`.
    ///
    /// The next request is rescheduled whenever one was due, even if it could not be queued.
    /// Returns whether a request was queued.
    pub fn poll<const N: usize>(
        &mut self,
        now: Instant,
        queue: &mut TxQueue<N>,
        mtu: Mtu,
        deadline: Duration,
    ) -> Result<bool, PushError> {
        let Some(next_request) = self.next_request() else {
            return Ok(false);
        };
        if now < next_request {
            return Ok(false);
        }

        self.state = NegotiationState::RequestSent {
            unique_id_hash: self.unique_id_hash,
            next_request: now + jitter(&mut self.rng),
        };

        let request = NodeIdAllocationData::request(self.unique_id_hash);
        let mut buffer = <NodeIdAllocationData as BufferType>::Buffer::default();
        let payload = unwrap!(buffer.encode(&request).ok());
        let header = Header::message(Priority::Slow, NodeIdAllocationData::SUBJECT, None);
        queue.push_transfer(header, self.transfer_id, payload, mtu, now + deadline)?;

        self.transfer_id = self.transfer_id.next();
        self.requests = self.requests.wrapping_add(1);
        debug!("allocation request {} queued", self.requests);
        Ok(true)
    }

    /// Inspects an allocation message. Returns the node-ID if it completes the negotiation.
    pub fn handle_response(&mut self, payload: &[u8]) -> Option<NodeId> {
        if matches!(self.state, NegotiationState::Allocated(_)) {
            return None;
        }
        let message = match NodeIdAllocationData::deserialize_from_bytes(payload) {
            Ok(message) => message,
            Err(err) => {
                debug!("malformed allocation message: {:?}", err);
                return None;
            }
        };
        if message.unique_id_hash != self.unique_id_hash {
            return None;
        }
        let node_id = NodeId::try_from(message.allocated_node_id?).ok()?;

        self.state = NegotiationState::Allocated(node_id);
        info!("node-id {} allocated", node_id.into_u8());
        Some(node_id)
    }
}

fn jitter(rng: &mut fastrand::Rng) -> Duration {
    Duration::from_micros(rng.u64(0..MAX_JITTER_US))
}

/// FNV-1a/64 of the unique-ID folded to 48 bits
pub fn unique_id_hash(unique_id: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = unique_id.iter().fold(OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    });
    ((hash >> 48) ^ hash) & NodeIdAllocationData::HASH_MASK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DataSpecifier;
    use telenode_encoding::Serialize;

    const UNIQUE_ID: [u8; UNIQUE_ID_LENGTH] = [7; UNIQUE_ID_LENGTH];

    fn response(hash: u64, node_id: Option<u16>) -> [u8; 9] {
        let mut bytes = [0; 9];
        NodeIdAllocationData {
            unique_id_hash: hash,
            allocated_node_id: node_id,
        }
        .serialize_to_bytes(&mut bytes);
        bytes
    }

    #[test]
    fn test_hash_is_48_bit() {
        let hash = unique_id_hash(&UNIQUE_ID);
        assert_eq!(hash & !NodeIdAllocationData::HASH_MASK, 0);
        assert_ne!(hash, unique_id_hash(&[8; UNIQUE_ID_LENGTH]));
        // FNV-1a/64 of the empty input is the offset basis
        assert_eq!(unique_id_hash(&[]), (0xcbf2 ^ 0x9ce4_8422_2325) & 0xffff_ffff_ffff);
    }

    #[test]
    fn test_request_not_before_schedule() {
        let start = Instant::from_secs(10);
        let mut negotiator = Negotiator::new(&UNIQUE_ID, start);
        let mut queue = TxQueue::<8>::new();
        let first = negotiator.next_request().unwrap();
        assert!(first >= start && first < start + Duration::from_secs(1));

        if first > start {
            let early = Instant::from_ticks(first.as_ticks() - 1);
            assert_eq!(
                negotiator.poll(early, &mut queue, Mtu::Classic, Duration::from_secs(1)),
                Ok(false)
            );
            assert!(queue.is_empty());
        }

        assert_eq!(
            negotiator.poll(first, &mut queue, Mtu::Classic, Duration::from_secs(1)),
            Ok(true)
        );
        let NegotiationState::RequestSent {
            unique_id_hash,
            next_request,
        } = negotiator.state()
        else {
            panic!("request not recorded");
        };
        assert_eq!(unique_id_hash, negotiator.unique_id_hash());
        assert!(next_request >= first && next_request < first + Duration::from_secs(1));

        let frame = queue.pop().unwrap();
        assert_eq!(frame.header.source, None);
        assert_eq!(frame.header.priority, Priority::Slow);
        assert_eq!(
            frame.header.data_spec,
            DataSpecifier::Message(NodeIdAllocationData::SUBJECT)
        );
        assert_eq!(frame.data.len(), 8);
        assert_eq!(frame.timestamp, first + Duration::from_secs(1));
    }

    #[test]
    fn test_request_counter_wraps() {
        let start = Instant::from_secs(10);
        let mut negotiator = Negotiator::new(&UNIQUE_ID, start);
        negotiator.requests = u32::MAX;
        let mut queue = TxQueue::<8>::new();

        let first = negotiator.next_request().unwrap();
        assert_eq!(
            negotiator.poll(first, &mut queue, Mtu::Classic, Duration::from_secs(1)),
            Ok(true)
        );
        assert_eq!(negotiator.requests(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_response_matching() {
        let mut negotiator = Negotiator::new(&UNIQUE_ID, Instant::from_ticks(0));
        let hash = negotiator.unique_id_hash();

        assert_eq!(negotiator.handle_response(&response(hash, None)), None);
        assert_eq!(negotiator.handle_response(&response(hash ^ 1, Some(42))), None);
        assert_eq!(negotiator.handle_response(&response(hash, Some(128))), None);
        assert_eq!(negotiator.handle_response(&[0; 3][..0]), None);
        assert!(negotiator.node_id().is_none());

        assert_eq!(
            negotiator.handle_response(&response(hash, Some(42))),
            NodeId::new(42)
        );
        assert_eq!(
            negotiator.state(),
            NegotiationState::Allocated(NodeId::new(42).unwrap())
        );
        assert_eq!(negotiator.next_request(), None);
        assert_eq!(negotiator.handle_response(&response(hash, Some(43))), None);
        assert_eq!(negotiator.node_id(), NodeId::new(42));
    }

    #[test]
    fn test_reschedules_when_queue_full() {
        let mut negotiator = Negotiator::new(&UNIQUE_ID, Instant::from_ticks(0));
        let mut queue = TxQueue::<0>::new();
        let now = Instant::from_secs(2);
        assert_eq!(
            negotiator.poll(now, &mut queue, Mtu::Classic, Duration::from_secs(1)),
            Err(PushError::QueueFull)
        );
        assert!(negotiator.next_request().unwrap() >= now);
        assert_eq!(negotiator.requests(), 0);
    }
}
