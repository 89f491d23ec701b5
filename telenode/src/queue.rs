//! Outbound frame queue
//!
//! Frames are kept in per-priority FIFO lists that share one pool of slots. The lists are
//! cyclic and index-linked: the first `SENTINELS` nodes are list heads, the remaining nodes are
//! slots. Unused slots hang on the free list, so every operation is O(1) apart from the scan
//! over the eight priority heads.

use crate::core::{NodeId, Priority, TransferId};
use crate::frame::{Frame, Header, Mtu};
use crate::time::Instant;
use crate::transfer::scatter::{Segments, frame_count};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PushError {
    /// The transfer does not fit in the remaining capacity; nothing was queued
    QueueFull,
    /// Anonymous transfers must fit in a single frame
    AnonymousMultiFrame,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    next: u16,
    prev: u16,
}

const FREE: u16 = Priority::COUNT as u16;
const SENTINELS: usize = Priority::COUNT + 1;

pub struct TxQueue<const N: usize> {
    heads: [Link; SENTINELS],
    links: [Link; N],
    frames: [Option<Frame>; N],
    len: usize,
}

impl<const N: usize> Default for TxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TxQueue<N> {
    const _ASSERT: () = core::assert!(N + SENTINELS <= u16::MAX as usize);

    pub fn new() -> Self {
        let _ = Self::_ASSERT;
        let mut queue = Self {
            heads: core::array::from_fn(|i| {
                let node = unwrap!(u16::try_from(i));
                Link {
                    next: node,
                    prev: node,
                }
            }),
            links: core::array::from_fn(|i| {
                let node = unwrap!(u16::try_from(i + SENTINELS));
                Link {
                    next: node,
                    prev: node,
                }
            }),
            frames: [None; N],
            len: 0,
        };
        for slot in 0..N {
            queue.move_back(FREE, Self::node(slot));
        }
        queue
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Segments a transfer and appends all of its frames, or none of them.
    ///
    /// Every frame carries `deadline` as its timestamp. Returns the number of queued frames.
    pub fn push_transfer(
        &mut self,
        header: Header,
        transfer_id: TransferId,
        payload: &[u8],
        mtu: Mtu,
        deadline: Instant,
    ) -> Result<usize, PushError> {
        let count = frame_count(payload.len(), mtu);
        if header.source.is_none() && count > 1 {
            return Err(PushError::AnonymousMultiFrame);
        }
        if count > N - self.len {
            return Err(PushError::QueueFull);
        }

        let class = u16::from(header.priority.into_u8());
        for data in Segments::new(payload, transfer_id, mtu) {
            let node = unwrap!(self.front(FREE));
            self.frames[Self::slot(node)] = Some(Frame::new(header, data, deadline));
            self.move_back(class, node);
        }
        self.len += count;
        Ok(count)
    }

    /// Returns the next frame to be transmitted: the oldest frame of the most urgent class.
    pub fn peek(&self) -> Option<&Frame> {
        let node = self.head_node()?;
        self.frames[Self::slot(node)].as_ref()
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let node = self.head_node()?;
        self.move_back(FREE, node);
        self.len -= 1;
        self.frames[Self::slot(node)].take()
    }

    /// Iterates over queued frames in transmission order.
    pub fn snapshot(&self) -> impl Iterator<Item = &Frame> + '_ {
        (0..FREE).flat_map(move |class| self.class_iter(class))
    }

    /// Number of queued frames with the given source, e.g. to check a node's own backlog.
    pub fn count_from(&self, source: Option<NodeId>) -> usize {
        self.snapshot()
            .filter(|frame| frame.header.source == source)
            .count()
    }

    fn class_iter(&self, class: u16) -> impl Iterator<Item = &Frame> + '_ {
        let mut node = self.link(class).next;
        core::iter::from_fn(move || {
            if node == class {
                return None;
            }
            let frame = self.frames[Self::slot(node)].as_ref();
            node = self.link(node).next;
            frame
        })
    }

    fn head_node(&self) -> Option<u16> {
        (0..FREE).find_map(|class| self.front(class))
    }

    fn front(&self, class: u16) -> Option<u16> {
        let next = self.link(class).next;
        (next != class).then_some(next)
    }

    fn node(slot: usize) -> u16 {
        unwrap!(u16::try_from(slot + SENTINELS))
    }

    fn slot(node: u16) -> usize {
        usize::from(node) - SENTINELS
    }

    fn link(&self, node: u16) -> &Link {
        let node = usize::from(node);
        if node < SENTINELS {
            &self.heads[node]
        } else {
            &self.links[node - SENTINELS]
        }
    }

    fn link_mut(&mut self, node: u16) -> &mut Link {
        let node = usize::from(node);
        if node < SENTINELS {
            &mut self.heads[node]
        } else {
            &mut self.links[node - SENTINELS]
        }
    }

    fn unlink(&mut self, node: u16) {
        let Link { next, prev } = *self.link(node);
        self.link_mut(prev).next = next;
        self.link_mut(next).prev = prev;
        *self.link_mut(node) = Link {
            next: node,
            prev: node,
        };
    }

    fn move_back(&mut self, class: u16, node: u16) {
        self.unlink(node);
        let prev = self.link(class).prev;
        *self.link_mut(node) = Link { next: class, prev };
        self.link_mut(prev).next = node;
        self.link_mut(class).prev = node;
    }
}
