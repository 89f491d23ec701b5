use core::cmp::min;

use crate::core::TransferId;
use crate::frame::Mtu;
use crate::time::{Duration, Instant};
use crate::transfer::{TailByte, TransferCrc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GatherError {
    /// Frame without a tail byte
    EmptyFrame,
    /// Toggle bit out of sequence
    Toggle,
    /// Continuation frame of another transfer
    TransferId,
    /// Continuation frame arrived after the transfer-ID timeout
    Timeout,
    /// Non-final frame that does not fill the MTU
    ShortFrame,
    /// Multi-frame transfer with a CRC mismatch
    Crc,
}

/// Result of feeding one frame into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The frame does not belong to any transfer worth tracking
    Skipped,
    /// The frame was accepted; the transfer is not complete yet
    Pending,
    /// The transfer is complete. The first `stored` bytes of the buffer hold its payload.
    Complete {
        transfer_id: TransferId,
        timestamp: Instant,
        stored: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Progress {
    transfer_id: TransferId,
    start: Instant,
    toggle: bool,
    length: usize,
    crc: TransferCrc,
}

/// Reassembly state of one (port, source) session
///
/// Rules:
/// * a start-of-transfer frame always restarts reassembly, unless it repeats the last
///   completed transfer-ID within the timeout, in which case it is a duplicate
/// * a continuation frame must match the transfer-ID, the toggle sequence and the timeout of
///   the transfer in progress, otherwise the reassembly is abandoned
/// * non-final frames must fill the MTU
/// * continuation frames without a transfer in progress are skipped silently
///
/// Payload beyond the buffer length is counted for CRC purposes and otherwise discarded.
#[derive(Debug, Default)]
pub(crate) struct Gather {
    progress: Option<Progress>,
    last: Option<(TransferId, Instant)>,
}

impl Gather {
    pub fn is_receiving(&self) -> bool {
        self.progress.is_some()
    }

    /// Instant of the latest start-of-transfer frame seen, used for session eviction
    pub fn last_activity(&self) -> Option<Instant> {
        match (self.progress, self.last) {
            (Some(progress), _) => Some(progress.start),
            (None, Some((_, start))) => Some(start),
            (None, None) => None,
        }
    }

    pub fn push(
        &mut self,
        buffer: &mut [u8],
        data: &[u8],
        timestamp: Instant,
        timeout: Duration,
    ) -> Result<Step, GatherError> {
        let (&tail, payload) = data.split_last().ok_or(GatherError::EmptyFrame)?;
        let tail = TailByte::decode(tail);

        if tail.sot {
            self.start(buffer, tail, payload, timestamp, timeout)
        } else {
            self.resume(buffer, tail, payload, timestamp, timeout)
        }
    }

    fn start(
        &mut self,
        buffer: &mut [u8],
        tail: TailByte,
        payload: &[u8],
        timestamp: Instant,
        timeout: Duration,
    ) -> Result<Step, GatherError> {
        self.progress = None;
        if tail.toggle != TailByte::INITIAL_TOGGLE {
            return Err(GatherError::Toggle);
        }
        if let Some((transfer_id, start)) = self.last
            && transfer_id == tail.transfer_id
            && timestamp <= start.saturating_add(timeout)
        {
            return Ok(Step::Skipped);
        }

        if tail.eot {
            let stored = min(payload.len(), buffer.len());
            buffer[..stored].copy_from_slice(&payload[..stored]);
            self.last = Some((tail.transfer_id, timestamp));
            return Ok(Step::Complete {
                transfer_id: tail.transfer_id,
                timestamp,
                stored,
            });
        }

        if !is_full_frame(payload) {
            return Err(GatherError::ShortFrame);
        }
        let mut progress = Progress {
            transfer_id: tail.transfer_id,
            start: timestamp,
            toggle: !TailByte::INITIAL_TOGGLE,
            length: 0,
            crc: TransferCrc::default(),
        };
        progress.append(buffer, payload);
        self.progress = Some(progress);
        Ok(Step::Pending)
    }

    fn resume(
        &mut self,
        buffer: &mut [u8],
        tail: TailByte,
        payload: &[u8],
        timestamp: Instant,
        timeout: Duration,
    ) -> Result<Step, GatherError> {
        let Some(mut progress) = self.progress.take() else {
            return Ok(Step::Skipped);
        };

        if tail.transfer_id != progress.transfer_id {
            return Err(GatherError::TransferId);
        }
        if timestamp > progress.start.saturating_add(timeout) {
            return Err(GatherError::Timeout);
        }
        if tail.toggle != progress.toggle {
            return Err(GatherError::Toggle);
        }
        if !tail.eot && !is_full_frame(payload) {
            return Err(GatherError::ShortFrame);
        }

        progress.append(buffer, payload);
        progress.toggle = !progress.toggle;

        if !tail.eot {
            self.progress = Some(progress);
            return Ok(Step::Pending);
        }

        if progress.length < TransferCrc::LENGTH || !progress.crc.is_residue_valid() {
            return Err(GatherError::Crc);
        }
        self.last = Some((progress.transfer_id, progress.start));
        Ok(Step::Complete {
            transfer_id: progress.transfer_id,
            timestamp: progress.start,
            stored: min(progress.length - TransferCrc::LENGTH, buffer.len()),
        })
    }
}

impl Progress {
    fn append(&mut self, buffer: &mut [u8], payload: &[u8]) {
        let offset = min(self.length, buffer.len());
        let stored = min(payload.len(), buffer.len() - offset);
        buffer[offset..offset + stored].copy_from_slice(&payload[..stored]);
        self.crc.add_bytes(payload);
        self.length += payload.len();
    }
}

// Classic frames are accepted in FD networks, so either MTU qualifies.
fn is_full_frame(payload: &[u8]) -> bool {
    Mtu::try_from(payload.len() + 1).is_ok()
}
