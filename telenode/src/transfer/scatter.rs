use core::cmp::min;

use crate::core::TransferId;
use crate::frame::{Data, DataLength, Mtu};
use crate::transfer::{PAD_VALUE, TailByte, TransferCrc};

const TAIL_LENGTH: usize = 1;
const CRC_LENGTH: usize = TransferCrc::LENGTH;

/// Number of frames needed to carry a payload of the given length
pub(crate) const fn frame_count(payload_length: usize, mtu: Mtu) -> usize {
    let capacity = match mtu {
        Mtu::Classic => 8,
        Mtu::Fd => 64,
    } - TAIL_LENGTH;
    if payload_length <= capacity {
        1
    } else {
        (payload_length + CRC_LENGTH).div_ceil(capacity)
    }
}

/// Splits a transfer payload into frame data vectors
///
/// Single-frame transfers carry no CRC. Multi-frame transfers stream the payload followed by
/// the CRC; padding is only ever inserted into the last frame, ahead of the CRC.
pub(crate) struct Segments<'a> {
    payload: &'a [u8],
    capacity: usize,
    transfer_id: TransferId,
    toggle: bool,
    // Position in the payload + CRC stream
    offset: usize,
    crc: TransferCrc,
    finished: bool,
}

impl<'a> Segments<'a> {
    pub fn new(payload: &'a [u8], transfer_id: TransferId, mtu: Mtu) -> Self {
        let mut crc = TransferCrc::default();
        crc.add_bytes(payload);
        Self {
            payload,
            capacity: usize::from(mtu) - TAIL_LENGTH,
            transfer_id,
            toggle: TailByte::INITIAL_TOGGLE,
            offset: 0,
            crc,
            finished: false,
        }
    }

    fn stream_length(&self) -> usize {
        self.payload.len() + CRC_LENGTH
    }

    fn single_frame(&mut self) -> Data {
        let length = unwrap!(DataLength::new_ceil(self.payload.len() + TAIL_LENGTH));
        let mut data = Data::new_zeros(length);
        let (tail, body) = unwrap!(data.split_last_mut());
        body[..self.payload.len()].copy_from_slice(self.payload);
        body[self.payload.len()..].fill(PAD_VALUE);
        *tail = self.tail(true, true);
        self.finished = true;
        data
    }

    fn next_multi_frame(&mut self) -> Data {
        let residual = self.stream_length() - self.offset;
        let length = unwrap!(DataLength::new_ceil(
            min(residual, self.capacity) + TAIL_LENGTH
        ));
        let mut data = Data::new_zeros(length);
        let sot = self.offset == 0;
        let (tail, body) = unwrap!(data.split_last_mut());

        if body.len() <= residual {
            self.copy_stream(body);
        } else {
            // CRC cannot have started: a split CRC leaves a single byte, which needs no padding.
            assert!(self.offset <= self.payload.len());
            let data_length = self.payload.len() - self.offset;
            let (chunk, crc_bytes) = unwrap!(body.split_last_chunk_mut::<CRC_LENGTH>());
            let (data_bytes, pad) = chunk.split_at_mut(data_length);
            data_bytes.copy_from_slice(&self.payload[self.offset..]);
            pad.fill(PAD_VALUE);

            let mut crc = self.crc;
            crc.add_bytes(pad);
            *crc_bytes = crc.value().to_be_bytes();
            self.offset = self.stream_length();
        }

        let eot = self.offset == self.stream_length();
        *tail = self.tail(sot, eot);
        self.toggle = !self.toggle;
        self.finished = eot;
        data
    }

    fn copy_stream(&mut self, body: &mut [u8]) {
        let crc_bytes = self.crc.value().to_be_bytes();
        for byte in body.iter_mut() {
            *byte = match self.payload.get(self.offset) {
                Some(&value) => value,
                None => crc_bytes[self.offset - self.payload.len()],
            };
            self.offset += 1;
        }
    }

    fn tail(&self, sot: bool, eot: bool) -> u8 {
        TailByte {
            sot,
            eot,
            toggle: self.toggle,
            transfer_id: self.transfer_id,
        }
        .encode()
    }
}

impl Iterator for Segments<'_> {
    type Item = Data;

    fn next(&mut self) -> Option<Data> {
        if self.finished {
            None
        } else if self.offset == 0 && self.payload.len() <= self.capacity {
            Some(self.single_frame())
        } else {
            Some(self.next_multi_frame())
        }
    }
}
