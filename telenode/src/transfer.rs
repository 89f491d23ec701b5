//! Cyphal/CAN transfer framing
//!
//! Every frame ends with a tail byte carrying start/end-of-transfer flags, the toggle bit and
//! the transfer-ID. Multi-frame transfers append a CRC-16/CCITT-FALSE over the payload and
//! padding.

pub(crate) mod gather;
pub(crate) mod scatter;

use crate::core::TransferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransferCrc(u16);

impl Default for TransferCrc {
    fn default() -> Self {
        Self(Self::INIT_VALUE)
    }
}

impl TransferCrc {
    pub const LENGTH: usize = 2;
    const INIT_VALUE: u16 = 0xffff;
    const POLYNOMIAL: u16 = 0x1021;

    pub fn add(&mut self, byte: u8) {
        self.0 ^= u16::from(byte) << 8;
        for _ in 0..8 {
            self.0 = if self.0 & 0x8000 != 0 {
                (self.0 << 1) ^ Self::POLYNOMIAL
            } else {
                self.0 << 1
            };
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|&byte| self.add(byte));
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// A CRC run over data followed by its own big-endian CRC leaves a zero residue.
    pub fn is_residue_valid(&self) -> bool {
        self.0 == 0
    }
}

/// Decoded tail byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TailByte {
    pub sot: bool,
    pub eot: bool,
    pub toggle: bool,
    pub transfer_id: TransferId,
}

impl TailByte {
    const SOT_BIT: u8 = 7;
    const EOT_BIT: u8 = 6;
    const TOGGLE_BIT: u8 = 5;

    /// Toggle bit value of the first frame
    pub const INITIAL_TOGGLE: bool = true;

    pub fn encode(self) -> u8 {
        (self.sot as u8) << Self::SOT_BIT
            | (self.eot as u8) << Self::EOT_BIT
            | (self.toggle as u8) << Self::TOGGLE_BIT
            | self.transfer_id.into_u8()
    }

    pub fn decode(byte: u8) -> Self {
        Self {
            sot: (byte >> Self::SOT_BIT) & 1 != 0,
            eot: (byte >> Self::EOT_BIT) & 1 != 0,
            toggle: (byte >> Self::TOGGLE_BIT) & 1 != 0,
            transfer_id: TransferId::from_u8_truncating(byte),
        }
    }
}

pub(crate) const PAD_VALUE: u8 = 0;
