//! (De)serializable Rust representations for the Cyphal data types the node exchanges itself
//!
//! Telemetry records are serialized by user-supplied producers and are not defined here.

use crate::core::SubjectId;
use telenode_encoding as enc;

/// `pnp.NodeIDAllocationData.1.0`
///
/// Size 7 to 9 bytes
///
/// Plug-and-play node-ID allocation exchange. An anonymous node publishes the hash of its
/// unique-ID with an empty node-ID array; the allocator answers on the same subject with the
/// hash and a single allocated node-ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeIdAllocationData {
    /// `truncated uint48`
    ///
    /// Always aligned,
    /// size 48 bits
    pub unique_id_hash: u64,
    /// `uavcan.node.ID.1.0[<=1]`
    ///
    /// Always aligned,
    /// size ranges from 8 to 24 bits
    pub allocated_node_id: Option<u16>,
}
impl enc::DataType for NodeIdAllocationData {
    /// This type is sealed.
    const EXTENT_BYTES: Option<u32> = None;
}
impl enc::Message for NodeIdAllocationData {}
impl enc::BufferType for NodeIdAllocationData {
    type Buffer = enc::StaticBuffer<{ NodeIdAllocationData::MAX_SIZE_BYTES }>;
}
impl NodeIdAllocationData {
    /// The fixed subject ID for this message type
    pub const SUBJECT: SubjectId = SubjectId::new(8166).unwrap();

    /// Serialized size with one allocated node-ID
    pub const MAX_SIZE_BYTES: usize = 9;

    /// Mask of the 48 hash bits
    pub const HASH_MASK: u64 = (1 << 48) - 1;

    pub const fn request(unique_id_hash: u64) -> Self {
        Self {
            unique_id_hash: unique_id_hash & Self::HASH_MASK,
            allocated_node_id: None,
        }
    }
}
impl enc::Serialize for NodeIdAllocationData {
    fn size_bits(&self) -> usize {
        48 + 8 + self.allocated_node_id.map_or(0, |_| 16)
    }
    fn serialize(&self, cursor: &mut enc::WriteCursor<'_>) {
        let hash = self.unique_id_hash & Self::HASH_MASK;
        cursor.write_aligned_u32(hash as u32);
        cursor.write_aligned_u16((hash >> 32) as u16);
        match self.allocated_node_id {
            Some(node_id) => {
                cursor.write_aligned_u8(1);
                cursor.write_aligned_u16(node_id);
            }
            None => cursor.write_aligned_u8(0),
        }
    }
}
impl enc::Deserialize for NodeIdAllocationData {
    fn deserialize(
        cursor: &mut enc::ReadCursor<'_>,
    ) -> ::core::result::Result<Self, enc::DeserializeError>
    where
        Self: Sized,
    {
        let low = u64::from(cursor.read_u32());
        let high = u64::from(cursor.read_aligned_u16());
        let allocated_node_id = match cursor.read_u8() {
            0 => None,
            1 => Some(cursor.read_aligned_u16()),
            _ => return Err(enc::DeserializeError::ArrayLength),
        };
        Ok(NodeIdAllocationData {
            unique_id_hash: low | high << 32,
            allocated_node_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enc::{Deserialize, Serialize};

    #[test]
    fn test_request_layout() {
        let request = NodeIdAllocationData::request(0xffff_0605_0403_0201);
        let mut buffer = [0; 9];
        let length = enc::encode(&request, &mut buffer).unwrap();
        assert_eq!(length, 7);
        assert_eq!(buffer[..7], [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x00]);
    }

    #[test]
    fn test_response_layout() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x01, 0x2a, 0x00];
        let response = NodeIdAllocationData::deserialize_from_bytes(&bytes).unwrap();
        assert_eq!(response.unique_id_hash, 0x0605_0403_0201);
        assert_eq!(response.allocated_node_id, Some(42));
        assert_eq!(response.size_bits(), 72);
    }

    #[test]
    fn test_oversized_array() {
        let bytes = [0, 0, 0, 0, 0, 0, 0x02, 0x2a, 0x00, 0x2b, 0x00];
        assert!(NodeIdAllocationData::deserialize_from_bytes(&bytes).is_err());
    }
}
