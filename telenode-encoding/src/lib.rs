//! Cyphal DSDL codec used by telenode data types
//!
//! Re-exports `canadensis_encoding` and adds a checked serialization entry point. Node users
//! should not depend on this crate directly.

#![no_std]

pub use canadensis_encoding::*;

/// Associates a data type with a scratch buffer that always fits its serialized form.
pub trait BufferType {
    type Buffer: Sized + Send + Sync + Default + AsMut<[u8]> + AsRef<[u8]> + 'static;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerializeError {
    /// The encoded object is longer than the provided buffer
    BufferTooSmall { required: usize },
}

/// Serializes `value` into the head of `buffer` and returns the encoded length in bytes.
///
/// Unlike `Serialize::serialize_to_bytes`, an undersized buffer is reported instead of
/// causing a panic.
pub fn encode<T: Serialize>(value: &T, buffer: &mut [u8]) -> Result<usize, SerializeError> {
    let required = value.size_bits().div_ceil(8);
    let target = buffer
        .get_mut(..required)
        .ok_or(SerializeError::BufferTooSmall { required })?;
    value.serialize_to_bytes(target);
    Ok(required)
}

/// Fixed-size scratch buffer for one serialized object
#[derive(Debug, Clone)]
pub struct StaticBuffer<const N: usize>([u8; N]);

impl<const N: usize> StaticBuffer<N> {
    /// Serializes `value` and returns the encoded bytes.
    pub fn encode<T: Serialize>(&mut self, value: &T) -> Result<&[u8], SerializeError> {
        let length = encode(value, &mut self.0)?;
        Ok(&self.0[..length])
    }
}

impl<const N: usize> Default for StaticBuffer<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> AsRef<[u8]> for StaticBuffer<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> AsMut<[u8]> for StaticBuffer<N> {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair(u8, u16);

    impl DataType for Pair {
        const EXTENT_BYTES: Option<u32> = None;
    }

    impl Serialize for Pair {
        fn size_bits(&self) -> usize {
            24
        }

        fn serialize(&self, cursor: &mut WriteCursor<'_>) {
            cursor.write_aligned_u8(self.0);
            cursor.write_aligned_u16(self.1);
        }
    }

    #[test]
    fn test_encode_reports_short_buffer() {
        let mut buffer = [0; 2];
        assert_eq!(
            encode(&Pair(1, 2), &mut buffer),
            Err(SerializeError::BufferTooSmall { required: 3 })
        );
    }

    #[test]
    fn test_static_buffer() {
        let mut buffer = StaticBuffer::<8>::default();
        assert_eq!(buffer.encode(&Pair(0xaa, 0x0201)), Ok(&[0xaa, 0x01, 0x02][..]));
        assert!(StaticBuffer::<1>::default().encode(&Pair(0, 0)).is_err());
    }
}
