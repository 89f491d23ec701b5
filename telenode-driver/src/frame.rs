//! Transport frame object

use telenode_core::{NodeId, Priority, ServiceId, SubjectId};

use crate::time::Instant;

/// A transport-layer maximum transmission unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mtu {
    Classic,
    Fd,
}

impl From<Mtu> for usize {
    fn from(value: Mtu) -> Self {
        match value {
            Mtu::Classic => 8,
            Mtu::Fd => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IncorrectMtu;

impl TryFrom<usize> for Mtu {
    type Error = IncorrectMtu;
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(Mtu::Classic),
            64 => Ok(Mtu::Fd),
            _ => Err(IncorrectMtu),
        }
    }
}

/// Kind and port of the transfer a frame belongs to
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataSpecifier {
    Message(SubjectId),
    Request(ServiceId),
    Response(ServiceId),
}

impl DataSpecifier {
    pub fn is_service(self) -> bool {
        !matches!(self, DataSpecifier::Message(_))
    }
}

/// Frame properties carried by the CAN ID
///
/// `source` is `None` for anonymous messages. `destination` is `Some` for services only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub priority: Priority,
    pub data_spec: DataSpecifier,
    pub source: Option<NodeId>,
    pub destination: Option<NodeId>,
}

impl Header {
    pub fn message(priority: Priority, subject: SubjectId, source: Option<NodeId>) -> Self {
        Self {
            priority,
            data_spec: DataSpecifier::Message(subject),
            source,
            destination: None,
        }
    }

    pub fn response(
        priority: Priority,
        service: ServiceId,
        source: NodeId,
        destination: NodeId,
    ) -> Self {
        Self {
            priority,
            data_spec: DataSpecifier::Response(service),
            source: Some(source),
            destination: Some(destination),
        }
    }
}

/// Transport frame for both Classic and FD transport
///
/// The data length should be limited to the relevant MTU.
///
/// The timestamp meaning depends on direction:
/// * transmission deadline for outbound frames
/// * reception instant for inbound frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub header: Header,
    pub data: Data,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(header: Header, data: Data, timestamp: Instant) -> Self {
        Self {
            header,
            data,
            timestamp,
        }
    }
}

/// CAN-FD-compatible data length
///
/// Data length code (DLC) of CAN-FD frames supports limited data length options.
/// Classic CAN frames support a subset of CAN-FD length options limited by MTU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataLength(u8);

impl DataLength {
    pub const MAX: usize = 64;

    pub const fn new(value: usize) -> Option<Self> {
        let floor = Self::new_floor(value);
        if floor.as_usize() == value {
            Some(floor)
        } else {
            None
        }
    }

    pub const fn new_floor(value: usize) -> Self {
        let floor = match value {
            0..8 => value,
            8..24 => value / 4 * 4,
            24..32 => value / 8 * 8,
            32..64 => value / 16 * 16,
            64.. => 64,
        };
        Self(floor as u8)
    }

    pub const fn new_ceil(value: usize) -> Option<Self> {
        if value <= Self::MAX {
            let ceil = match value {
                0..8 => value,
                8..24 => value.div_ceil(4) * 4,
                24..32 => value.div_ceil(8) * 8,
                32.. => value.div_ceil(16) * 16,
            };
            Some(Self(ceil as u8))
        } else {
            None
        }
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl From<DataLength> for usize {
    fn from(value: DataLength) -> Self {
        value.as_usize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidLength;

/// CAN-FD frame compatible data vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    length: DataLength,
    bytes: [u8; DataLength::MAX],
}

impl Data {
    /// Creates a new vector from a slice of compatible length.
    pub fn new(data: &[u8]) -> Result<Self, InvalidLength> {
        let length = DataLength::new(data.len()).ok_or(InvalidLength)?;
        let mut bytes = [0; DataLength::MAX];
        bytes[..data.len()].copy_from_slice(data);

        Ok(Self { length, bytes })
    }

    pub fn new_zeros(length: DataLength) -> Self {
        Self {
            length,
            bytes: [0; DataLength::MAX],
        }
    }

    pub fn length(&self) -> DataLength {
        self.length
    }
}

impl core::ops::Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..usize::from(self.length)]
    }
}

impl core::ops::DerefMut for Data {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes[..usize::from(self.length)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CAN_LENGTH: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

    #[test]
    fn test_ceil_length() {
        for len in 0usize..100 {
            let expected = VALID_CAN_LENGTH.iter().copied().find(|&valid| valid >= len);
            assert_eq!(DataLength::new_ceil(len).map(usize::from), expected);
        }
    }

    #[test]
    fn test_data_rejects_odd_length() {
        assert_eq!(Data::new(&[0; 9]), Err(InvalidLength));
        let data = Data::new(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(data.len(), 12);
        assert_eq!(data[11], 12);
    }

    #[test]
    fn test_service_specifiers() {
        let service = ServiceId::new(384).unwrap();
        assert!(DataSpecifier::Request(service).is_service());
        assert!(DataSpecifier::Response(service).is_service());
        let subject = SubjectId::new(8166).unwrap();
        assert!(!DataSpecifier::Message(subject).is_service());
    }
}
