//! Telemetry records and their producers
//!
//! Record layouts belong to the application. The node only knows which records exist, where
//! their subject-IDs are configured and how often they are due.

use crate::core::{Priority, SubjectId, TransferId};
use crate::params::{Key, ParameterStore, fetch_subject};
use telenode_encoding::SerializeError;

/// Largest serialized record, bytes
pub const RECORD_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Record {
    /// Fast record, published on every active tick
    EnergySource = 0,
    /// 1 s group
    BatteryStatus = 1,
    /// 5 s group
    BatteryParameters = 2,
    /// 1 s group, disabled by default
    BatteryInfo = 3,
}

impl Record {
    pub const COUNT: usize = 4;

    pub const ALL: [Record; Self::COUNT] = [
        Record::EnergySource,
        Record::BatteryStatus,
        Record::BatteryParameters,
        Record::BatteryInfo,
    ];

    pub const PRIORITY: Priority = Priority::Nominal;

    pub const fn subject_key(self) -> Key {
        match self {
            Record::EnergySource => Key::EnergySourceSubject,
            Record::BatteryStatus => Key::BatteryStatusSubject,
            Record::BatteryParameters => Key::BatteryParametersSubject,
            Record::BatteryInfo => Key::BatteryInfoSubject,
        }
    }

    /// Configured subject, `None` when publication is disabled
    pub fn subject(self, store: &impl ParameterStore) -> Option<SubjectId> {
        fetch_subject(store, self.subject_key()).value
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Outcome of a successful record build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Production {
    /// Serialized length at the head of the buffer
    pub length: usize,
    /// At least one data point was missing and replaced by its default
    pub degraded: bool,
}

/// Builds telemetry records
///
/// Implementations typically read data points from the parameter store, fill a generated
/// DSDL type and serialize it with [`telenode_encoding::encode`].
pub trait RecordProducer {
    fn produce(&mut self, record: Record, buffer: &mut [u8]) -> Result<Production, SerializeError>;
}

/// Per-record transfer-ID counters
#[derive(Debug, Clone, Default)]
pub(crate) struct TransferIds([TransferId; Record::COUNT]);

impl TransferIds {
    pub fn current(&self, record: Record) -> TransferId {
        self.0[record.index()]
    }

    pub fn advance(&mut self, record: Record) {
        let id = &mut self.0[record.index()];
        *id = id.next();
    }
}
