//! Parameter store contract and default-substituting accessors
//!
//! Every key has a documented default. Accessors never fail: a missing or ill-typed value is
//! replaced by the default and reported as degraded.

use crate::core::{NodeId, SubjectId};

/// Parameter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// Static node-id; 255 selects plug-and-play negotiation
    NodeStaticId,
    /// Bit 0 selects the CAN FD MTU
    CanFdMode,
    /// Nominal bit rate, bit/s
    CanBitrate,
    /// Data phase bit rate, bit/s
    CanFdBitrate,
    /// Measurement period `t_meas`, ms
    MeasurementPeriod,
    EnergySourceSubject,
    BatteryStatusSubject,
    BatteryParametersSubject,
    BatteryInfoSubject,
}

impl Key {
    pub const fn default_value(self) -> Value {
        match self {
            Key::NodeStaticId => Value::Natural8(NodeId::UNSET_RAW),
            Key::CanFdMode => Value::Natural8(0),
            Key::CanBitrate => Value::Natural32(1_000_000),
            Key::CanFdBitrate => Value::Natural32(4_000_000),
            Key::MeasurementPeriod => Value::Natural16(1000),
            Key::EnergySourceSubject => Value::Natural16(4096),
            Key::BatteryStatusSubject => Value::Natural16(4097),
            Key::BatteryParametersSubject => Value::Natural16(4098),
            Key::BatteryInfoSubject => Value::Natural16(DISABLED_SUBJECT),
        }
    }
}

/// Subject value that disables a record
pub const DISABLED_SUBJECT: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Value {
    Natural8(u8),
    Natural16(u16),
    Natural32(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The key is not writable
    ReadOnly,
    /// The value type does not match the key
    Type,
    /// The backing storage failed
    Storage,
}

/// Key/value store supplying configuration and telemetry inputs
pub trait ParameterStore {
    fn get(&self, key: Key) -> Option<Value>;

    fn set(&mut self, key: Key, value: Value) -> Result<(), StoreError>;
}

/// A fetched value; `degraded` is set when the default was substituted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fetched<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Fetched<T> {
    const fn exact(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    const fn substituted(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

fn fetch_natural8(store: &impl ParameterStore, key: Key) -> Fetched<u8> {
    let Value::Natural8(default) = key.default_value() else {
        unreachable!()
    };
    match store.get(key) {
        Some(Value::Natural8(value)) => Fetched::exact(value),
        other => {
            warn!("parameter {:?} unavailable ({:?}), using default {}", key, other, default);
            Fetched::substituted(default)
        }
    }
}

fn fetch_natural16(store: &impl ParameterStore, key: Key) -> Fetched<u16> {
    let Value::Natural16(default) = key.default_value() else {
        unreachable!()
    };
    match store.get(key) {
        Some(Value::Natural16(value)) => Fetched::exact(value),
        other => {
            warn!("parameter {:?} unavailable ({:?}), using default {}", key, other, default);
            Fetched::substituted(default)
        }
    }
}

fn fetch_natural32(store: &impl ParameterStore, key: Key) -> Fetched<u32> {
    let Value::Natural32(default) = key.default_value() else {
        unreachable!()
    };
    match store.get(key) {
        Some(Value::Natural32(value)) => Fetched::exact(value),
        other => {
            warn!("parameter {:?} unavailable ({:?}), using default {}", key, other, default);
            Fetched::substituted(default)
        }
    }
}

/// Configured static node-id, or `None` when the node has to negotiate one
///
/// Out-of-range values other than the unset marker also select negotiation.
pub fn fetch_static_node_id(store: &impl ParameterStore) -> Option<NodeId> {
    let raw = fetch_natural8(store, Key::NodeStaticId).value;
    let node_id = NodeId::new(raw);
    if node_id.is_none() && raw != NodeId::UNSET_RAW {
        warn!("static node-id {} out of range, negotiating", raw);
    }
    node_id
}

pub fn fetch_fd_mode(store: &impl ParameterStore) -> bool {
    fetch_natural8(store, Key::CanFdMode).value & 1 != 0
}

pub fn fetch_bitrate(store: &impl ParameterStore) -> u32 {
    fetch_natural32(store, Key::CanBitrate).value
}

pub fn fetch_fd_bitrate(store: &impl ParameterStore) -> u32 {
    fetch_natural32(store, Key::CanFdBitrate).value
}

/// Measurement period in ms, never zero
pub fn fetch_measurement_period(store: &impl ParameterStore) -> Fetched<u16> {
    let fetched = fetch_natural16(store, Key::MeasurementPeriod);
    if fetched.value == 0 {
        let Value::Natural16(default) = Key::MeasurementPeriod.default_value() else {
            unreachable!()
        };
        warn!("measurement period 0 is invalid, using default {}", default);
        return Fetched::substituted(default);
    }
    fetched
}

/// Publication subject of a record, `None` when disabled
pub fn fetch_subject(store: &impl ParameterStore, key: Key) -> Fetched<Option<SubjectId>> {
    let fetched = fetch_natural16(store, key);
    Fetched {
        value: SubjectId::new(fetched.value),
        degraded: fetched.degraded,
    }
}
