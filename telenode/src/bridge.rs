//! Configuration bridge contract
//!
//! The bridge answers register access requests from peers. The node registers one
//! [`PortRegister`] per telemetry record at startup, so peers can read and move the
//! publication subjects at run time.

use heapless::Vec;

use crate::config::TX_QUEUE_CAPACITY;
use crate::core::{NodeId, ServiceId};
use crate::frame::{DataSpecifier, Header, Mtu};
use crate::params::{Key, ParameterStore, Value};
use crate::queue::{PushError, TxQueue};
use crate::reassembly::Transfer;
use crate::time::Instant;

/// Array capacity of register values
pub const VALUE_CAPACITY: usize = 16;

/// Register value subset used by the node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterValue {
    #[default]
    Empty,
    Natural8(Vec<u8, VALUE_CAPACITY>),
    Natural16(Vec<u16, VALUE_CAPACITY>),
    Natural32(Vec<u32, VALUE_CAPACITY>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterError {
    /// The value has the wrong type or shape, or could not be stored
    Serialization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError {
    Full,
    /// A register with the same name exists
    Duplicate,
}

/// Named register backed by a subject parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortRegister {
    pub name: &'static str,
    pub key: Key,
}

impl PortRegister {
    pub const fn new(name: &'static str, key: Key) -> Self {
        Self { name, key }
    }

    /// Stores a subject-ID. Accepts exactly one `Natural16` element.
    pub fn set(
        &self,
        store: &mut impl ParameterStore,
        value: &RegisterValue,
    ) -> Result<(), RegisterError> {
        let RegisterValue::Natural16(elements) = value else {
            return Err(RegisterError::Serialization);
        };
        let &[subject] = elements.as_slice() else {
            return Err(RegisterError::Serialization);
        };
        store
            .set(self.key, Value::Natural16(subject))
            .map_err(|err| {
                warn!("register {} not stored: {:?}", self.name, err);
                RegisterError::Serialization
            })
    }

    pub fn get(&self, store: &impl ParameterStore) -> RegisterValue {
        match store.get(self.key) {
            Some(Value::Natural16(subject)) => {
                let mut elements = Vec::new();
                unwrap!(elements.push(subject).ok());
                RegisterValue::Natural16(elements)
            }
            _ => RegisterValue::Empty,
        }
    }
}

/// Registers exposed by every node, one per telemetry record
pub const PORT_REGISTERS: [PortRegister; 4] = [
    PortRegister::new("energy_source", Key::EnergySourceSubject),
    PortRegister::new("battery_status", Key::BatteryStatusSubject),
    PortRegister::new("battery_parameters", Key::BatteryParametersSubject),
    PortRegister::new("battery_info", Key::BatteryInfoSubject),
];

/// Response sink handed to the bridge while it processes a request
pub struct Outbox<'a> {
    queue: &'a mut TxQueue<TX_QUEUE_CAPACITY>,
    local: NodeId,
    mtu: Mtu,
    deadline: Instant,
    sent: usize,
}

impl<'a> Outbox<'a> {
    pub(crate) fn new(
        queue: &'a mut TxQueue<TX_QUEUE_CAPACITY>,
        local: NodeId,
        mtu: Mtu,
        deadline: Instant,
    ) -> Self {
        Self {
            queue,
            local,
            mtu,
            deadline,
            sent: 0,
        }
    }

    /// Queues a response to `request` with the request's priority and transfer-ID.
    ///
    /// Returns the number of queued frames.
    pub fn respond(&mut self, request: &Transfer, payload: &[u8]) -> Result<usize, PushError> {
        let (DataSpecifier::Request(service), Some(client)) = (request.data_spec, request.source)
        else {
            unreachable!("respond to a non-request transfer")
        };
        let header = Header::response(request.priority, service, self.local, client);
        let count = self
            .queue
            .push_transfer(header, request.transfer_id, payload, self.mtu, self.deadline)?;
        self.sent += 1;
        Ok(count)
    }

    /// Responses queued through this outbox
    pub fn sent(&self) -> usize {
        self.sent
    }
}

/// Register service provider
pub trait ConfigBridge {
    fn register(&mut self, register: PortRegister) -> Result<(), RegistrationError>;

    /// Service ports the bridge answers on. Must not change after registration.
    fn services(&self) -> &[ServiceId];

    /// Handles one request transfer on a port listed by `services`.
    fn process<S: ParameterStore>(
        &mut self,
        request: &Transfer,
        payload: &[u8],
        store: &mut S,
        outbox: &mut Outbox<'_>,
    );
}
