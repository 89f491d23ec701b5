#![allow(dead_code)]

use std::boxed::Box;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::vec::Vec;

use telenode::bridge::{ConfigBridge, Outbox, PortRegister, RegisterValue, RegistrationError};
use telenode::core::ServiceId;
use telenode::frame::{Frame, Mtu};
use telenode::can_id;
use telenode::params::{Key, ParameterStore, StoreError, Value};
use telenode::reassembly::Transfer;
use telenode::telemetry::{Production, Record, RecordProducer};
use telenode::transport::{
    Interface, LinkConfig, OpenError, ReceiveError, SendError, SendOutcome, Transport,
};
use telenode_encoding::SerializeError;

pub const ACCESS_SERVICE: ServiceId = ServiceId::new(384).unwrap();

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame>>;

#[derive(Default)]
struct BusState {
    opened: Option<LinkConfig>,
    sent: Vec<Frame>,
    inbound: VecDeque<Frame>,
    busy: usize,
    reject: bool,
    waker: Option<Waker>,
    responder: Option<Responder>,
}

/// Shared view of a scripted CAN bus
#[derive(Clone, Default)]
pub struct Bus(Rc<RefCell<BusState>>);

impl Bus {
    pub fn inject(&self, frame: Frame) {
        let mut state = self.0.borrow_mut();
        state.inbound.push_back(frame);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.0.borrow().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.0.borrow_mut().sent.clear();
    }

    pub fn opened(&self) -> Option<LinkConfig> {
        self.0.borrow().opened
    }

    /// The next `count` send attempts report a busy transceiver.
    pub fn set_busy(&self, count: usize) {
        self.0.borrow_mut().busy = count;
    }

    pub fn set_reject(&self, reject: bool) {
        self.0.borrow_mut().reject = reject;
    }

    /// Frames returned by `responder` are delivered after each accepted frame.
    pub fn set_responder(&self, responder: impl FnMut(&Frame) -> Vec<Frame> + 'static) {
        self.0.borrow_mut().responder = Some(Box::new(responder));
    }

    pub fn interface(&self) -> MockInterface {
        MockInterface {
            bus: self.clone(),
            fail: None,
        }
    }
}

pub struct MockInterface {
    bus: Bus,
    pub fail: Option<OpenError>,
}

impl Interface for MockInterface {
    type Transport = MockTransport;

    fn open(&mut self, _device: &str, config: &LinkConfig) -> Result<MockTransport, OpenError> {
        if let Some(err) = self.fail {
            return Err(err);
        }
        self.bus.0.borrow_mut().opened = Some(*config);
        Ok(MockTransport {
            bus: self.bus.clone(),
            mtu: config.mtu,
        })
    }
}

pub struct MockTransport {
    bus: Bus,
    mtu: Mtu,
}

impl Transport for MockTransport {
    fn mtu(&self) -> Mtu {
        self.mtu
    }

    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.bus.0.borrow_mut();
        if state.inbound.is_empty() {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }

    fn try_send(&mut self, frame: &Frame) -> Result<SendOutcome, SendError> {
        let mut responder = {
            let mut state = self.bus.0.borrow_mut();
            if state.busy > 0 {
                state.busy -= 1;
                return Ok(SendOutcome::Busy);
            }
            if state.reject {
                return Err(SendError::Device);
            }
            // Only frames that survive the extended CAN ID mapping reach the wire
            if can_id::decode(can_id::encode(&frame.header, frame.data[0])) != Some(frame.header) {
                return Err(SendError::InvalidFrame);
            }
            state.sent.push(*frame);
            state.responder.take()
        };
        if let Some(respond) = responder.as_mut() {
            for response in respond(frame) {
                self.bus.inject(response);
            }
        }
        self.bus.0.borrow_mut().responder = responder;
        Ok(SendOutcome::Accepted)
    }

    fn receive(&mut self) -> Result<Frame, ReceiveError> {
        self.bus
            .0
            .borrow_mut()
            .inbound
            .pop_front()
            .ok_or(ReceiveError::Empty)
    }
}

/// In-memory parameter store shared with the test body
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Rc<RefCell<Vec<(Key, Value)>>>,
    failing: Rc<RefCell<bool>>,
}

impl MemoryStore {
    pub fn with(self, key: Key, value: Value) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&self, key: Key, value: Value) {
        let mut values = self.values.borrow_mut();
        values.retain(|(k, _)| *k != key);
        values.push((key, value));
    }

    /// Every lookup fails while set.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.borrow_mut() = failing;
    }
}

impl ParameterStore for MemoryStore {
    fn get(&self, key: Key) -> Option<Value> {
        if *self.failing.borrow() {
            return None;
        }
        self.values
            .borrow()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, value)| value)
    }

    fn set(&mut self, key: Key, value: Value) -> Result<(), StoreError> {
        if *self.failing.borrow() {
            return Err(StoreError::Storage);
        }
        self.put(key, value);
        Ok(())
    }
}

#[derive(Default)]
pub struct BridgeLog {
    pub registered: Vec<PortRegister>,
    pub processed: Vec<Vec<u8>>,
}

/// Bridge serving a toy register protocol on [`ACCESS_SERVICE`]
///
/// Request `[index]` reads a register, `[index, lo, hi]` writes it. The response is the
/// status byte (0 on success) followed by the little-endian value, if any.
#[derive(Clone)]
pub struct RecordingBridge {
    pub log: Rc<RefCell<BridgeLog>>,
    services: [ServiceId; 1],
}

impl Default for RecordingBridge {
    fn default() -> Self {
        Self {
            log: Default::default(),
            services: [ACCESS_SERVICE],
        }
    }
}

impl ConfigBridge for RecordingBridge {
    fn register(&mut self, register: PortRegister) -> Result<(), RegistrationError> {
        let mut log = self.log.borrow_mut();
        if log.registered.iter().any(|r| r.name == register.name) {
            return Err(RegistrationError::Duplicate);
        }
        log.registered.push(register);
        Ok(())
    }

    fn services(&self) -> &[ServiceId] {
        &self.services
    }

    fn process<S: ParameterStore>(
        &mut self,
        request: &Transfer,
        payload: &[u8],
        store: &mut S,
        outbox: &mut Outbox<'_>,
    ) {
        let mut log = self.log.borrow_mut();
        log.processed.push(payload.to_vec());
        let Some(register) = payload
            .first()
            .and_then(|&index| log.registered.get(usize::from(index)))
            .copied()
        else {
            outbox.respond(request, &[1]).unwrap();
            return;
        };

        let response = match *payload {
            [_, lo, hi] => {
                let value = RegisterValue::Natural16(
                    heapless::Vec::from_slice(&[u16::from_le_bytes([lo, hi])]).unwrap(),
                );
                match register.set(store, &value) {
                    Ok(()) => std::vec![0],
                    Err(_) => std::vec![2],
                }
            }
            _ => match register.get(&*store) {
                RegisterValue::Natural16(elements) => {
                    let [lo, hi] = elements[0].to_le_bytes();
                    std::vec![0, lo, hi]
                }
                _ => std::vec![3],
            },
        };
        outbox.respond(request, &response).unwrap();
    }
}

#[derive(Default)]
pub struct ProducerLog {
    pub produced: Vec<Record>,
    /// Records that fail to serialize
    pub failing: Vec<Record>,
    /// Records that report a missing data point
    pub degraded: Vec<Record>,
}

/// Producer writing `record as u8` repeated; the fast record spans two Classic frames.
#[derive(Clone, Default)]
pub struct RecordingProducer {
    pub log: Rc<RefCell<ProducerLog>>,
}

impl RecordingProducer {
    pub fn length(record: Record) -> usize {
        match record {
            Record::EnergySource => 10,
            _ => 4,
        }
    }
}

impl RecordProducer for RecordingProducer {
    fn produce(&mut self, record: Record, buffer: &mut [u8]) -> Result<Production, SerializeError> {
        let mut log = self.log.borrow_mut();
        log.produced.push(record);
        if log.failing.contains(&record) {
            return Err(SerializeError::BufferTooSmall { required: 1024 });
        }
        let length = Self::length(record);
        buffer[..length].fill(record as u8);
        Ok(Production {
            length,
            degraded: log.degraded.contains(&record),
        })
    }
}
