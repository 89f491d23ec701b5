//! Node task state
//!
//! [`Node`] owns every piece of mutable protocol state: the outbound queue, the payload arena,
//! reassembly sessions, the routing table and the publication scheduler. All operations are
//! methods on it, so the state is threaded through the task explicitly.
//!
//! One steady-state iteration of the task is
//! 1. [`Node::tick`] if the previous pump reported a publish request,
//! 2. [`Node::pump`], which drains the queue, waits for the transport or the trigger,
//!    handles at most one inbound frame and drains again.

mod runner;

pub use runner::{Liveness, Runner};

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::arena::{Arena, ArenaStats};
use crate::bridge::{ConfigBridge, Outbox, PORT_REGISTERS, RegistrationError};
use crate::config::{ARENA_BLOCK_COUNT, ARENA_BLOCK_SIZE, Config, TX_QUEUE_CAPACITY};
use crate::core::NodeId;
use crate::data_types::NodeIdAllocationData;
use crate::event::{Source, wait_any};
use crate::frame::{DataSpecifier, Header, Mtu};
use crate::params::{
    ParameterStore, fetch_bitrate, fetch_fd_bitrate, fetch_fd_mode, fetch_measurement_period,
    fetch_static_node_id, fetch_subject,
};
use crate::pnp::{NegotiationState, Negotiator};
use crate::queue::{PushError, TxQueue};
use crate::reassembly::{Reassembler, SubscribeError, Transfer};
use crate::routing::{Route, RouteError, Routes};
use crate::schedule::{RecordSet, Scheduler};
use crate::telemetry::{RECORD_CAPACITY, Record, RecordProducer, TransferIds};
use crate::time::{Duration, Instant};
use crate::transport::{Interface, LinkConfig, OpenError, ReceiveError, SendOutcome, Transport};
use crate::trigger::Trigger;
use telenode_encoding::SerializeError;

pub type PayloadArena = Arena<ARENA_BLOCK_COUNT, ARENA_BLOCK_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupError {
    Open(OpenError),
    Registration(RegistrationError),
    Route(RouteError),
    Subscribe(SubscribeError),
}

impl From<OpenError> for StartupError {
    fn from(value: OpenError) -> Self {
        Self::Open(value)
    }
}

impl From<RegistrationError> for StartupError {
    fn from(value: RegistrationError) -> Self {
        Self::Registration(value)
    }
}

impl From<RouteError> for StartupError {
    fn from(value: RouteError) -> Self {
        Self::Route(value)
    }
}

impl From<SubscribeError> for StartupError {
    fn from(value: SubscribeError) -> Self {
        Self::Subscribe(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishError {
    /// The record subject is unset or out of range
    Disabled,
    /// The node has no node-ID yet
    Anonymous,
    Serialize(SerializeError),
    Push(PushError),
}

/// A queued record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Published {
    pub frames: usize,
    /// A default was substituted for the subject or a data point
    pub degraded: bool,
}

/// Outbound and inbound traffic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PumpStats {
    /// Frames accepted by the transport
    pub sent: u32,
    /// Frames dropped at their deadline without a send attempt
    pub expired: u32,
    /// Frames refused by the transport and dropped
    pub rejected: u32,
    /// Send attempts deferred because the transport was busy
    pub busy: u32,
    pub received: u32,
    pub completed: u32,
    pub reassembly_errors: u32,
}

/// Publication counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishStats {
    pub queued: u32,
    pub degraded: u32,
    pub disabled: u32,
    pub dropped: u32,
}

pub struct Node<'a, M, T, S, B, P>
where
    M: RawMutex,
    T: Transport,
    S: ParameterStore,
    B: ConfigBridge,
    P: RecordProducer,
{
    transport: T,
    trigger: &'a Trigger<M>,
    store: S,
    bridge: B,
    producer: P,
    config: Config,
    mtu: Mtu,
    node_id: Option<NodeId>,
    negotiator: Option<Negotiator>,
    queue: TxQueue<TX_QUEUE_CAPACITY>,
    arena: PayloadArena,
    reassembler: Reassembler,
    routes: Routes,
    scheduler: Scheduler,
    transfer_ids: TransferIds,
    pump_stats: PumpStats,
    publish_stats: PublishStats,
}

impl<'a, M, T, S, B, P> Node<'a, M, T, S, B, P>
where
    M: RawMutex,
    T: Transport,
    S: ParameterStore,
    B: ConfigBridge,
    P: RecordProducer,
{
    /// Opens the transport and builds the static tables.
    ///
    /// The link mode and the node-ID come from the parameter store. Without a static node-ID
    /// the node starts anonymous and has to [`negotiate`](Self::negotiate) one.
    pub fn start<I>(
        interface: &mut I,
        trigger: &'a Trigger<M>,
        store: S,
        mut bridge: B,
        producer: P,
        config: Config,
    ) -> Result<Self, StartupError>
    where
        I: Interface<Transport = T>,
    {
        let link = LinkConfig {
            mtu: if fetch_fd_mode(&store) {
                Mtu::Fd
            } else {
                Mtu::Classic
            },
            bitrate: fetch_bitrate(&store),
            fd_bitrate: fetch_fd_bitrate(&store),
        };
        let transport = interface.open(config.device, &link).inspect_err(|err| {
            error!("cannot open {}: {:?}", config.device, err);
        })?;
        let mtu = transport.mtu();
        let node_id = fetch_static_node_id(&store);

        for register in PORT_REGISTERS {
            bridge.register(register)?;
        }

        let mut routes = Routes::new();
        let mut reassembler = Reassembler::new(config.transfer_id_timeout);
        let negotiator = match node_id {
            Some(_) => None,
            None => {
                let port = DataSpecifier::Message(NodeIdAllocationData::SUBJECT);
                routes.insert(port, Route::Allocation)?;
                reassembler.subscribe(port, NodeIdAllocationData::MAX_SIZE_BYTES)?;
                Some(Negotiator::new(&config.unique_id, Instant::now()))
            }
        };
        for &service in bridge.services() {
            let port = DataSpecifier::Request(service);
            routes.insert(port, Route::Bridge)?;
            reassembler.subscribe(port, ARENA_BLOCK_SIZE)?;
        }

        info!(
            "node started on {} (node-id {:?}, mtu {:?})",
            config.device, node_id, mtu
        );
        Ok(Self {
            transport,
            trigger,
            store,
            bridge,
            producer,
            config,
            mtu,
            node_id,
            negotiator,
            queue: TxQueue::new(),
            arena: PayloadArena::new(),
            reassembler,
            routes,
            scheduler: Scheduler::new(),
            transfer_ids: TransferIds::default(),
            pump_stats: PumpStats::default(),
            publish_stats: PublishStats::default(),
        })
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    pub fn mtu(&self) -> Mtu {
        self.mtu
    }

    /// `None` when the node-ID is static
    pub fn negotiation_state(&self) -> Option<NegotiationState> {
        self.negotiator.as_ref().map(Negotiator::state)
    }

    pub fn queue(&self) -> &TxQueue<TX_QUEUE_CAPACITY> {
        &self.queue
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub fn pump_stats(&self) -> PumpStats {
        self.pump_stats
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.publish_stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Runs the allocation exchange until a node-ID is assigned. Returns immediately with a
    /// static node-ID.
    ///
    /// Returns whether a publish was requested while negotiating.
    pub async fn negotiate(&mut self) -> bool {
        let mut requested = false;
        while self.node_id.is_none() {
            requested |= self.pump(Some(self.config.negotiation_wait)).await;
            if self.node_id.is_some() {
                break;
            }
            let Some(negotiator) = self.negotiator.as_mut() else {
                unreachable!("anonymous node without negotiator")
            };
            let now = Instant::now();
            if let Err(err) =
                negotiator.poll(now, &mut self.queue, self.mtu, self.config.allocation_deadline)
            {
                error!("allocation request not queued: {:?}", err);
            }
        }
        requested
    }

    /// Advances the scheduler by one tick and publishes the due records.
    pub fn tick(&mut self, now: Instant) -> RecordSet {
        let t_meas = fetch_measurement_period(&self.store).value;
        let due = self.scheduler.tick(t_meas);
        for record in due.iter() {
            match self.publish(record, now) {
                Ok(published) => trace!("{:?} queued in {} frames", record, published.frames),
                Err(PublishError::Disabled) => trace!("{:?} disabled", record),
                Err(err) => error!("{:?} dropped: {:?}", record, err),
            }
        }
        due
    }

    /// Builds one record and queues it with the telemetry deadline.
    ///
    /// The subject is checked before the producer runs, so a disabled record costs nothing.
    pub fn publish(&mut self, record: Record, now: Instant) -> Result<Published, PublishError> {
        let subject = fetch_subject(&self.store, record.subject_key());
        let Some(subject_id) = subject.value else {
            self.publish_stats.disabled = self.publish_stats.disabled.wrapping_add(1);
            return Err(PublishError::Disabled);
        };
        let Some(source) = self.node_id else {
            return Err(PublishError::Anonymous);
        };

        let mut buffer = [0; RECORD_CAPACITY];
        let production = self
            .producer
            .produce(record, &mut buffer)
            .and_then(|production| {
                if production.length <= buffer.len() {
                    Ok(production)
                } else {
                    Err(SerializeError::BufferTooSmall {
                        required: production.length,
                    })
                }
            })
            .map_err(|err| {
                self.publish_stats.dropped = self.publish_stats.dropped.wrapping_add(1);
                PublishError::Serialize(err)
            })?;

        let header = Header::message(Record::PRIORITY, subject_id, Some(source));
        let frames = self
            .queue
            .push_transfer(
                header,
                self.transfer_ids.current(record),
                &buffer[..production.length],
                self.mtu,
                now + self.config.telemetry_deadline,
            )
            .map_err(|err| {
                self.publish_stats.dropped = self.publish_stats.dropped.wrapping_add(1);
                PublishError::Push(err)
            })?;
        self.transfer_ids.advance(record);

        let degraded = production.degraded || subject.degraded;
        self.publish_stats.queued = self.publish_stats.queued.wrapping_add(1);
        if degraded {
            self.publish_stats.degraded = self.publish_stats.degraded.wrapping_add(1);
            warn!("{:?} published with substituted data", record);
        }
        Ok(Published { frames, degraded })
    }

    /// Drains the outbound queue.
    ///
    /// Frames at or past their deadline are dropped without a send attempt. Accepted and
    /// refused frames leave the queue; a busy transport stops the drain with the head kept for
    /// the next call.
    ///
    /// Each head is checked against the later of `now` and the current clock, so time spent in
    /// the transport counts against the frames behind it.
    pub fn flush(&mut self, now: Instant) {
        while let Some(&frame) = self.queue.peek() {
            if frame.timestamp <= now.max(Instant::now()) {
                warn!("frame on {:?} expired", frame.header.data_spec);
                self.queue.pop();
                self.pump_stats.expired = self.pump_stats.expired.wrapping_add(1);
                continue;
            }
            match self.transport.try_send(&frame) {
                Ok(SendOutcome::Accepted) => {
                    self.queue.pop();
                    self.pump_stats.sent = self.pump_stats.sent.wrapping_add(1);
                }
                Ok(SendOutcome::Busy) => {
                    self.pump_stats.busy = self.pump_stats.busy.wrapping_add(1);
                    break;
                }
                Err(err) => {
                    warn!("frame on {:?} rejected: {:?}", frame.header.data_spec, err);
                    self.queue.pop();
                    self.pump_stats.rejected = self.pump_stats.rejected.wrapping_add(1);
                }
            }
        }
    }

    /// One pump cycle: drain, wait at most `timeout` for the transport or the trigger, handle
    /// what fired.
    ///
    /// Returns whether a publish was requested.
    pub async fn pump(&mut self, timeout: Option<Duration>) -> bool {
        self.flush(Instant::now());
        let readiness = wait_any(&mut self.transport, self.trigger, timeout).await;

        if readiness.contains(Source::Transport) {
            self.receive_one();
            self.flush(Instant::now());
        }
        readiness.contains(Source::Trigger) && self.trigger.take() > 0
    }

    /// Receives one frame and routes the transfer it completes, if any.
    pub fn receive_one(&mut self) {
        let frame = match self.transport.receive() {
            Ok(frame) => frame,
            Err(ReceiveError::Empty) => return,
            Err(err) => {
                warn!("receive failed: {:?}", err);
                return;
            }
        };
        self.pump_stats.received = self.pump_stats.received.wrapping_add(1);

        match self
            .reassembler
            .accept(&frame, self.node_id, &mut self.arena)
        {
            Ok(Some(transfer)) => {
                self.pump_stats.completed = self.pump_stats.completed.wrapping_add(1);
                self.route(transfer);
            }
            Ok(None) => {}
            Err(err) => {
                self.pump_stats.reassembly_errors =
                    self.pump_stats.reassembly_errors.wrapping_add(1);
                error!("reassembly failed on {:?}: {:?}", frame.header.data_spec, err);
            }
        }
    }

    fn route(&mut self, transfer: Transfer) {
        match self.routes.route(transfer.data_spec) {
            Some(Route::Allocation) => {
                if let Some(negotiator) = self.negotiator.as_mut()
                    && let Some(node_id) =
                        negotiator.handle_response(self.arena.bytes(&transfer.payload))
                {
                    self.node_id = Some(node_id);
                }
            }
            Some(Route::Bridge) => {
                if let Some(local) = self.node_id {
                    let deadline = Instant::now() + self.config.response_deadline;
                    let mut outbox = Outbox::new(&mut self.queue, local, self.mtu, deadline);
                    self.bridge.process(
                        &transfer,
                        self.arena.bytes(&transfer.payload),
                        &mut self.store,
                        &mut outbox,
                    );
                }
            }
            None => debug!("no route for {:?}", transfer.data_spec),
        }
        self.arena.free(transfer.payload);
    }
}
