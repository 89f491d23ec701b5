mod common;

use common::{Bus, MemoryStore, RecordingBridge, RecordingProducer};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::MockDriver;
use futures_executor::LocalPool;
use futures_task::LocalSpawn;
use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;
use telenode::config::Config;
use telenode::core::{NodeId, Priority};
use telenode::data_types::NodeIdAllocationData;
use telenode::frame::{Data, DataSpecifier, Frame, Header};
use telenode::node::Node;
use telenode::params::{Key, Value};
use telenode::pnp::{NegotiationState, unique_id_hash};
use telenode::time::{Duration, Instant};
use telenode::trigger::Trigger;
use telenode_encoding::{Deserialize, Serialize};

const UNIQUE_ID: [u8; 16] = [0x5a; 16];
const ALLOCATOR_ID: NodeId = NodeId::new(1).unwrap();
const ALLOCATED_ID: NodeId = NodeId::new(42).unwrap();
const ANSWERED_REQUEST: usize = 3;
const STEP: Duration = Duration::from_millis(10);

type TestNode = Node<
    'static,
    CriticalSectionRawMutex,
    common::MockTransport,
    MemoryStore,
    RecordingBridge,
    RecordingProducer,
>;

#[derive(Debug, Clone, Copy)]
struct Outcome {
    requested: bool,
    state: Option<NegotiationState>,
    node_id: Option<NodeId>,
    balanced: bool,
}

/// Single FD frame carrying an allocation message from the allocator
fn allocation(unique_id_hash: u64, node_id: u16, transfer_id: u8) -> Frame {
    let mut data = [0; 12];
    NodeIdAllocationData {
        unique_id_hash,
        allocated_node_id: Some(node_id),
    }
    .serialize_to_bytes(&mut data[..NodeIdAllocationData::MAX_SIZE_BYTES]);
    data[11] = 0b1110_0000 | transfer_id;
    Frame::new(
        Header::message(
            Priority::Nominal,
            NodeIdAllocationData::SUBJECT,
            Some(ALLOCATOR_ID),
        ),
        Data::new(&data).unwrap(),
        Instant::now(),
    )
}

#[test]
fn test_plug_and_play_allocation() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();
    let time = MockDriver::get();

    let bus = Bus::default();
    let requests = Rc::new(RefCell::new(Vec::new()));
    {
        let requests = requests.clone();
        bus.set_responder(move |frame| {
            if frame.header.data_spec != DataSpecifier::Message(NodeIdAllocationData::SUBJECT) {
                return Vec::new();
            }
            assert_eq!(frame.header.source, None);
            assert_eq!(frame.header.priority, Priority::Slow);
            let request =
                NodeIdAllocationData::deserialize_from_bytes(&frame.data[..frame.data.len() - 1])
                    .unwrap();
            assert_eq!(request.allocated_node_id, None);

            let mut requests = requests.borrow_mut();
            requests.push(Instant::now());
            match requests.len() {
                // Allocation for some other node
                1 => std::vec![allocation(request.unique_id_hash ^ 1, 43, 1)],
                ANSWERED_REQUEST => std::vec![allocation(
                    request.unique_id_hash,
                    ALLOCATED_ID.into_u8().into(),
                    3,
                )],
                _ => Vec::new(),
            }
        });
    }

    let store = MemoryStore::default().with(Key::CanFdMode, Value::Natural8(1));
    let trigger = Box::leak(Box::new(Trigger::<CriticalSectionRawMutex>::new()));
    let bridge = RecordingBridge::default();
    let start = Instant::now();
    let node = Node::start(
        &mut bus.interface(),
        trigger,
        store,
        bridge.clone(),
        RecordingProducer::default(),
        Config::default().with_unique_id(UNIQUE_ID),
    )
    .unwrap();
    assert_eq!(node.node_id(), None);
    assert!(matches!(
        node.negotiation_state(),
        Some(NegotiationState::Unconfigured { .. })
    ));

    let outcome: &'static Cell<Option<Outcome>> = Box::leak(Box::new(Cell::new(None)));
    spawner
        .spawn_local_obj(Box::new(negotiate(node, outcome)).into())
        .unwrap();

    for _ in 0..1000 {
        executor.run_until_stalled();
        if outcome.get().is_some() {
            break;
        }
        time.advance(STEP);
    }

    let outcome = outcome.get().expect("negotiation did not finish");
    assert!(!outcome.requested);
    assert_eq!(outcome.node_id, Some(ALLOCATED_ID));
    assert_eq!(
        outcome.state,
        Some(NegotiationState::Allocated(ALLOCATED_ID))
    );
    assert!(outcome.balanced);
    assert!(bridge.log.borrow().processed.is_empty());

    // Requests follow the jitter sequence seeded by the unique-ID hash
    let requests = requests.borrow();
    assert_eq!(requests.len(), ANSWERED_REQUEST);
    let mut rng = fastrand::Rng::with_seed(unique_id_hash(&UNIQUE_ID));
    let mut scheduled = start + Duration::from_micros(rng.u64(0..1_000_000));
    for &sent in requests.iter() {
        assert!(sent >= scheduled);
        assert!(sent < scheduled + 2 * STEP);
        scheduled = sent + Duration::from_micros(rng.u64(0..1_000_000));
    }
}

async fn negotiate(mut node: TestNode, outcome: &'static Cell<Option<Outcome>>) {
    let requested = node.negotiate().await;
    let arena = node.arena_stats();
    outcome.set(Some(Outcome {
        requested,
        state: node.negotiation_state(),
        node_id: node.node_id(),
        balanced: arena.allocations == arena.frees,
    }));
}
