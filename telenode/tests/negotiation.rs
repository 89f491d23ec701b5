mod common;

use common::{Bus, MemoryStore, RecordingBridge, RecordingProducer};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::MockDriver;
use futures_executor::LocalPool;
use futures_task::LocalSpawn;
use std::boxed::Box;
use std::vec::Vec;
use telenode::config::Config;
use telenode::core::{NodeId, Priority};
use telenode::data_types::NodeIdAllocationData;
use telenode::frame::{Data, DataSpecifier, Frame, Header};
use telenode::node::{Liveness, Runner};
use telenode::params::{Key, Value};
use telenode::time::{Duration, Instant};
use telenode::trigger::Trigger;
use telenode_encoding::{Deserialize, Serialize};

const UNIQUE_ID: [u8; 16] = [0xc3; 16];
const ALLOCATOR_ID: NodeId = NodeId::new(1).unwrap();
const ALLOCATED_ID: NodeId = NodeId::new(42).unwrap();
const STEP: Duration = Duration::from_millis(10);

type TestRunner = Runner<
    'static,
    CriticalSectionRawMutex,
    common::MockInterface,
    MemoryStore,
    RecordingBridge,
    RecordingProducer,
>;

fn count_on(frames: &[Frame], subject: u16) -> usize {
    frames
        .iter()
        .filter(|frame| {
            matches!(frame.header.data_spec,
                DataSpecifier::Message(s) if s.into_u16() == subject)
        })
        .count()
}

/// Single FD frame carrying an allocation message from the allocator
fn allocation(unique_id_hash: u64, node_id: u16) -> Frame {
    let mut data = [0; 12];
    NodeIdAllocationData {
        unique_id_hash,
        allocated_node_id: Some(node_id),
    }
    .serialize_to_bytes(&mut data[..NodeIdAllocationData::MAX_SIZE_BYTES]);
    data[11] = 0b1110_0000;
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
fn test_anonymous_runner_publishes_after_allocation() {
    let mut executor = LocalPool::new();
    let spawner = executor.spawner();
    let time = MockDriver::get();

    let bus = Bus::default();
    bus.set_responder(|frame| {
        if frame.header.data_spec != DataSpecifier::Message(NodeIdAllocationData::SUBJECT) {
            return Vec::new();
        }
        let request =
            NodeIdAllocationData::deserialize_from_bytes(&frame.data[..frame.data.len() - 1])
                .unwrap();
        std::vec![allocation(
            request.unique_id_hash,
            ALLOCATED_ID.into_u8().into()
        )]
    });

    let trigger: &'static Trigger<CriticalSectionRawMutex> = Box::leak(Box::new(Trigger::new()));
    let liveness: &'static Liveness = Box::leak(Box::new(Liveness::new()));
    let runner = Runner::new(
        bus.interface(),
        trigger,
        liveness,
        MemoryStore::default().with(Key::CanFdMode, Value::Natural8(1)),
        RecordingBridge::default(),
        RecordingProducer::default(),
        Config::default().with_unique_id(UNIQUE_ID),
    );
    spawner
        .spawn_local_obj(Box::new(run(runner)).into())
        .unwrap();

    executor.run_until_stalled();
    assert_eq!(bus.opened(), None);

    // Started, but still anonymous
    trigger.signal();
    executor.run_until_stalled();
    assert!(bus.opened().is_some());
    assert!(!liveness.is_running());
    assert!(bus.sent().is_empty());

    // A trigger while negotiating is held for the first steady tick
    trigger.signal();
    executor.run_until_stalled();
    assert!(!liveness.is_running());

    for _ in 0..200 {
        if liveness.is_running() {
            break;
        }
        time.advance(STEP);
        executor.run_until_stalled();
    }
    assert!(liveness.is_running());

    let sent = bus.sent();
    assert_eq!(count_on(&sent, NodeIdAllocationData::SUBJECT.into_u16()), 1);
    assert_eq!(sent[0].header.source, None);

    // One tick worth of telemetry from the allocated node-ID
    let telemetry: Vec<Frame> = sent[1..].to_vec();
    assert_eq!(count_on(&telemetry, 4096), 1);
    assert_eq!(count_on(&telemetry, 4097), 1);
    assert!(
        telemetry
            .iter()
            .all(|frame| frame.header.source == Some(ALLOCATED_ID))
    );
}

async fn run(runner: TestRunner) {
    let _ = runner.run().await;
}
