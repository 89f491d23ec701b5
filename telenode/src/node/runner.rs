use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::bridge::ConfigBridge;
use crate::config::Config;
use crate::node::{Node, StartupError};
use crate::params::ParameterStore;
use crate::telemetry::RecordProducer;
use crate::time::Instant;
use crate::transport::Interface;
use crate::trigger::Trigger;

/// Task liveness flag shared with the host
///
/// Set once the node has started and holds a node-ID; cleared if startup fails.
#[derive(Debug, Default)]
pub struct Liveness(AtomicBool);

impl Liveness {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, running: bool) {
        self.0.store(running, Ordering::Release)
    }
}

/// The node task
///
/// Waits for the first trigger, starts the node, negotiates a node-ID if needed and then
/// alternates publication ticks with pump cycles forever.
pub struct Runner<'a, M, I, S, B, P>
where
    M: RawMutex,
    I: Interface,
    S: ParameterStore,
    B: ConfigBridge,
    P: RecordProducer,
{
    interface: I,
    trigger: &'a Trigger<M>,
    liveness: &'a Liveness,
    store: S,
    bridge: B,
    producer: P,
    config: Config,
}

impl<'a, M, I, S, B, P> Runner<'a, M, I, S, B, P>
where
    M: RawMutex,
    I: Interface,
    S: ParameterStore,
    B: ConfigBridge,
    P: RecordProducer,
{
    pub fn new(
        interface: I,
        trigger: &'a Trigger<M>,
        liveness: &'a Liveness,
        store: S,
        bridge: B,
        producer: P,
        config: Config,
    ) -> Self {
        Self {
            interface,
            trigger,
            liveness,
            store,
            bridge,
            producer,
            config,
        }
    }

    /// Runs the task. Returns only if the node cannot start.
    pub async fn run(mut self) -> Result<Infallible, StartupError> {
        let mut publish = self.trigger.wait().await > 0;

        let steady_wait = self.config.steady_wait;
        let mut node = Node::start(
            &mut self.interface,
            self.trigger,
            self.store,
            self.bridge,
            self.producer,
            self.config,
        )
        .inspect_err(|err| {
            error!("node startup failed: {:?}", err);
            self.liveness.set(false);
        })?;

        publish |= node.negotiate().await;
        self.liveness.set(true);

        loop {
            if publish {
                node.tick(Instant::now());
            }
            publish = node.pump(Some(steady_wait)).await;
        }
    }
}
