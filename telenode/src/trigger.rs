//! Publish request channel
//!
//! The host signals the trigger whenever fresh telemetry should be published. The node task
//! treats it as a second readiness source next to the transport.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::waitqueue::WakerRegistration;

struct State {
    pending: u32,
    waker: WakerRegistration,
}

/// Counting cross-context signal
///
/// `signal` may be called from any context that can lock `M`, e.g. an interrupt handler with
/// `CriticalSectionRawMutex`. Signals are counted, not queued: `take` returns how many arrived
/// since the previous `take`.
pub struct Trigger<M: RawMutex> {
    state: Mutex<M, RefCell<State>>,
}

impl<M: RawMutex> Trigger<M> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                pending: 0,
                waker: WakerRegistration::new(),
            })),
        }
    }

    pub fn signal(&self) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.pending = state.pending.saturating_add(1);
            state.waker.wake();
        })
    }

    /// Resolves while at least one signal is pending. Does not consume the signal.
    pub fn poll_wait(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.pending > 0 {
                Poll::Ready(())
            } else {
                state.waker.register(cx.waker());
                Poll::Pending
            }
        })
    }

    /// Consumes pending signals and returns their count.
    pub fn take(&self) -> u32 {
        self.state
            .lock(|state| core::mem::take(&mut state.borrow_mut().pending))
    }

    /// Waits for at least one signal and consumes all pending ones.
    pub async fn wait(&self) -> u32 {
        poll_fn(|cx| self.poll_wait(cx)).await;
        self.take()
    }
}

impl<M: RawMutex> Default for Trigger<M> {
    fn default() -> Self {
        Self::new()
    }
}
