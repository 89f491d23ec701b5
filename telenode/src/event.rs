//! Multiplexed wait over the node's event sources

use core::future::poll_fn;
use core::task::Poll;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Timer;

use crate::time::Duration;
use crate::transport::Transport;
use crate::trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Source {
    Transport = 0,
    Trigger = 1,
}

/// Set of sources that fired during a wait; empty after a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Readiness(u8);

impl Readiness {
    pub const NONE: Self = Self(0);

    pub const fn new_eq(source: Source) -> Self {
        Self(1 << source as u8)
    }

    pub const fn contains(&self, source: Source) -> bool {
        self.0 & Self::new_eq(source).0 != 0
    }

    pub const fn insert(&mut self, source: Source) {
        self.0 |= Self::new_eq(source).0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for Readiness {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Waits until the transport is readable or the trigger is signaled, whichever comes first,
/// but no longer than `timeout`. `None` waits without a bound.
///
/// Both sources are polled on every wake-up, so the result may contain both.
pub async fn wait_any<T: Transport, M: RawMutex>(
    transport: &mut T,
    trigger: &Trigger<M>,
    timeout: Option<Duration>,
) -> Readiness {
    let ready = poll_fn(|cx| {
        let mut readiness = Readiness::NONE;
        if transport.poll_readable(cx).is_ready() {
            readiness.insert(Source::Transport);
        }
        if trigger.poll_wait(cx).is_ready() {
            readiness.insert(Source::Trigger);
        }
        if readiness.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(readiness)
        }
    });

    match timeout {
        Some(timeout) => match select(ready, Timer::after(timeout)).await {
            Either::First(readiness) => readiness,
            Either::Second(()) => Readiness::NONE,
        },
        None => ready.await,
    }
}
