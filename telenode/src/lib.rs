//! # Telenode
//!
//! This library is the runtime of a telemetry node on a Cyphal/CAN bus \[1\] for no_std
//! environments. The node periodically publishes telemetry records, claims its node-ID through
//! plug-and-play allocation when none is configured and lets peers move its publication
//! subjects through configuration registers. All memory is statically sized.
//!
//! ## Architecture
//!
//! ```text
//!              ┌─────────┐
//!   signal ───►│ Trigger ├──────────┐
//!              └─────────┘          ▼
//! ┌───────────┐  frames   ┌──────────────────┐  records  ┌──────────┐
//! │ Transport │◄─────────►│       Node       │◄──────────┤ Producer │
//! └───────────┘           │ ┌──────────────┐ │           └──────────┘
//!                         │ │  TX queue    │ │  values   ┌──────────┐
//!                         │ │  Arena       │ │◄─────────►│  Store   │
//!                         │ │  Reassembler │ │           └──────────┘
//!                         │ │  Routes      │ │  requests ┌──────────┐
//!                         │ │  Scheduler   │ ├──────────►│  Bridge  │
//!                         │ │  Negotiator  │ │           └──────────┘
//!                         │ └──────────────┘ │
//!                         └──────────────────┘
//! ```
//! Components:
//! * _Node_ owns the protocol state and runs the outbound queue pump.
//! * _Runner_ is the node task. It waits for the first trigger, starts the node, negotiates a
//!   node-ID if needed, and then alternates publication ticks with pump cycles.
//! * _Trigger_ is the only cross-context primitive. The host signals it to request a publish.
//! * _Transport_ is the CAN transceiver, polled for readiness and driven without blocking.
//! * _Producer_ serializes telemetry records on demand.
//! * _Store_ supplies configuration and telemetry inputs, each with a documented default.
//! * _Bridge_ answers register requests from peers.
//!
//! ## Concurrency model
//!
//! The node is a single cooperative task and blocks only while waiting for the transport or
//! the trigger, with a bounded timeout. Everything except the trigger is owned by the task.
//!
//! # References:
//!
//! * \[1\] Cyphal Specification v1.0
//!   <https://opencyphal.org/specification/Cyphal_Specification.pdf>
#![no_std]

pub use telenode_core as core;
pub use telenode_driver::{can_id, frame, time, transport};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod arena;
pub mod bridge;
pub mod config;
pub mod data_types;
pub mod event;
pub mod node;
pub mod params;
pub mod pnp;
pub mod queue;
pub mod reassembly;
pub mod routing;
pub mod schedule;
pub mod telemetry;
mod transfer;
pub mod trigger;
