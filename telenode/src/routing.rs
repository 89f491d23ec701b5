//! Dispatch table for completed inbound transfers

use heapless::Vec;

use crate::config::ROUTE_CAPACITY;
use crate::frame::DataSpecifier;

/// Consumer of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    /// Plug-and-play allocation exchange, handled by the negotiator
    Allocation,
    /// Configuration service, handled by the bridge
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteError {
    Full,
    /// The port is already bound to a route
    Occupied,
}

/// Port to consumer bindings, built once at startup
#[derive(Debug, Default)]
pub struct Routes {
    entries: Vec<(DataSpecifier, Route), ROUTE_CAPACITY>,
}

impl Routes {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, data_spec: DataSpecifier, route: Route) -> Result<(), RouteError> {
        if self.route(data_spec).is_some() {
            return Err(RouteError::Occupied);
        }
        self.entries
            .push((data_spec, route))
            .map_err(|_| RouteError::Full)
    }

    pub fn route(&self, data_spec: DataSpecifier) -> Option<Route> {
        self.entries
            .iter()
            .find(|(port, _)| *port == data_spec)
            .map(|&(_, route)| route)
    }

    pub fn ports(&self) -> impl Iterator<Item = DataSpecifier> + '_ {
        self.entries.iter().map(|&(port, _)| port)
    }
}
