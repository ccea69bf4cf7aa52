//! Session context and the navigation routing gate.
//!
//! Every navigation runs through [`RoutingGate::decide`]: a single
//! synchronous decision fed by the session cookies and one TTL-gated read of
//! the maintenance flag. The session store is the explicit session-context
//! value the rest of the workspace threads through; nothing reads credentials
//! from ambient globals.

pub mod gate;
pub mod maintenance;
pub mod session;

pub use gate::{evaluate, paths, GateDecision, RoutingGate};
pub use maintenance::{maintenance_enabled, MaintenanceMonitor, MaintenanceProbe, MAINTENANCE_FLAG_KEY};
pub use session::{credential_from_cookies, SessionStore};
