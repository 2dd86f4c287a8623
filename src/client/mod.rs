//! Client-side netcode: connection state, prediction and smoothing

pub mod connection;
pub mod interpolation;
pub mod net_sync;

pub use connection::{ClientError, ClientTransport, NetClient, NetEvent};
pub use interpolation::RemoteInterpolator;
pub use net_sync::{FixedTimestep, NetSync, Reconciliation, SyncConfig};
