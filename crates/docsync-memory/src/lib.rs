//! In-memory cluster implementing every backend port.
//!
//! Buckets, scopes, collections, scope-level and cluster-level search indexes
//! live behind one `parking_lot::Mutex`. Every port call is recorded, and any
//! operation can be made to fail, so the engine's reconciliation policy can
//! be exercised without a server. Vector search is brute-force cosine
//! similarity over the `embedding` field of the records an index covers.

mod cluster;
mod handles;
mod state;

pub use cluster::{MemoryCluster, MemoryConnector};
pub use state::{Call, IndexLocation, Op};
