//! Couchbase Server backend over its HTTP services.
//!
//! Cluster management goes to the management port, KV reads and writes are
//! issued as N1QL statements against the query service, and search indexes
//! are managed and queried through the search service. Scope-level indexes
//! use the `/api/bucket/{bucket}/scope/{scope}` routes of Couchbase 7.6+.

mod cluster;
mod endpoints;
mod http;
mod kv;
mod search;

pub use cluster::RestConnector;
pub use endpoints::Endpoints;
