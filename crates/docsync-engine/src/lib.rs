#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod connection;
pub mod index;
pub mod query;
pub mod store;
pub mod sync;
pub mod topology;

pub use index::{IndexLifecycle, IndexState, SearchTier};
pub use store::DocumentStore;
pub use topology::ResolvedCollection;
