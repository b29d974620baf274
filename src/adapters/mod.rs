//! Adapters implementing the domain ports: scorer variants, backend
//! transports, and store implementations.

pub mod backends;
pub mod scorers;
pub mod store;
