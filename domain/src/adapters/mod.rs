//! Adapters that live inside the domain crate for convenience.
//!
//! These are intended for unit testing, local demos and the `memory` storage
//! mode of the api-server. The durable adapter lives in its own crate.

pub mod memory_store;
