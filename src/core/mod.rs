// src/core/mod.rs

//! The central module containing the state store's core logic: the
//! coordination client wrapper, retry engine, fencing discipline, layout and
//! codec glue, and the recovery & mutation API built on top of them.

pub mod client;
pub mod errors;
pub mod fencing;
pub mod layout;
pub mod recovery;
pub mod retry;

pub use errors::StoreError;
pub use recovery::RmStateStore;
