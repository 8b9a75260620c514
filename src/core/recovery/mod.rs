// src/core/recovery/mod.rs

//! Recovery & mutation API (C5): the entities persisted by the store and
//! the `RmStateStore` service that ties C1-C4 together.

pub mod store;
pub mod types;

pub use store::RmStateStore;
pub use types::{
    AmrmTokenSecretManagerState, ApplicationAttemptState, ApplicationState, DelegationKey,
    DelegationTokenRecord, RmState, Version,
};
