//! monoio-based streaming reverse-proxy data plane: request parsing,
//! auth/match/authorize/mutate pipeline dispatch, and upstream streaming.

pub mod authorizer;
pub mod connection;
pub mod matcher;
pub mod proxy;
pub mod worker;

pub use worker::{spawn_workers, SharedState};
