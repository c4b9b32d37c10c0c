//! Admin REST surface: rules, users, API keys, upstream credentials,
//! bindings, login, and health/metrics (spec.md §6).

pub mod handlers;
pub mod middleware;
pub mod persist;
pub mod server;

pub use server::{AdminServer, AdminState};
