pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod jsonpath;
pub mod rule;
pub mod user;

pub use config::GatewayConfig;
pub use context::RequestContext;
pub use credential::{ApiKey, Binding, UpstreamCredential, UpstreamInfo};
pub use error::GatewayError;
pub use rule::{Action, Actions, Matcher, Rule};
pub use user::User;
