pub mod admin_auth;
pub mod middleware;
pub mod resolver;

pub use middleware::{authenticate, extract_candidate_key, AuthOutcome};
pub use resolver::{parse_raw_key, CredentialResolver, RawKey};
