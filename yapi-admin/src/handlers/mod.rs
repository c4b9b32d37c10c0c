pub mod api_keys;
pub mod bindings;
pub mod health;
pub mod login;
pub mod rules;
pub mod upstreams;
pub mod users;
