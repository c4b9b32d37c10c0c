pub mod access_log;
pub mod audit_file_writer;
pub mod audit_log;
pub mod pii_scrubber;

#[cfg(feature = "prometheus")]
pub mod metrics;

#[cfg(feature = "prometheus")]
pub mod prometheus_exporter;

#[cfg(feature = "victoria")]
pub mod logger;

#[cfg(feature = "prometheus")]
pub use metrics::MetricsCollector;
pub use pii_scrubber::{anonymize_ip, scrub_header, scrub_uri};
