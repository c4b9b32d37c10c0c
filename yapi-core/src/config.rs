//! Top-level gateway configuration: layered YAML + environment, following
//! the teacher's `figment` idiom (`ando-core/src/config.rs::AndoConfig`).

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration for yapi-gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Persistence DSN for the rule/user/key/credential/binding tables.
    /// `None` degrades to the in-memory rule store (spec.md §4.2/§6).
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Shared-KV + pub/sub config for the rule cache (spec.md §4.3). Absent
    /// endpoints degrade to local-only snapshot reload.
    #[serde(default)]
    pub shared_cache: SharedCacheConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// HTTP listener address for client traffic.
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Number of worker threads (0 = one per core).
    #[serde(default)]
    pub workers: usize,

    /// Default upstream target URL, used when no rule matches
    /// (spec.md §4.6 — disables `no-matching-rule` when set).
    #[serde(default)]
    pub default_upstream_url: Option<String>,

    /// Idle connections kept per upstream host in the connection pool.
    #[serde(default = "default_keepalive_pool_size")]
    pub keepalive_pool_size: usize,

    /// Idle-connection timeout in the pool (milliseconds).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// TLS handshake timeout to upstream (milliseconds).
    #[serde(default = "default_tls_handshake_timeout")]
    pub tls_handshake_timeout_ms: u64,

    /// Read-header timeout on the client listener (milliseconds).
    #[serde(default = "default_read_header_timeout")]
    pub read_header_timeout_ms: u64,

    /// Upstream connect timeout (milliseconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HMAC key used to sign admin session JWTs.
    #[serde(default)]
    pub jwt_signing_key: Option<String>,

    /// Basic-auth credentials for the admin surface (username, password
    /// hash), used when JWT login has not yet been exercised.
    #[serde(default)]
    pub basic_auth_username: Option<String>,
    #[serde(default)]
    pub basic_auth_password_hash: Option<String>,

    /// CORS allowed origins for the admin REST surface.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Connection string for the relational store. `None` → in-memory.
    #[serde(default)]
    pub dsn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedCacheConfig {
    /// etcd (or compatible) endpoints backing the shared rules snapshot and
    /// the `rules_changed` pub/sub channel. Empty → local-only.
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_rules_changed_channel")]
    pub rules_changed_channel: String,

    #[serde(default = "default_etcd_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub victoria_metrics: VictoriaMetricsConfig,
    #[serde(default)]
    pub victoria_logs: VictoriaLogsConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub pii_scrubbing: PiiScrubbingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VictoriaMetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VictoriaLogsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vl_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_log_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_log_flush_interval")]
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiScrubbingConfig {
    #[serde(default)]
    pub anonymize_ips: bool,
    #[serde(default)]
    pub scrub_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_mode")]
    pub mode: DeploymentMode,
    #[serde(default)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Shared-cache backed by etcd, persistence backed by the DSN.
    Standard,
    /// No etcd, no relational DSN — in-memory stores only.
    Standalone,
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::Standard
    }
}

impl GatewayConfig {
    /// Load configuration: YAML file (explicit path, or the first of a few
    /// default locations) merged under `YAPI_`-prefixed environment
    /// variables, double-underscore-delimited for nested fields.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        } else {
            for default_path in &["yapi.yaml", "/etc/yapi/yapi.yaml", "config/yapi.yaml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Yaml::file(default_path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("YAPI_").split("__"));

        let config: Self = figment.extract()?;
        Ok(config)
    }

    pub fn is_standalone(&self) -> bool {
        self.deployment.mode == DeploymentMode::Standalone
            || (self.shared_cache.endpoints.is_empty() && self.persistence.dsn.is_none())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            workers: 0,
            default_upstream_url: None,
            keepalive_pool_size: default_keepalive_pool_size(),
            idle_timeout_ms: default_idle_timeout(),
            tls_handshake_timeout_ms: default_tls_handshake_timeout(),
            read_header_timeout_ms: default_read_header_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            addr: default_admin_addr(),
            enabled: true,
            jwt_signing_key: None,
            basic_auth_username: None,
            basic_auth_password_hash: None,
            cors_origins: vec![],
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { dsn: None }
    }
}

impl Default for SharedCacheConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![],
            key_prefix: default_key_prefix(),
            rules_changed_channel: default_rules_changed_channel(),
            timeout_ms: default_etcd_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            victoria_metrics: VictoriaMetricsConfig::default(),
            victoria_logs: VictoriaLogsConfig::default(),
            prometheus: PrometheusConfig::default(),
            pii_scrubbing: PiiScrubbingConfig::default(),
        }
    }
}

impl Default for VictoriaMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_vm_endpoint(),
            push_interval_secs: default_push_interval(),
        }
    }
}

impl Default for VictoriaLogsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_vl_endpoint(),
            batch_size: default_log_batch_size(),
            flush_interval_secs: default_log_flush_interval(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl Default for PiiScrubbingConfig {
    fn default() -> Self {
        Self {
            anonymize_ips: false,
            scrub_headers: false,
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Standard,
            config_file: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            proxy: ProxyConfig::default(),
            admin: AdminConfig::default(),
            persistence: PersistenceConfig::default(),
            shared_cache: SharedCacheConfig::default(),
            observability: ObservabilityConfig::default(),
            deployment: DeploymentConfig::default(),
        }
    }
}

fn default_node_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_http_addr() -> SocketAddr {
    "0.0.0.0:9080".parse().unwrap()
}

fn default_admin_addr() -> SocketAddr {
    "127.0.0.1:9180".parse().unwrap()
}

fn default_keepalive_pool_size() -> usize {
    32
}

fn default_idle_timeout() -> u64 {
    90_000
}

fn default_tls_handshake_timeout() -> u64 {
    10_000
}

fn default_read_header_timeout() -> u64 {
    10_000
}

fn default_connect_timeout() -> u64 {
    6_000
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    200
}

fn default_key_prefix() -> String {
    "/yapi".to_string()
}

fn default_rules_changed_channel() -> String {
    "yapi/rules_changed".to_string()
}

fn default_etcd_timeout() -> u64 {
    5000
}

fn default_vm_endpoint() -> String {
    "http://127.0.0.1:8428/api/v1/write".to_string()
}

fn default_vl_endpoint() -> String {
    "http://127.0.0.1:9428/insert/jsonline".to_string()
}

fn default_push_interval() -> u64 {
    15
}

fn default_log_batch_size() -> usize {
    1000
}

fn default_log_flush_interval() -> u64 {
    5
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mode() -> DeploymentMode {
    DeploymentMode::Standard
}
