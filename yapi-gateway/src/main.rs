// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  yapi-gateway — LLM API reverse-proxy gateway
//
//  Architecture: monoio thread-per-core + shared-nothing data plane
//  Admin API:    axum on a dedicated tokio thread
//  Config:       standalone YAML / etcd with watch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use yapi_admin::server::{AdminServer, AdminState};
use yapi_auth::CredentialResolver;
use yapi_core::config::GatewayConfig;
use yapi_observability::MetricsCollector;
use yapi_proxy::worker::{self, SharedState};
use yapi_store::event_bus::{EventBus, LocalEventBus};
use yapi_store::rule_store::{InMemoryRuleStore, RuleStore};
use yapi_store::{
    InMemoryApiKeyStore, InMemoryBindingStore, InMemoryUpstreamCredentialStore, InMemoryUserStore,
    RuleCacheService,
};

/// Global shutdown flag — checked by signal handler.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "yapi-gateway", version, about = "yapi-gateway — LLM API reverse-proxy gateway")]
struct Cli {
    /// Path to the YAML config file. Falls back to `yapi.yaml`,
    /// `/etc/yapi/yapi.yaml`, `config/yapi.yaml` when unset.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to the JSON state file used for standalone-mode persistence
    /// (rules, users, api keys, upstream credentials, bindings). Written by
    /// the admin API and reloaded on restart. Ignored when a relational
    /// `persistence.dsn` is configured.
    #[arg(long, default_value = "data/yapi-state.json")]
    state_file: PathBuf,
}

/// Everything one worker thread and the admin thread both need a handle to.
struct Bootstrap {
    config: Arc<GatewayConfig>,
    rule_cache: Arc<RuleCacheService>,
    resolver: Arc<CredentialResolver>,
    metrics: Option<Arc<MetricsCollector>>,
    admin_state: Arc<AdminState>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "yapi-gateway starting — monoio thread-per-core engine"
    );

    // ── Config ──
    let config = match &cli.config {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "loading config file");
            GatewayConfig::load(path.to_str())?
        }
        Some(path) => {
            info!(path = %path.display(), "config file not found, using defaults");
            GatewayConfig::default()
        }
        None => GatewayConfig::load(None).unwrap_or_else(|_| GatewayConfig::default()),
    };
    let config = Arc::new(config);

    // Bootstrap (etcd connect, snapshot load, state-file restore) plus the
    // event-bus subscriber / etcd watch loop / metrics push loop it spawns
    // all need a live tokio runtime for the life of the process — a
    // runtime built and dropped before `bootstrap()` returns would cancel
    // every task it spawned. So this lives on its own dedicated thread,
    // alongside (not instead of) the monoio worker threads and the admin
    // thread: `main` itself still owns no runtime.
    let (bootstrap_tx, bootstrap_rx) = std::sync::mpsc::channel();
    let control_config = Arc::clone(&config);
    let control_state_file = cli.state_file.clone();
    std::thread::Builder::new()
        .name("yapi-control".to_string())
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build tokio runtime for control thread");

            rt.block_on(async move {
                let result = bootstrap(control_config, control_state_file).await;
                let failed = result.is_err();
                let _ = bootstrap_tx.send(result);
                if failed {
                    return;
                }
                // Keep driving the subscriber/watch-loop/push-loop tasks
                // bootstrap() spawned for as long as the process runs.
                std::future::pending::<()>().await;
            });
        })
        .expect("failed to spawn control thread");

    let bootstrap = bootstrap_rx
        .recv()
        .expect("control thread exited before sending its bootstrap result")?;

    // ── Start admin API on a dedicated tokio thread ──
    let admin_config = bootstrap.config.admin.clone();
    if admin_config.enabled {
        let admin_state = Arc::clone(&bootstrap.admin_state);
        std::thread::Builder::new()
            .name("yapi-admin".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build tokio runtime for admin");

                rt.block_on(async {
                    if let Err(e) = AdminServer::new(admin_state).start().await {
                        tracing::error!(error = %e, "admin API failed");
                    }
                });
            })
            .expect("failed to spawn admin thread");

        info!(addr = %admin_config.addr, "admin API started");
    }

    // ── Spawn monoio worker threads ──
    let shared = SharedState::new(
        Arc::clone(&bootstrap.config),
        Arc::clone(&bootstrap.rule_cache),
        Arc::clone(&bootstrap.resolver),
        bootstrap.metrics.clone(),
    );
    let worker_handles = worker::spawn_workers(Arc::clone(&shared));

    info!(
        proxy_addr = %bootstrap.config.proxy.http_addr,
        admin_addr = %admin_config.addr,
        "yapi-gateway is ready — serving traffic"
    );

    // ── Graceful shutdown: wait for SIGTERM/SIGINT ──
    setup_signal_handler();

    while !SHUTDOWN.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    info!("shutdown signal received, stopping...");

    // Worker threads run an infinite accept loop; the OS reclaims them on
    // process exit. Future improvement: per-worker shutdown notification.
    drop(worker_handles);

    info!("yapi-gateway stopped");
    Ok(())
}

/// Construct every async-initialized collaborator: the rule store tier,
/// shared cache + event bus (spec.md §4.2/§4.3/§6), account stores, the
/// credential resolver, metrics, and the standalone-mode state restore.
async fn bootstrap(config: Arc<GatewayConfig>, state_file: PathBuf) -> anyhow::Result<Bootstrap> {
    let standalone = config.is_standalone();

    let (rule_store, shared_snapshot, event_bus): (
        Arc<dyn RuleStore>,
        Option<Arc<dyn yapi_store::service::SharedSnapshotStore>>,
        Arc<dyn EventBus>,
    ) = if standalone {
        info!("standalone deployment: in-memory rule store, local event bus");
        (
            Arc::new(InMemoryRuleStore::new()),
            None,
            Arc::new(LocalEventBus::new()),
        )
    } else {
        build_etcd_backed_store(&config).await?
    };

    let rule_cache = Arc::new(RuleCacheService::new(
        rule_store,
        Arc::clone(&event_bus),
        shared_snapshot,
    ));
    rule_cache.load_or_init().await?;

    let subscriber_rx = event_bus.subscribe();
    let subscriber_cache = Arc::clone(&rule_cache);
    tokio::spawn(yapi_store::service::run_subscriber(subscriber_cache, subscriber_rx));

    // ── Account stores (spec.md §3) — in-memory; a real deployment backs
    //    these with `persistence.dsn` without touching callers. ──
    let users: Arc<dyn yapi_store::UserStore> = Arc::new(InMemoryUserStore::new());
    let api_keys: Arc<dyn yapi_store::ApiKeyStore> = Arc::new(InMemoryApiKeyStore::new());
    let upstreams: Arc<dyn yapi_store::UpstreamCredentialStore> =
        Arc::new(InMemoryUpstreamCredentialStore::new());
    let bindings: Arc<dyn yapi_store::BindingStore> = Arc::new(InMemoryBindingStore::new());

    let resolver = Arc::new(CredentialResolver::new(
        Arc::clone(&api_keys),
        Arc::clone(&users),
        Arc::clone(&bindings),
        Arc::clone(&upstreams),
    ));

    let metrics: Option<Arc<MetricsCollector>> = if config.observability.prometheus.enabled {
        match MetricsCollector::new() {
            Ok(m) => Some(Arc::new(m)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to initialize metrics collector, metrics disabled");
                None
            }
        }
    } else {
        None
    };

    #[cfg(feature = "victoria")]
    if let Some(metrics) = &metrics {
        if config.observability.victoria_metrics.enabled {
            Arc::clone(metrics).start_push_loop(config.observability.victoria_metrics.clone());
        }
    }

    let admin_state = Arc::new(AdminState {
        config: config.admin.clone(),
        rule_cache: Arc::clone(&rule_cache),
        users: Arc::clone(&users),
        api_keys: Arc::clone(&api_keys),
        upstreams: Arc::clone(&upstreams),
        bindings: Arc::clone(&bindings),
        resolver: Arc::clone(&resolver),
        metrics: metrics.clone(),
        state_file: standalone.then(|| state_file.clone()),
    });

    if standalone {
        yapi_admin::persist::load_state(&state_file, &admin_state).await;
    }

    Ok(Bootstrap {
        config,
        rule_cache,
        resolver,
        metrics,
        admin_state,
    })
}

#[cfg(feature = "etcd")]
async fn build_etcd_backed_store(
    config: &GatewayConfig,
) -> anyhow::Result<(
    Arc<dyn RuleStore>,
    Option<Arc<dyn yapi_store::service::SharedSnapshotStore>>,
    Arc<dyn EventBus>,
)> {
    let endpoints = &config.shared_cache.endpoints;
    let prefix = &config.shared_cache.key_prefix;
    let client = etcd_client::Client::connect(endpoints, None).await?;

    let store = Arc::new(yapi_store::etcd_store::EtcdRuleStore::connect(endpoints, prefix).await?);
    let snapshot = Arc::new(yapi_store::etcd_store::EtcdSnapshotStore::new(
        client.clone(),
        prefix,
    ));
    let bus = Arc::new(
        yapi_store::etcd_store::EtcdEventBus::new(
            client,
            config.shared_cache.rules_changed_channel.clone(),
        )
        .await?,
    );

    let watch_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        if let Err(e) = watch_bus.run_watch_loop().await {
            tracing::warn!(error = %e, "etcd rules_changed watch loop exited");
        }
    });

    Ok((
        store,
        Some(snapshot) as Option<Arc<dyn yapi_store::service::SharedSnapshotStore>>,
        bus as Arc<dyn EventBus>,
    ))
}

#[cfg(not(feature = "etcd"))]
async fn build_etcd_backed_store(
    _config: &GatewayConfig,
) -> anyhow::Result<(
    Arc<dyn RuleStore>,
    Option<Arc<dyn yapi_store::service::SharedSnapshotStore>>,
    Arc<dyn EventBus>,
)> {
    tracing::warn!(
        "shared_cache.endpoints configured but the `etcd` feature is disabled; \
         falling back to a local, in-memory rule store"
    );
    Ok((
        Arc::new(InMemoryRuleStore::new()),
        None,
        Arc::new(LocalEventBus::new()),
    ))
}

fn setup_signal_handler() {
    // SIGTERM (docker stop) + SIGINT (Ctrl+C)
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, signal_handler as libc::sighandler_t);
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
