//! Shared proxy state and the thread-per-core worker loop.
//!
//! Grounded on `ando-proxy/src/worker.rs`'s `SharedState`/`spawn_workers`
//! idiom: one monoio runtime per thread, each with its own listener and
//! connection pool; the `ArcSwap<Router>` the teacher swapped per-thread is
//! replaced by `yapi_store::RuleCacheService`'s own lock-free snapshot,
//! which every worker thread reads directly rather than caching locally.

use crate::proxy::ConnPool;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, info};
use yapi_auth::CredentialResolver;
use yapi_core::config::GatewayConfig;
use yapi_observability::MetricsCollector;
use yapi_store::RuleCacheService;

/// State shared by every worker thread. Everything here is already
/// internally synchronized (`RuleCacheService` via `arc-swap`, the account
/// stores behind `Arc<dyn Trait>`), so a plain `Arc<SharedState>` — not a
/// per-thread `ArcSwap` — is enough.
pub struct SharedState {
    pub config: Arc<GatewayConfig>,
    pub rule_cache: Arc<RuleCacheService>,
    pub resolver: Arc<CredentialResolver>,
    pub metrics: Option<Arc<MetricsCollector>>,
}

impl SharedState {
    pub fn new(
        config: Arc<GatewayConfig>,
        rule_cache: Arc<RuleCacheService>,
        resolver: Arc<CredentialResolver>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            rule_cache,
            resolver,
            metrics,
        })
    }
}

/// Spawn monoio worker threads — one per core by default (`proxy.workers ==
/// 0`), each running an independent runtime, listener, and connection pool.
pub fn spawn_workers(shared: Arc<SharedState>) -> Vec<std::thread::JoinHandle<()>> {
    let num_workers = match shared.config.proxy.workers {
        0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    };
    let listen_addr = shared.config.proxy.http_addr;
    let mut handles = Vec::with_capacity(num_workers);

    for worker_id in 0..num_workers {
        let shared = Arc::clone(&shared);

        let handle = std::thread::Builder::new()
            .name(format!("yapi-worker-{worker_id}"))
            .spawn(move || {
                let mut rt = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
                    .enable_all()
                    .build()
                    .expect("failed to build monoio runtime");

                rt.block_on(worker_loop(worker_id, shared, listen_addr));
            })
            .expect("failed to spawn worker thread");

        handles.push(handle);
    }

    info!(workers = num_workers, addr = %listen_addr, "proxy workers spawned");
    handles
}

async fn worker_loop(worker_id: usize, shared: Arc<SharedState>, addr: std::net::SocketAddr) {
    use monoio::net::TcpListener;

    let listener = TcpListener::bind(addr).unwrap_or_else(|e| {
        panic!("worker {worker_id} failed to bind to {addr}: {e}");
    });

    info!(worker = worker_id, %addr, "worker listening");

    let pool_size = shared.config.proxy.keepalive_pool_size;
    let conn_pool = Rc::new(RefCell::new(ConnPool::new(pool_size)));

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let _ = stream.set_nodelay(true);

                let shared = Arc::clone(&shared);
                let pool = Rc::clone(&conn_pool);

                monoio::spawn(async move {
                    if let Err(e) =
                        crate::connection::handle_connection(stream, peer_addr, shared, pool).await
                    {
                        tracing::debug!(error = %e, "connection closed");
                    }
                });
            }
            Err(e) => {
                error!(worker = worker_id, error = %e, "accept error");
            }
        }
    }
}
