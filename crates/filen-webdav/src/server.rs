//! HTTP(S) listener and server lifecycle.
//!
//! Startup: wipe and recreate the scratch directory, load or generate the
//! TLS certificate when HTTPS is on, bind, accept. Each connection is
//! registered by uuid so `stop(terminate = true)` can destroy lingering
//! sockets; a plain `stop` drains handlers first.

use crate::auth::Authenticator;
use crate::certs;
use crate::config::{ServerConfig, Tenancy};
use crate::error::{WebDavError, WebDavResult};
use crate::handlers;
use crate::rate_limit::RateLimiter;
use crate::state::{PerUserState, UserRegistry};
use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared per-process state handed to every request.
pub struct Gateway {
    pub config: ServerConfig,
    pub auth: Authenticator,
    pub registry: Arc<UserRegistry>,
    pub limiter: RateLimiter,
    scratch_dir: PathBuf,
    scratch_globs: GlobSet,
}

impl Gateway {
    /// Absolute path of a scratch file by id.
    pub fn scratch_path(&self, temp_disk_id: &str) -> PathBuf {
        self.scratch_dir.join(temp_disk_id)
    }

    /// Whether a request path matches the sidecar glob list, by full path or
    /// by file name.
    pub fn matches_scratch(&self, path: &str) -> bool {
        if self.scratch_globs.is_empty() {
            return false;
        }
        self.scratch_globs.is_match(path.trim_start_matches('/'))
            || self.scratch_globs.is_match(crate::paths::base_name(path))
    }
}

/// A running WebDAV gateway.
pub struct WebDavServer {
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    connections: Arc<DashMap<Uuid, AbortHandle>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    accept_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WebDavServer {
    /// Start serving. Binds immediately; the returned handle owns the accept
    /// loop.
    pub async fn start(config: ServerConfig, tenancy: Tenancy) -> WebDavResult<Self> {
        tenancy.validate(&config)?;

        let registry = UserRegistry::new();
        if let Tenancy::Single {
            username, client, ..
        } = &tenancy
        {
            registry.insert(PerUserState::new(username.clone(), Arc::clone(client)));
        }

        // The scratch tier starts empty: stale plaintext from a previous run
        // must not resurface.
        let scratch_dir = config.temp_disk_dir();
        if tokio::fs::metadata(&scratch_dir).await.is_ok() {
            tokio::fs::remove_dir_all(&scratch_dir).await?;
        }
        tokio::fs::create_dir_all(&scratch_dir).await?;

        let mut globs = GlobSetBuilder::new();
        for pattern in &config.temp_files_to_store_on_disk {
            let glob = Glob::new(pattern).map_err(|e| {
                WebDavError::Internal(format!("invalid scratch glob {pattern}: {e}"))
            })?;
            globs.add(glob);
        }
        let scratch_globs = globs
            .build()
            .map_err(|e| WebDavError::Internal(format!("scratch glob set: {e}")))?;

        let tls = if config.https {
            let bundle = certs::load_or_generate(&config.resolved_config_dir()).await?;
            Some(certs::tls_acceptor(&bundle)?)
        } else {
            None
        };

        let listener = TcpListener::bind((config.hostname.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, https = config.https, "starting WebDAV gateway");

        let limiter = RateLimiter::new(&config.rate_limit);
        let auth = Authenticator::new(config.auth_mode, tenancy, Arc::clone(&registry));
        let gateway = Arc::new(Gateway {
            config,
            auth,
            registry,
            limiter,
            scratch_dir,
            scratch_globs,
        });

        let connections: Arc<DashMap<Uuid, AbortHandle>> = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let accept_gateway = Arc::clone(&gateway);
        let accept_connections = Arc::clone(&connections);
        let accept_handle = tokio::spawn(async move {
            tokio::select! {
                () = accept_loop(listener, accept_gateway, accept_connections, tls) => {
                    debug!("accept loop ended");
                }
                _ = shutdown_rx => {
                    info!("received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr,
            gateway,
            connections,
            shutdown_tx: Some(shutdown_tx),
            accept_handle: Some(accept_handle),
        })
    }

    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients mount.
    pub fn url(&self) -> String {
        let scheme = if self.gateway.config.https { "https" } else { "http" };
        format!("{scheme}://{}", self.addr)
    }

    /// Stop accepting and wind down. With `terminate` the remaining
    /// connections are destroyed; otherwise handlers drain first.
    pub async fn stop(mut self, terminate: bool) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.await;
        }

        if terminate {
            for entry in self.connections.iter() {
                entry.value().abort();
            }
            self.connections.clear();
        } else {
            while !self.connections.is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        info!("WebDAV gateway stopped");
    }

    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.accept_handle.take() {
            handle.abort();
        }
        for entry in self.connections.iter() {
            entry.value().abort();
        }
        self.connections.clear();
    }
}

impl Drop for WebDavServer {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

async fn accept_loop(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    connections: Arc<DashMap<Uuid, AbortHandle>>,
    tls: Option<TlsAcceptor>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let gateway = Arc::clone(&gateway);
                let connections = Arc::clone(&connections);
                let tls = tls.clone();
                let conn_id = Uuid::new_v4();

                let task = tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls_stream) => serve_connection(tls_stream, gateway, peer).await,
                            Err(e) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
                        },
                        None => serve_connection(stream, gateway, peer).await,
                    }
                });
                connections.insert(conn_id, task.abort_handle());

                let connections = Arc::clone(&connections);
                tokio::spawn(async move {
                    let _ = task.await;
                    connections.remove(&conn_id);
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn serve_connection<I>(io: I, gateway: Arc<Gateway>, peer: SocketAddr)
where
    I: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let gateway = Arc::clone(&gateway);
        async move {
            let resp = handlers::dispatch(&gateway, req, peer).await;
            Ok::<_, Infallible>(resp)
        }
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        // Clients tearing down mid-stream is routine for WebDAV mounts.
        warn!(peer = %peer, error = %e, "HTTP connection error");
    }
}
