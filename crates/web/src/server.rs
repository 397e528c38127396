//! Server assembly and the dispatcher accept loop.
//!
//! [`ServerBuilder`] collects the route table, the collaborators and the
//! configuration; [`Server::start`] binds, spawns the accept loop and
//! hands filtered connections to the executor, where each task acquires a
//! worker, runs the pipeline and releases the worker again on every path.
//! [`ServerHandle::shutdown`] stops the intake and drains in-flight work.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::FmtSubscriber;

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::config::ServerConfig;
use crate::executor::Executor;
use crate::filter::{ConnectionFilter, FilterChain, connected};
use crate::procedure::ProcedureChain;
use crate::router::Router;
use crate::session::{MemorySessionProvider, SessionProvider};
use crate::worker::{PoolError, Worker, WorkerPool};

/// Shared, read-only state handed to the dispatcher and every worker at
/// construction time.
///
/// Built before the server starts accepting connections and never mutated
/// afterwards, so workers read it without synchronization.
pub struct ServerContext {
    router: Router,
    cache: Box<dyn CacheStore>,
    sessions: Box<dyn SessionProvider>,
    procedures: ProcedureChain,
    config: ServerConfig,
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ServerContext {
    pub fn new(
        router: Router,
        cache: Box<dyn CacheStore>,
        sessions: Box<dyn SessionProvider>,
        procedures: ProcedureChain,
        config: ServerConfig,
    ) -> Self {
        Self { router, cache, sessions, procedures, config }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub fn sessions(&self) -> &dyn SessionProvider {
        self.sessions.as_ref()
    }

    pub fn procedures(&self) -> &ProcedureChain {
        &self.procedures
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,

    #[error("address must be set")]
    MissingAddress,

    #[error("invalid address: {source}")]
    InvalidAddress { source: io::Error },

    #[error("worker count must be positive")]
    NoWorkers,

    #[error("executor thread count must be positive")]
    NoExecutorThreads,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {address:?}: {source}")]
    Bind { address: Vec<SocketAddr>, source: io::Error },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub struct ServerBuilder {
    address: Option<Result<Vec<SocketAddr>, io::Error>>,
    router: Option<Router>,
    cache: Option<Box<dyn CacheStore>>,
    sessions: Option<Box<dyn SessionProvider>>,
    procedures: ProcedureChain,
    filters: FilterChain,
    config: ServerConfig,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            address: None,
            router: None,
            cache: None,
            sessions: None,
            procedures: ProcedureChain::empty(),
            // the liveness check every connection should pass
            filters: FilterChain::new().with(connected()),
            config: ServerConfig::default(),
        }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(|addrs| addrs.collect()));
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Replaces the default in-memory cache store.
    pub fn cache(mut self, cache: impl CacheStore + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Replaces the default in-memory session provider.
    pub fn session_provider(mut self, sessions: impl SessionProvider + 'static) -> Self {
        self.sessions = Some(Box::new(sessions));
        self
    }

    pub fn procedures(mut self, procedures: ProcedureChain) -> Self {
        self.procedures = procedures;
        self
    }

    /// Appends a connection filter to the chain.
    pub fn filter(mut self, filter: impl ConnectionFilter + 'static) -> Self {
        self.filters = self.filters.with(filter);
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = match self.address {
            Some(Ok(address)) if !address.is_empty() => address,
            Some(Ok(_)) | None => return Err(ServerBuildError::MissingAddress),
            Some(Err(source)) => return Err(ServerBuildError::InvalidAddress { source }),
        };
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        if self.config.workers == 0 {
            return Err(ServerBuildError::NoWorkers);
        }
        if self.config.executor_threads == 0 {
            return Err(ServerBuildError::NoExecutorThreads);
        }

        let cache = self.cache.unwrap_or_else(|| Box::new(MemoryCacheStore::new()));
        let sessions = self.sessions.unwrap_or_else(|| Box::new(MemorySessionProvider::new()));
        let context = ServerContext::new(router, cache, sessions, self.procedures, self.config);

        Ok(Server { address, filters: Arc::new(self.filters), context: Arc::new(context) })
    }
}

pub struct Server {
    address: Vec<SocketAddr>,
    filters: Arc<FilterChain>,
    context: Arc<ServerContext>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("address", &self.address).finish_non_exhaustive()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds, spawns the accept loop and returns a handle for shutdown.
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        install_tracing();

        info!("start listening at {:?}", self.address);
        let listener = TcpListener::bind(self.address.as_slice())
            .map_err(|source| ServerError::Bind { address: self.address.clone(), source })?;
        let local_addr =
            listener.local_addr().map_err(|source| ServerError::Bind { address: self.address.clone(), source })?;

        let config = self.context.config();
        let pool = Arc::new(WorkerPool::new(config.workers, || Worker::new(self.context.clone()))?);
        let executor = Arc::new(Executor::new(config.executor_threads));
        let running = Arc::new(AtomicBool::new(true));

        let accept_thread = {
            let filters = self.filters.clone();
            let executor = executor.clone();
            let running = running.clone();
            thread::spawn(move || accept_loop(listener, filters, pool, executor, running))
        };

        Ok(ServerHandle { local_addr, running, accept_thread, executor })
    }
}

fn install_tracing() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("global tracing subscriber already installed");
    }
}

/// Accepts connections until shutdown: filter, then submit to the
/// executor. The task owns the stream; dropping it at the end of the task
/// closes the connection, and the worker is released on every path.
fn accept_loop(
    listener: TcpListener,
    filters: Arc<FilterChain>,
    pool: Arc<WorkerPool>,
    executor: Arc<Executor>,
    running: Arc<AtomicBool>,
) {
    loop {
        let (stream, remote_addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        if !running.load(Ordering::SeqCst) {
            // the wake-up connection from shutdown, or a late arrival
            break;
        }

        trace!(%remote_addr, "connection accepted");

        if !filters.accept(&stream) {
            debug!(%remote_addr, "connection rejected by filter");
            // closed immediately, no worker involved
            drop(stream);
            continue;
        }

        let pool = pool.clone();
        executor.execute(move || {
            let mut worker = pool.acquire();
            // a panicking handler must not cost the pool its worker
            if panic::catch_unwind(AssertUnwindSafe(|| worker.serve(stream))).is_err() {
                error!("worker panicked while serving a connection");
                worker.reset();
            }
            pool.release(worker);
        });
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_thread: JoinHandle<()>,
    executor: Arc<Executor>,
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle").field("local_addr", &self.local_addr).finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Address the server is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections, then waits up to `grace` for in-flight
    /// requests before abandoning them.
    pub fn shutdown(self, grace: Duration) {
        info!("shutting down");
        self.running.store(false, Ordering::SeqCst);

        // the accept loop is blocked in accept(); poke it awake
        if let Err(e) = TcpStream::connect(self.local_addr) {
            debug!(cause = %e, "accept loop wake-up connection failed");
        }
        if self.accept_thread.join().is_err() {
            error!("accept loop panicked");
        }

        self.executor.close();
        if self.executor.await_drain(grace) {
            info!("all in-flight requests drained");
        } else {
            warn!("in-flight requests still running after {grace:?}, abandoning them");
        }
    }
}
