//! Listener registry and batch dispatch.
//!
//! [`StreamCoordinator`] owns the transport and the set of registered
//! [`ResponseListener`]s. Every `request_*` call becomes its own tokio task that
//! fetches the batch and then hands the full result list to each listener.
//!
//! Registration, removal and delivery share one mutex, so a listener never sees
//! a half-updated registry. Delivery runs while that mutex is held. Calls a
//! listener makes back into the same coordinator are detected instead of
//! deadlocking:
//!
//! - `add_listener`, `remove_listener` and `notify` fail with [`Error::Reentrant`]
//! - `dispose` is deferred until the current delivery ends, and the remaining
//!   listeners of that delivery are skipped
//! - `request_*`, `is_disposed`, `listener_count` and `in_flight` work as usual

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::FetchExecutor;
use crate::retry::RetryPolicy;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::FetchResult;
use std::any::Any;
use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Receives the results of completed batches
///
/// Any `Fn(&[FetchResult]) + Send + Sync` closure is a listener too.
pub trait ResponseListener: Send + Sync {
    /// Called once per completed batch with the results in request order
    fn on_responses(&self, results: &[FetchResult]);
}

impl<F> ResponseListener for F
where
    F: Fn(&[FetchResult]) + Send + Sync,
{
    fn on_responses(&self, results: &[FetchResult]) {
        self(results)
    }
}

thread_local! {
    /// Coordinators whose delivery is running on this thread
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct Inner {
    /// Listener registry; registration, removal and delivery all hold it
    registry: Mutex<Vec<Arc<dyn ResponseListener>>>,
    /// Dropped on disposal, which releases the transport
    executor: Mutex<Option<Arc<FetchExecutor>>>,
    /// Only flipped while `registry` is held
    disposed: AtomicBool,
    /// Set by a listener that disposes during delivery
    dispose_requested: AtomicBool,
    listener_count: AtomicUsize,
    /// Parent of every batch's cancellation token
    cancel: CancellationToken,
    tasks: TaskTracker,
    shutdown_timeout: Duration,
}

/// Fans batched HTTP results out to registered listeners
///
/// Cloning is cheap and every clone drives the same registry.
///
/// # Example
///
/// ```no_run
/// use http_stream::{Config, FetchResult, StreamCoordinator};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> http_stream::Result<()> {
/// let coordinator = StreamCoordinator::new(Config::default())?;
/// coordinator.add_listener(Arc::new(|results: &[FetchResult]| {
///     for result in results {
///         println!("{result}");
///     }
/// }))?;
///
/// coordinator.request_many(vec![
///     "http://localhost:8080/api/test".to_string(),
///     "http://localhost:8080/image".to_string(),
/// ])?;
///
/// coordinator.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamCoordinator {
    inner: Arc<Inner>,
}

impl StreamCoordinator {
    /// Create a coordinator with a `reqwest`-backed transport
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.fetch)?;
        Ok(Self::build(config, Arc::new(transport)))
    }

    /// Create a coordinator over an injected transport
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, transport))
    }

    fn build(config: Config, transport: Arc<dyn Transport>) -> Self {
        let executor = FetchExecutor::new(
            transport,
            RetryPolicy::new(config.retry),
            config.fetch.batch_failure,
        );

        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Vec::new()),
                executor: Mutex::new(Some(Arc::new(executor))),
                disposed: AtomicBool::new(false),
                dispose_requested: AtomicBool::new(false),
                listener_count: AtomicUsize::new(0),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
                shutdown_timeout: config.shutdown_timeout,
            }),
        }
    }

    /// Fetch `urls` in the background and notify listeners when done
    ///
    /// Returns as soon as the batch is dispatched. The results are only ever
    /// observed through [`ResponseListener::on_responses`]. A transport failure
    /// is reported to listeners as a sentinel result, never through this call.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after [`dispose`](Self::dispose); nothing is fetched
    /// - [`Error::NoRuntime`] when called outside a tokio runtime
    pub fn request_many(&self, urls: Vec<String>) -> Result<()> {
        if self.inner.is_closed() {
            return Err(Error::Disposed);
        }
        let executor = lock_or_recover(&self.inner.executor)
            .clone()
            .ok_or(Error::Disposed)?;
        let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        tracing::debug!(count = urls.len(), "Dispatching batch");
        let inner = Arc::clone(&self.inner);
        let cancel = self.inner.cancel.child_token();
        self.inner.tasks.spawn_on(
            async move { inner.run_batch(executor, urls, cancel).await },
            &handle,
        );
        Ok(())
    }

    /// Fetch a single URL; same as `request_many(vec![url])`
    pub fn request_one(&self, url: impl Into<String>) -> Result<()> {
        self.request_many(vec![url.into()])
    }

    /// Register a listener
    ///
    /// Returns `Ok(false)` if this exact listener (same `Arc`) is already registered.
    pub fn add_listener(&self, listener: Arc<dyn ResponseListener>) -> Result<bool> {
        let mut registry = self.inner.lock()?;
        if registry.iter().any(|l| same_listener(l, &listener)) {
            return Ok(false);
        }
        registry.push(listener);
        self.inner.listener_count.store(registry.len(), Ordering::SeqCst);
        tracing::debug!(listeners = registry.len(), "Listener added");
        Ok(true)
    }

    /// Unregister a listener
    ///
    /// Returns `Ok(false)` if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn ResponseListener>) -> Result<bool> {
        let mut registry = self.inner.lock()?;
        let Some(index) = registry.iter().position(|l| same_listener(l, listener)) else {
            return Ok(false);
        };
        registry.remove(index);
        self.inner.listener_count.store(registry.len(), Ordering::SeqCst);
        tracing::debug!(listeners = registry.len(), "Listener removed");
        Ok(true)
    }

    /// Deliver `results` to every registered listener in registration order
    ///
    /// A listener that panics is logged and skipped; the others still receive
    /// the batch. Returns the number of listeners that completed delivery.
    pub fn notify(&self, results: &[FetchResult]) -> Result<usize> {
        self.inner.notify(results)
    }

    /// Release the transport, drop every listener and cancel in-flight batches
    ///
    /// Idempotent. Every other operation fails with [`Error::Disposed`] afterwards,
    /// and no listener is called again. Called from a listener, disposal takes
    /// effect as soon as the current delivery ends.
    pub fn dispose(&self) {
        if self.inner.is_delivering() {
            self.inner.dispose_requested.store(true, Ordering::SeqCst);
            tracing::debug!("Dispose requested during delivery, deferring");
            return;
        }
        let mut registry = lock_or_recover(&self.inner.registry);
        self.inner.dispose_locked(&mut registry);
    }

    /// Dispose, then wait for in-flight batches to wind down
    ///
    /// Waiting is bounded by `Config::shutdown_timeout`.
    pub async fn shutdown(&self) {
        self.dispose();

        let timeout = self.inner.shutdown_timeout;
        match tokio::time::timeout(timeout, self.inner.tasks.wait()).await {
            Ok(()) => tracing::info!("All batches finished"),
            Err(_) => tracing::warn!(
                in_flight = self.inner.tasks.len(),
                timeout_ms = timeout.as_millis(),
                "Timeout waiting for batches to finish"
            ),
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called
    pub fn is_disposed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listener_count.load(Ordering::SeqCst)
    }

    /// Number of batches still running
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("listeners", &self.listener_count())
            .field("disposed", &self.is_disposed())
            .field("in_flight", &self.inner.tasks.len())
            .finish()
    }
}

impl Inner {
    /// Lock the registry of a live coordinator
    ///
    /// Fails with [`Error::Reentrant`] from inside this coordinator's delivery,
    /// where the lock is already held by the caller's own thread.
    fn lock(&self) -> Result<MutexGuard<'_, Vec<Arc<dyn ResponseListener>>>> {
        if self.is_delivering() {
            tracing::warn!("Listener called back into the registry during delivery");
            return Err(Error::Reentrant);
        }
        let registry = lock_or_recover(&self.registry);
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        Ok(registry)
    }

    fn is_closed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst) || self.dispose_requested.load(Ordering::SeqCst)
    }

    fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    fn is_delivering(&self) -> bool {
        let id = self.id();
        DELIVERING.with(|stack| stack.borrow().contains(&id))
    }

    fn notify(&self, results: &[FetchResult]) -> Result<usize> {
        let mut registry = self.lock()?;

        let mut delivered = 0;
        {
            let _delivery = DeliveryGuard::enter(self.id());
            for (index, listener) in registry.iter().enumerate() {
                if self.dispose_requested.load(Ordering::SeqCst) {
                    break;
                }
                match catch_unwind(AssertUnwindSafe(|| listener.on_responses(results))) {
                    Ok(()) => delivered += 1,
                    Err(payload) => tracing::error!(
                        listener = index,
                        panic = %panic_message(payload.as_ref()),
                        "Listener panicked during notification"
                    ),
                }
            }
        }

        if self.dispose_requested.load(Ordering::SeqCst) {
            self.dispose_locked(&mut registry);
        }
        Ok(delivered)
    }

    /// Tear down with the registry lock held; no-op when already disposed
    fn dispose_locked(&self, registry: &mut Vec<Arc<dyn ResponseListener>>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        registry.clear();
        self.listener_count.store(0, Ordering::SeqCst);
        let executor = lock_or_recover(&self.executor).take();

        self.cancel.cancel();
        self.tasks.close();
        drop(executor);
        tracing::info!(in_flight = self.tasks.len(), "Coordinator disposed");
    }

    async fn run_batch(
        self: Arc<Self>,
        executor: Arc<FetchExecutor>,
        urls: Vec<String>,
        cancel: CancellationToken,
    ) {
        let results = match executor.fetch_all(&urls, &cancel).await {
            Ok(results) => results,
            Err(Error::Cancelled) => {
                tracing::info!(count = urls.len(), "Batch cancelled before completion");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Batch failed");
                return;
            }
        };
        drop(executor);

        match self.notify(&results) {
            Ok(delivered) => {
                tracing::debug!(results = results.len(), delivered, "Batch delivered");
            }
            Err(Error::Disposed) => {
                tracing::debug!("Coordinator disposed before delivery, dropping batch");
            }
            Err(e) => tracing::warn!(error = %e, "Batch delivery failed"),
        }
    }
}

/// Marks a coordinator as delivering on the current thread until dropped
struct DeliveryGuard(usize);

impl DeliveryGuard {
    fn enter(id: usize) -> Self {
        DELIVERING.with(|stack| stack.borrow_mut().push(id));
        Self(id)
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|&id| id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

// listener panics are caught before they can poison a lock
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Listener identity is the identity of the shared allocation
fn same_listener(a: &Arc<dyn ResponseListener>, b: &Arc<dyn ResponseListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
