use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exit code used when an interrupt arrives with no session listening.
pub const EXIT_INTERRUPTED: i32 = 130;

struct Inner {
    fired: AtomicBool,
    done: Mutex<bool>,
    cond: Condvar,
}

/// Single-fire broadcast event. Clones observe the same event.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                done: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the event. Returns `true` only for the call that fired it.
    pub fn cancel(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut done = self
            .inner
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.inner.cond.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Block until the event fires. Returns at once if it already has.
    pub fn wait(&self) {
        let mut done = self
            .inner
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .inner
                .cond
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    /// Returns whether the event fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self
            .inner
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .inner
            .cond
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Outcome of delivering one interrupt to an [`InterruptRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The listening session was cancelled by this interrupt.
    Cancelled,
    /// The listening session is already shutting down.
    Ignored,
    NoListener,
}

/// Routes process interrupts to the session currently listening for them.
///
/// At most one session is registered at a time. The first interrupt
/// cancels that session's token; later ones are ignored until its
/// controller is dropped.
#[derive(Default)]
pub struct InterruptRegistry {
    slot: Mutex<Option<(u64, CancelToken)>>,
    next_id: AtomicU64,
}

impl InterruptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry fed by the process-wide ctrl+C handler.
    pub fn global() -> &'static InterruptRegistry {
        static GLOBAL: OnceLock<InterruptRegistry> = OnceLock::new();
        GLOBAL.get_or_init(InterruptRegistry::new)
    }

    /// Install the ctrl+C handler that feeds [`global`](Self::global).
    ///
    /// Runs at most once per process. Failing to install is not fatal; the
    /// process only loses graceful interrupt handling.
    pub fn install_handler() {
        static INSTALLED: Once = Once::new();
        INSTALLED.call_once(|| {
            let result = ctrlc::set_handler(|| {
                match InterruptRegistry::global().deliver() {
                    Delivery::Cancelled => eprintln!("\ninterrupt received, shutting down..."),
                    Delivery::Ignored => {}
                    Delivery::NoListener => std::process::exit(EXIT_INTERRUPTED),
                }
            });
            if let Err(e) = result {
                warn!("cannot install interrupt handler, ctrl+C will not shut down cleanly: {e}");
            }
        });
    }

    fn register(&self, token: CancelToken) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!("replacing previously registered interrupt listener");
        }
        *slot = Some((id, token));
        id
    }

    fn deregister(&self, id: u64) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
    }

    pub fn is_listening(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver one interrupt to the listening session, if any.
    pub fn deliver(&self) -> Delivery {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((_, token)) if token.cancel() => {
                info!("interrupt received");
                Delivery::Cancelled
            }
            Some(_) => {
                debug!("interrupt ignored, session already shutting down");
                Delivery::Ignored
            }
            None => Delivery::NoListener,
        }
    }
}

/// One session's view of cancellation: a token that fires on interrupt or
/// when the controller is cancelled or dropped. The session stays
/// registered until the controller is dropped.
pub struct CancellationController<'r> {
    registry: &'r InterruptRegistry,
    token: CancelToken,
    id: u64,
}

impl<'r> CancellationController<'r> {
    /// Start listening for interrupts on `registry`. Does not block.
    pub fn start(registry: &'r InterruptRegistry) -> Self {
        let token = CancelToken::new();
        let id = registry.register(token.clone());
        Self {
            registry,
            token,
            id,
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Fire the token. Returns `true` if this call fired it.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }
}

impl CancellationController<'static> {
    /// Install the process ctrl+C handler if needed and listen on the global registry.
    pub fn start_global() -> Self {
        InterruptRegistry::install_handler();
        Self::start(InterruptRegistry::global())
    }
}

impl Drop for CancellationController<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        self.registry.deregister(self.id);
    }
}
