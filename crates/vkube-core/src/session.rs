use crate::cancel::{CancelToken, CancellationController};
use crate::finalize::{Finalization, FinalizationPolicy};
use crate::lifecycle::{validate_transition, SessionState};
use crate::report::ResourceReport;
use crate::timing::format_elapsed;
use crate::CoreError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vkube_universe::{OpenMode, Universe, UniverseConfig, UniverseProvider};

/// Progress output is cosmetic; a failed write must not derail a session.
pub(crate) fn say(out: &mut dyn Write, args: fmt::Arguments<'_>) {
    if let Err(e) = out.write_fmt(args).and_then(|()| out.write_all(b"\n")) {
        debug!("progress output failed: {e}");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub directory: PathBuf,
    /// Snapshot to resume; empty for the provider default.
    pub snapshot: String,
    /// Print endpoints and block until interrupted after the work succeeds.
    pub wait: bool,
    pub save: bool,
    /// Snapshot to save to, if different from `snapshot`.
    pub save_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionOutcome {
    pub directory: PathBuf,
    pub mode: OpenMode,
    pub opened_snapshot: String,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub waited: bool,
    pub interrupted: bool,
    pub finalization: Finalization,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Closes the universe on any exit path that skipped finalization.
struct CloseGuard<U: Universe> {
    universe: U,
    finalized: bool,
}

impl<U: Universe> Drop for CloseGuard<U> {
    fn drop(&mut self) {
        if self.finalized || self.universe.is_closed() {
            return;
        }
        debug!("closing unfinalized universe {}", self.universe.dir().display());
        if let Err(e) = self.universe.close() {
            warn!("closing universe on unwind failed: {e}");
        }
    }
}

/// Drives one session through open, work, optional wait, and finalization.
pub struct LifecycleController {
    options: SessionOptions,
    config: UniverseConfig,
    policy: FinalizationPolicy,
    state: SessionState,
}

impl LifecycleController {
    pub fn new(options: SessionOptions, config: UniverseConfig) -> Self {
        let policy = FinalizationPolicy::new(options.save, options.save_name.clone());
        Self {
            options,
            config,
            policy,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, to: SessionState) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        debug!("session {} -> {to}", self.state);
        self.state = to;
        Ok(())
    }

    /// Run one session. Errors from `work` are returned unchanged; the
    /// universe is discarded in that case, never saved.
    pub fn run<P, F>(
        &mut self,
        provider: &P,
        cancel: &CancelToken,
        out: &mut dyn Write,
        work: F,
    ) -> Result<SessionOutcome, CoreError>
    where
        P: UniverseProvider,
        F: FnOnce(&mut P::Universe) -> Result<(), CoreError>,
    {
        self.transition(SessionState::Opening)?;
        let start = Instant::now();
        info!(
            "opening universe {} with {} provider",
            self.options.directory.display(),
            provider.name()
        );
        let (universe, mode) = provider
            .open_or_create(&self.options.directory, &self.options.snapshot, &self.config)
            .map_err(CoreError::Open)?;
        let mut guard = CloseGuard {
            universe,
            finalized: false,
        };
        self.transition(SessionState::Running)?;

        if let Err(e) = work(&mut guard.universe) {
            warn!("work failed, discarding universe: {e}");
            self.transition(SessionState::Finalizing)?;
            let decision = self.policy.decide(false, guard.universe.snapshot());
            if let Err(close_err) = FinalizationPolicy::apply(&decision, &mut guard.universe, out)
            {
                warn!("discarding universe after failed work: {close_err}");
            }
            guard.finalized = true;
            self.transition(SessionState::Closed)?;
            return Err(e);
        }

        let elapsed = start.elapsed();
        say(out, format_args!("Operation took {}.", format_elapsed(elapsed)));

        let mut waited = false;
        if self.options.wait {
            self.transition(SessionState::Waiting)?;
            if cancel.is_cancelled() {
                info!("cancelled before waiting, finalizing immediately");
            } else {
                say(out, format_args!("{}", ResourceReport::collect(&guard.universe)));
                say(out, format_args!("Hit ctrl+C to shut down"));
                cancel.wait();
                waited = true;
            }
        }
        let interrupted = cancel.is_cancelled();

        self.transition(SessionState::Finalizing)?;
        let opened_snapshot = guard.universe.snapshot().to_owned();
        let decision = self.policy.decide(true, &opened_snapshot);
        let result = FinalizationPolicy::apply(&decision, &mut guard.universe, out);
        guard.finalized = true;
        self.transition(SessionState::Closed)?;
        result?;

        Ok(SessionOutcome {
            directory: self.options.directory.clone(),
            mode,
            opened_snapshot,
            elapsed,
            waited,
            interrupted,
            finalization: decision,
        })
    }
}

/// Run a session whose wait phase ends on ctrl+C.
pub fn run_with_universe<P, F>(
    provider: &P,
    options: SessionOptions,
    config: UniverseConfig,
    out: &mut dyn Write,
    work: F,
) -> Result<SessionOutcome, CoreError>
where
    P: UniverseProvider,
    F: FnOnce(&mut P::Universe) -> Result<(), CoreError>,
{
    let cancellation = CancellationController::start_global();
    LifecycleController::new(options, config).run(provider, &cancellation.token(), out, work)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn say_appends_newline() {
        let mut out = Vec::new();
        say(&mut out, format_args!("hello {}", 42));
        assert_eq!(out, b"hello 42\n");
    }

    #[test]
    fn say_ignores_write_failures() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        say(&mut Broken, format_args!("dropped"));
    }

    #[test]
    fn outcome_serializes_elapsed_as_millis() {
        let outcome = SessionOutcome {
            directory: PathBuf::from("/tmp/u"),
            mode: OpenMode::Created,
            opened_snapshot: String::new(),
            elapsed: Duration::from_millis(1500),
            waited: false,
            interrupted: false,
            finalization: Finalization::Discard,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["mode"], "created");
        assert_eq!(json["finalization"]["action"], "discard");
    }

    #[test]
    fn new_controller_is_idle() {
        let controller = LifecycleController::new(SessionOptions::default(), UniverseConfig::default());
        assert_eq!(controller.state(), SessionState::Idle);
    }
}
