//! Session lifecycle for vkube universes.
//!
//! A session opens (or creates) a universe, runs a caller-supplied unit of
//! work against it, optionally waits for ctrl+C while printing the
//! endpoints of its VMs and clusters, and finally either saves the
//! universe under a snapshot name or closes it, discarding changes.
//! `LifecycleController` sequences those phases, `CancellationController`
//! turns process interrupts into a single-fire `CancelToken`, and
//! `FinalizationPolicy` picks between save and revert.

pub mod cancel;
pub mod finalize;
pub mod lifecycle;
pub mod report;
pub mod session;
pub mod timing;

pub use cancel::{CancelToken, CancellationController, Delivery, InterruptRegistry};
pub use finalize::{Finalization, FinalizationPolicy};
pub use lifecycle::{validate_transition, SessionState};
pub use report::{ClusterEndpoint, ResourceReport, VmEndpoint};
pub use session::{run_with_universe, LifecycleController, SessionOptions, SessionOutcome};
pub use timing::format_elapsed;

use thiserror::Error;
use vkube_universe::UniverseError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("getting universe: {0}")]
    Open(#[source] UniverseError),
    #[error("saving universe: {0}")]
    Save(#[source] UniverseError),
    #[error("closing universe: {0}")]
    Close(#[source] UniverseError),
    #[error("{0}")]
    Universe(#[from] UniverseError),
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{0}")]
    Work(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_errors_carry_context() {
        let open = CoreError::Open(UniverseError::NoDirectory);
        assert_eq!(
            open.to_string(),
            "getting universe: universe directory not specified"
        );
        let save = CoreError::Save(UniverseError::Closed);
        assert_eq!(save.to_string(), "saving universe: universe is closed");
        let close = CoreError::Close(UniverseError::Backend("boom".to_owned()));
        assert_eq!(close.to_string(), "closing universe: provider failure: boom");
    }

    #[test]
    fn work_errors_display_verbatim() {
        assert_eq!(CoreError::Work("vm failed".to_owned()).to_string(), "vm failed");
        let from_universe: CoreError = UniverseError::Closed.into();
        assert_eq!(from_universe.to_string(), "universe is closed");
    }
}
