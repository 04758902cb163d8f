use crate::session::say;
use crate::CoreError;
use serde::Serialize;
use std::io::Write;
use tracing::info;
use vkube_universe::Universe;

/// What happens to a universe at the end of a session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Finalization {
    /// Persist under `name`; empty selects the provider's default snapshot.
    Save { name: String },
    /// Close without saving, reverting to the opened snapshot.
    Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizationPolicy {
    pub save: bool,
    /// Snapshot to save to when different from the one opened.
    pub save_name: String,
}

impl FinalizationPolicy {
    pub fn new(save: bool, save_name: impl Into<String>) -> Self {
        Self {
            save,
            save_name: save_name.into(),
        }
    }

    /// Failed work always discards, whatever was requested.
    pub fn decide(&self, work_succeeded: bool, opened_snapshot: &str) -> Finalization {
        if !work_succeeded || !self.save {
            return Finalization::Discard;
        }
        let name = if self.save_name.is_empty() {
            opened_snapshot
        } else {
            &self.save_name
        };
        Finalization::Save {
            name: name.to_owned(),
        }
    }

    /// Carry out `decision`: exactly one `save` or `close` call.
    pub fn apply<U: Universe + ?Sized>(
        decision: &Finalization,
        universe: &mut U,
        out: &mut dyn Write,
    ) -> Result<(), CoreError> {
        match decision {
            Finalization::Save { name } => {
                if name.is_empty() {
                    say(out, format_args!("Saving universe..."));
                } else {
                    say(out, format_args!("Saving universe as {name:?}..."));
                }
                universe.save(name).map_err(CoreError::Save)?;
                info!("universe {} saved", universe.dir().display());
            }
            Finalization::Discard => {
                say(out, format_args!("Closing (and reverting) universe..."));
                universe.close().map_err(CoreError::Close)?;
                info!("universe {} closed", universe.dir().display());
            }
        }
        Ok(())
    }
}
