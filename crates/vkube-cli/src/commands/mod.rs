pub mod completions;
pub mod inspect;
pub mod new_cluster;
pub mod new_vm;
pub mod snapshots;
pub mod start;

use crate::settings::Settings;
use clap::Args;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;
use vkube_core::{run_with_universe, CoreError, SessionOptions, SessionOutcome};
use vkube_universe::{CommandLog, LocalProvider, LocalUniverse, UniverseConfig};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_SETUP_ERROR: u8 = 2;
pub const EXIT_FINALIZE_ERROR: u8 = 3;

/// A failed command: the message printed after `error: ` and the process
/// exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

impl CommandError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_SETUP_ERROR,
            message: message.into(),
        }
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self {
            code: EXIT_FAILURE,
            message,
        }
    }
}

impl From<CoreError> for CommandError {
    fn from(e: CoreError) -> Self {
        let code = match &e {
            CoreError::Open(_) => EXIT_SETUP_ERROR,
            CoreError::Save(_) | CoreError::Close(_) => EXIT_FINALIZE_ERROR,
            _ => EXIT_FAILURE,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Flags shared by every command that runs a universe session.
#[derive(Debug, Clone, Args)]
pub struct UniverseArgs {
    /// Directory holding the universe; created if it does not exist.
    #[arg(short = 'u', long = "universe")]
    pub dir: PathBuf,
    /// Snapshot to resume (empty for the default snapshot).
    #[arg(short, long, default_value = "")]
    pub snapshot: String,
    /// Save the universe when the command succeeds.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub save: Option<bool>,
    /// Snapshot to save to, if different from --snapshot.
    #[arg(long = "save-snapshot", default_value = "")]
    pub save_snapshot: String,
    /// Print endpoints and block until ctrl+C before finalizing.
    #[arg(short, long, num_args = 0..=1, default_missing_value = "true")]
    pub wait: Option<bool>,
    /// Show a graphical display for each VM.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub graphics: Option<bool>,
    /// Use hardware-assisted virtualization.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub acceleration: Option<bool>,
}

/// Built-in finalization defaults of a command.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub wait: bool,
    pub save: bool,
}

/// Options resolved once in `main` and handed to every command.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub json: bool,
    pub verbose: bool,
    pub settings: Settings,
}

impl UniverseArgs {
    pub fn session_options(&self, defaults: Defaults) -> SessionOptions {
        SessionOptions {
            directory: self.dir.clone(),
            snapshot: self.snapshot.clone(),
            wait: self.wait.unwrap_or(defaults.wait),
            save: self.save.unwrap_or(defaults.save),
            save_name: self.save_snapshot.clone(),
        }
    }

    pub fn universe_config(&self, globals: &Globals, interactive: bool) -> UniverseConfig {
        let defaults = UniverseConfig::default();
        let mut config = UniverseConfig::new()
            .with_graphics(
                self.graphics
                    .or(globals.settings.graphics)
                    .unwrap_or(defaults.vm_graphics),
            )
            .with_acceleration(
                self.acceleration
                    .or(globals.settings.acceleration)
                    .unwrap_or(defaults.acceleration),
            )
            .with_interactive(interactive);
        if globals.verbose {
            // Keep stdout parseable in JSON mode.
            let log = if globals.json {
                CommandLog::from_writer(std::io::stderr())
            } else {
                CommandLog::stdout()
            };
            config = config.with_command_log(log);
        }
        config
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Run `work` inside a session on the local universe named by `args`.
/// Progress goes to stderr in JSON mode so stdout carries only the result.
pub fn run_session<F>(
    globals: &Globals,
    args: &UniverseArgs,
    defaults: Defaults,
    work: F,
) -> Result<SessionOutcome, CommandError>
where
    F: FnOnce(&mut LocalUniverse) -> Result<(), CoreError>,
{
    let options = args.session_options(defaults);
    debug!(
        "session on {}: snapshot '{}', wait={}, save={}",
        options.directory.display(),
        options.snapshot,
        options.wait,
        options.save
    );
    let config = args.universe_config(globals, options.wait);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let out: &mut dyn Write = if globals.json {
        &mut stderr
    } else {
        &mut stdout
    };
    run_with_universe(&LocalProvider::new(), options, config, out, work)
        .map_err(CommandError::from)
}

pub fn ok_line(msg: &str) -> String {
    format!("{} {msg}", console::Style::new().green().apply_to("✓"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkube_universe::UniverseError;

    fn args() -> UniverseArgs {
        UniverseArgs {
            dir: PathBuf::from("/tmp/u"),
            snapshot: String::new(),
            save: None,
            save_snapshot: String::new(),
            wait: None,
            graphics: None,
            acceleration: None,
        }
    }

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_SETUP_ERROR);
        assert_ne!(EXIT_SETUP_ERROR, EXIT_FINALIZE_ERROR);
    }

    #[test]
    fn command_defaults_apply_when_flags_absent() {
        let options = args().session_options(Defaults {
            wait: true,
            save: false,
        });
        assert!(options.wait);
        assert!(!options.save);
        assert_eq!(options.directory, PathBuf::from("/tmp/u"));
    }

    #[test]
    fn flags_override_command_defaults() {
        let mut a = args();
        a.wait = Some(false);
        a.save = Some(true);
        a.save_snapshot = "other".to_owned();
        let options = a.session_options(Defaults {
            wait: true,
            save: false,
        });
        assert!(!options.wait);
        assert!(options.save);
        assert_eq!(options.save_name, "other");
    }

    #[test]
    fn settings_sit_between_flags_and_defaults() {
        let globals = Globals {
            settings: Settings {
                graphics: Some(true),
                acceleration: Some(false),
                wait: None,
            },
            ..Globals::default()
        };
        let config = args().universe_config(&globals, false);
        assert!(config.vm_graphics);
        assert!(!config.acceleration);

        let mut a = args();
        a.acceleration = Some(true);
        let config = a.universe_config(&globals, true);
        assert!(config.acceleration);
        assert!(config.interactive);
    }

    #[test]
    fn built_in_defaults_without_settings() {
        let config = args().universe_config(&Globals::default(), false);
        assert!(!config.vm_graphics);
        assert!(config.acceleration);
        assert!(config.command_log.is_none());
    }

    #[test]
    fn verbose_attaches_command_log() {
        let globals = Globals {
            verbose: true,
            ..Globals::default()
        };
        assert!(args().universe_config(&globals, false).command_log.is_some());
    }

    #[test]
    fn exit_code_follows_failed_phase() {
        let open = CommandError::from(CoreError::Open(UniverseError::NoDirectory));
        assert_eq!(open.code, EXIT_SETUP_ERROR);
        let save = CommandError::from(CoreError::Save(UniverseError::Closed));
        assert_eq!(save.code, EXIT_FINALIZE_ERROR);
        let close = CommandError::from(CoreError::Close(UniverseError::Closed));
        assert_eq!(close.code, EXIT_FINALIZE_ERROR);
        assert_eq!(close.to_string(), "closing universe: universe is closed");
    }

    #[test]
    fn work_error_text_does_not_pick_exit_code() {
        let err = CommandError::from(CoreError::Work("closing universe: by hand".to_owned()));
        assert_eq!(err.code, EXIT_FAILURE);
        let err = CommandError::from("saving universe: in a message".to_owned());
        assert_eq!(err.code, EXIT_FAILURE);
    }

    #[test]
    fn ok_line_keeps_message() {
        assert!(ok_line("done").contains("done"));
    }
}
