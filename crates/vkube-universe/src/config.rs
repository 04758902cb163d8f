use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Sink that receives a trace of the commands a provider runs under the hood.
///
/// Cloning is cheap; all clones write to the same underlying writer.
#[derive(Clone)]
pub struct CommandLog {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl CommandLog {
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Append one command line to the log, prefixed with `+ `.
    ///
    /// Write failures are not propagated: the trace is advisory and must
    /// never fail the operation it describes.
    pub fn record(&self, command: &str) {
        let Ok(mut sink) = self.sink.lock() else {
            debug!("command log mutex poisoned, dropping: {command}");
            return;
        };
        if let Err(e) = writeln!(sink, "+ {command}").and_then(|()| sink.flush()) {
            debug!("command log write failed: {e}");
        }
    }
}

impl fmt::Debug for CommandLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLog").finish_non_exhaustive()
    }
}

/// In-memory writer whose contents can be read back from any clone.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| std::io::Error::other(format!("mutex poisoned: {e}")))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Behaviour knobs handed to a provider when a universe is opened or created.
///
/// Built once before opening and only ever passed by shared reference.
#[derive(Debug, Clone)]
pub struct UniverseConfig {
    /// Show a graphical display for each VM.
    pub vm_graphics: bool,
    /// Use hardware-assisted virtualization (KVM) when available.
    pub acceleration: bool,
    /// The universe is driven by an interactive session.
    pub interactive: bool,
    pub command_log: Option<CommandLog>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            vm_graphics: false,
            acceleration: true,
            interactive: false,
            command_log: None,
        }
    }
}

impl UniverseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_graphics(mut self, vm_graphics: bool) -> Self {
        self.vm_graphics = vm_graphics;
        self
    }

    #[must_use]
    pub fn with_acceleration(mut self, acceleration: bool) -> Self {
        self.acceleration = acceleration;
        self
    }

    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    #[must_use]
    pub fn with_command_log(mut self, log: CommandLog) -> Self {
        self.command_log = Some(log);
        self
    }

    pub(crate) fn log_command(&self, command: &str) {
        if let Some(log) = &self.command_log {
            log.record(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_acceleration_only() {
        let cfg = UniverseConfig::default();
        assert!(cfg.acceleration);
        assert!(!cfg.vm_graphics);
        assert!(!cfg.interactive);
        assert!(cfg.command_log.is_none());
    }

    #[test]
    fn command_log_writes_prefixed_lines() {
        let buf = SharedBuffer::new();
        let cfg = UniverseConfig::new().with_command_log(CommandLog::from_writer(buf.clone()));
        cfg.log_command("qemu-img create -f qcow2 disk.qcow2");
        cfg.log_command("kubeadm init");
        assert_eq!(
            buf.contents(),
            "+ qemu-img create -f qcow2 disk.qcow2\n+ kubeadm init\n"
        );
    }

    #[test]
    fn log_command_without_sink_is_noop() {
        let cfg = UniverseConfig::new();
        cfg.log_command("ignored");
    }

    #[test]
    fn cloned_log_shares_sink() {
        let buf = SharedBuffer::new();
        let log = CommandLog::from_writer(buf.clone());
        let other = log.clone();
        log.record("a");
        other.record("b");
        assert_eq!(buf.contents(), "+ a\n+ b\n");
    }
}
