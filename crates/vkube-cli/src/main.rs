mod commands;
mod settings;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Globals, UniverseArgs, EXIT_FAILURE};
use settings::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "vkube",
    version,
    about = "Snapshot-backed universes of virtual machines and Kubernetes clusters"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging and echo provider commands.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resume a universe and keep it running until ctrl+C.
    Start {
        #[command(flatten)]
        universe: UniverseArgs,
    },
    /// Create a VM in a universe and save it.
    NewVm {
        #[command(flatten)]
        universe: UniverseArgs,
        /// Hostname of the new VM.
        #[arg(long)]
        hostname: String,
        /// Extra guest port to forward to the host (ssh is always forwarded).
        #[arg(long = "port")]
        ports: Vec<u16>,
    },
    /// Create a Kubernetes cluster in a universe and save it.
    NewCluster {
        #[command(flatten)]
        universe: UniverseArgs,
        /// Name of the new cluster.
        #[arg(long)]
        name: String,
        /// Worker nodes in addition to the controller.
        #[arg(long, default_value_t = 1)]
        nodes: usize,
    },
    /// Show the VMs and clusters in a universe snapshot.
    Inspect {
        #[command(flatten)]
        universe: UniverseArgs,
    },
    /// List saved snapshots of a universe.
    Snapshots {
        /// Directory holding the universe.
        #[arg(short = 'u', long = "universe")]
        dir: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VKUBE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let settings = match Settings::load_default() {
        Ok(settings) => {
            debug!("settings: {settings:?}");
            settings
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let globals = Globals {
        json: cli.json,
        verbose: cli.verbose,
        settings,
    };

    let result = match cli.command {
        Commands::Start { universe } => commands::start::run(&globals, &universe),
        Commands::NewVm {
            universe,
            hostname,
            ports,
        } => commands::new_vm::run(&globals, &universe, &hostname, &ports),
        Commands::NewCluster {
            universe,
            name,
            nodes,
        } => commands::new_cluster::run(&globals, &universe, &name, nodes),
        Commands::Inspect { universe } => commands::inspect::run(&globals, &universe),
        Commands::Snapshots { dir } => commands::snapshots::run(&dir, globals.json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_boolean_flags_mean_true() {
        let cli = Cli::try_parse_from(["vkube", "start", "-u", "/tmp/u", "--save", "--graphics"])
            .unwrap();
        let Commands::Start { universe } = cli.command else {
            panic!("expected start");
        };
        assert_eq!(universe.save, Some(true));
        assert_eq!(universe.graphics, Some(true));
        assert_eq!(universe.wait, None);
    }

    #[test]
    fn boolean_flags_take_explicit_values() {
        let cli = Cli::try_parse_from([
            "vkube",
            "start",
            "-u",
            "/tmp/u",
            "--wait=false",
            "--acceleration=false",
            "-s",
            "base",
        ])
        .unwrap();
        let Commands::Start { universe } = cli.command else {
            panic!("expected start");
        };
        assert_eq!(universe.wait, Some(false));
        assert_eq!(universe.acceleration, Some(false));
        assert_eq!(universe.snapshot, "base");
    }

    #[test]
    fn universe_flag_is_required() {
        assert!(Cli::try_parse_from(["vkube", "inspect"]).is_err());
    }

    #[test]
    fn new_vm_collects_ports() {
        let cli = Cli::try_parse_from([
            "vkube", "new-vm", "-u", "/tmp/u", "--hostname", "vm1", "--port", "80", "--port",
            "443",
        ])
        .unwrap();
        let Commands::NewVm { ports, hostname, .. } = cli.command else {
            panic!("expected new-vm");
        };
        assert_eq!(hostname, "vm1");
        assert_eq!(ports, vec![80, 443]);
    }
}
