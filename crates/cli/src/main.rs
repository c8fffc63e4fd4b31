use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use libfispip::ops::{self, Operation, Outcome};
use libfispip::{element, Capability, Config, Provisioned, Session, Severity};

/// fispip - edit PSL elements stored on a PIP/FIS host
#[derive(Parser)]
#[command(name = "fispip", version, about)]
struct Cli {
    /// Config file to use instead of the nearest fispip-config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable missing host capabilities without asking
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace a local file with the element stored on the host
    Fetch { file: PathBuf },

    /// Save a local file as an element on the host
    Send { file: PathBuf },

    /// Compile a local file without saving it
    TestCompile { file: PathBuf },

    /// Compile and link the saved element a file stands for
    Compile { file: PathBuf },

    /// Run a local file on the host and print its output
    Run { file: PathBuf },

    /// Show the element a file name maps to (no connection needed)
    Resolve { file: PathBuf },

    /// Register an optional MRPC on the host
    Enable {
        capability: CapabilityArg,

        /// Directory whose configuration selects the host
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CapabilityArg {
    Compile,
    Execute,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::Compile => Capability::CompileAndLink,
            CapabilityArg::Execute => Capability::RemoteExecute,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fispip=info,libfispip=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (op, file) = match cli.command {
        Command::Fetch { file } => (Operation::Fetch, file),
        Command::Send { file } => (Operation::Send, file),
        Command::TestCompile { file } => (Operation::TestCompile, file),
        Command::Compile { file } => (Operation::CompileAndLink, file),
        Command::Run { file } => (Operation::Run, file),
        Command::Resolve { file } => return cmd_resolve(&file),
        Command::Enable { capability, dir } => {
            return cmd_enable(cli.config.as_deref(), capability.into(), &dir, cli.yes);
        }
    };

    run_operation(cli.config.as_deref(), op, &file, cli.yes)
}

/// Load the explicit config file, or the one governing `target`
fn load_config(explicit: Option<&Path>, target: &Path) -> Result<Config, String> {
    match explicit {
        Some(path) => Config::load(path).map_err(|e| e.to_string()),
        None => {
            let (path, config) = Config::for_path(target).map_err(|e| e.to_string())?;
            debug!(path = %path.display(), ?config, "Config loaded");
            Ok(config)
        }
    }
}

fn connect(
    explicit: Option<&Path>,
    target: &Path,
) -> Result<Session<libfispip::TcpTransport>, String> {
    let config = load_config(explicit, target)?;
    Session::connect(&config).map_err(|e| e.to_string())
}

/// Ask on the terminal before changing the host's configuration
fn confirm(capability: Capability, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }

    eprint!(
        "{capability} is not enabled on the host. Register it now? \
         This writes to SCATBL5/SCATBL5A. [y/N] "
    );
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes" | "YES")
}

fn run_operation(
    explicit: Option<&Path>,
    op: Operation,
    file: &Path,
    assume_yes: bool,
) -> ExitCode {
    let mut session = match connect(explicit, file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(1);
        }
    };

    let outcome = ops::dispatch_with_provisioning(&mut session, op, file, |capability| {
        confirm(capability, assume_yes)
    });
    drop(session);

    match outcome {
        Ok(Outcome::Fetched { path, bytes }) => {
            println!("Fetched {} ({bytes} bytes)", path.display());
            ExitCode::SUCCESS
        }
        Ok(Outcome::Sent { element }) => {
            println!("Saved {} {}", element.kind, element.name);
            ExitCode::SUCCESS
        }
        Ok(Outcome::Output { text, diagnostics }) => {
            print!("{text}");
            if !text.is_empty() && !text.ends_with('\n') {
                println!();
            }
            for d in &diagnostics {
                eprintln!("{}:{}: {}: {}", file.display(), d.line, d.severity, d.message);
            }
            if diagnostics.iter().any(|d| d.severity == Severity::Error) {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn cmd_resolve(file: &Path) -> ExitCode {
    println!("{}", describe_element(file));
    ExitCode::SUCCESS
}

fn describe_element(file: &Path) -> String {
    let id = element::resolve(file);
    if id.kind == libfispip::ElementType::Unknown {
        format!("{} -> unsupported element type", file.display())
    } else {
        format!("{} -> {} {}", file.display(), id.kind, id.name)
    }
}

fn cmd_enable(
    explicit: Option<&Path>,
    capability: Capability,
    dir: &Path,
    assume_yes: bool,
) -> ExitCode {
    let mut session = match connect(explicit, dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(1);
        }
    };

    let rpc_id = capability.rpc_id(session.rpc()).to_string();
    let result = session
        .ensure_capability(capability, false)
        .or_else(|e| match e {
            libfispip::Error::ProvisioningDeclined(_) if confirm(capability, assume_yes) => {
                session.ensure_capability(capability, true)
            }
            other => Err(other),
        });

    match result {
        Ok(Provisioned::AlreadyEnabled) => {
            println!("{capability} (MRPC {rpc_id}) is already enabled");
            ExitCode::SUCCESS
        }
        Ok(Provisioned::Enabled) => {
            println!("Enabled {capability} (MRPC {rpc_id})");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}
