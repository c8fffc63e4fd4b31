//! Named operations on a local element file
//!
//! This is the entry point for front ends: pick an [`Operation`], hand it a
//! path and a session, and render the [`Outcome`].

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::diagnostics::{self, Diagnostic};
use crate::element::{self, ElementId};
use crate::error::Result;
use crate::provision::Capability;
use crate::session::Session;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Replace the local file with the element stored on the host
    Fetch,
    /// Save the local file as an element on the host
    Send,
    /// Compile the local file without saving it
    TestCompile,
    /// Compile and link the saved element
    CompileAndLink,
    /// Run the local file on the host
    Run,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Fetch,
        Operation::Send,
        Operation::TestCompile,
        Operation::CompileAndLink,
        Operation::Run,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Send => "send",
            Operation::TestCompile => "test-compile",
            Operation::CompileAndLink => "compile",
            Operation::Run => "run",
        }
    }

    /// Capability the operation depends on, if it is optional on the host
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Operation::CompileAndLink => Some(Capability::CompileAndLink),
            Operation::Run => Some(Capability::RemoteExecute),
            Operation::Fetch | Operation::Send | Operation::TestCompile => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown operation: {s}"))
    }
}

/// Result of a dispatched operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fetched { path: PathBuf, bytes: usize },
    Sent { element: ElementId },
    /// Compiler or program output, carriage returns removed
    Output {
        text: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl Outcome {
    fn output(raw: String) -> Self {
        let text = raw.replace('\r', "");
        let diagnostics = diagnostics::parse_lenient(&text);
        Outcome::Output { text, diagnostics }
    }
}

/// Run `op` against the element file at `path`
pub fn dispatch<T: Transport>(
    session: &mut Session<T>,
    op: Operation,
    path: &Path,
) -> Result<Outcome> {
    info!(%op, path = %path.display(), "Dispatching");
    match op {
        Operation::Fetch => {
            let content = session.fetch(&element::resolve(path))?;
            fs::write(path, &content)?;
            Ok(Outcome::Fetched {
                path: path.to_path_buf(),
                bytes: content.len(),
            })
        }
        Operation::Send => {
            let source = File::open(path)?;
            session.send(&element::local_file_name(path), source)?;
            Ok(Outcome::Sent {
                element: element::resolve(path),
            })
        }
        Operation::TestCompile => {
            let source = File::open(path)?;
            let raw = session.test_compile(&element::local_file_name(path), source)?;
            Ok(Outcome::output(raw))
        }
        Operation::CompileAndLink => Ok(Outcome::output(session.compile_and_link(path)?)),
        Operation::Run => {
            let source = File::open(path)?;
            Ok(Outcome::output(session.execute(source)?))
        }
    }
}

/// [`dispatch`], enabling a missing capability and retrying once.
///
/// `confirm` is asked before anything is written to the host; declining
/// surfaces [`crate::Error::ProvisioningDeclined`].
pub fn dispatch_with_provisioning<T, F>(
    session: &mut Session<T>,
    op: Operation,
    path: &Path,
    confirm: F,
) -> Result<Outcome>
where
    T: Transport,
    F: FnOnce(Capability) -> bool,
{
    match dispatch(session, op, path) {
        Err(err) if err.is_not_registered() => {
            let Some(capability) = session.capability_for(&err) else {
                return Err(err);
            };
            warn!(%capability, "Capability not enabled on host");
            let proceed = confirm(capability);
            session.ensure_capability(capability, proceed)?;
            dispatch(session, op, path)
        }
        other => other,
    }
}
