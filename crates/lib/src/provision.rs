//! Registration of optional MRPCs
//!
//! Compile-and-link and remote execution are not registered on every host.
//! Enabling them writes two rows: the MRPC itself in `SCATBL5` and an
//! authorization for the login user's class in `SCATBL5A`. Remote execution
//! also installs the bundled helper procedure (`ZFPSEXEC` unless configured
//! otherwise), which it compiles through compile-and-link, so that capability
//! is enabled first. A helper that does not compile cleanly stops
//! provisioning before anything is registered.

use std::fmt;

use tracing::{info, warn};

use crate::config::RpcSettings;
use crate::diagnostics::{self, Severity};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Transport;

/// Default name of the procedure serving remote execution
pub const HELPER_NAME: &str = "ZFPSEXEC";

/// Default routine registered for compile-and-link
pub const COMPILE_HANDLER: &str = "$$^MRPC081";

/// Source of the remote execution helper, sent as is
pub const HELPER_SOURCE: &str = include_str!("../resources/ZFPSEXEC.PROC");

const SELECT_RPC: &str = "SELECT RPCID FROM SCATBL5 WHERE RPCID=?";
const SELECT_USER_CLASS: &str = "SELECT UCLS FROM SCAU WHERE UID=?";
const INSERT_RPC: &str = "INSERT INTO SCATBL5 (RPCID,DESC,PGM) VALUES (?,?,?)";
const INSERT_AUTH: &str = "INSERT INTO SCATBL5A (RPCID,UCLS,LOGFLG) VALUES (?,?,?)";

/// An optional MRPC this client can enable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CompileAndLink,
    RemoteExecute,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::CompileAndLink => "compile-and-link",
            Capability::RemoteExecute => "remote execution",
        }
    }

    /// Routine registered as the MRPC handler
    pub fn handler(&self, rpc: &RpcSettings) -> String {
        match self {
            Capability::CompileAndLink => rpc.compile_handler.clone(),
            Capability::RemoteExecute => format!("$$EXEC^{}", rpc.helper),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Capability::CompileAndLink => "Compile and link element",
            Capability::RemoteExecute => "Execute uploaded code (fispip)",
        }
    }

    pub fn rpc_id<'a>(&self, rpc: &'a RpcSettings) -> &'a str {
        match self {
            Capability::CompileAndLink => &rpc.compile,
            Capability::RemoteExecute => &rpc.execute,
        }
    }

    pub fn for_rpc_id(rpc_id: &str, rpc: &RpcSettings) -> Option<Self> {
        [Capability::CompileAndLink, Capability::RemoteExecute]
            .into_iter()
            .find(|c| c.rpc_id(rpc) == rpc_id)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What [`ensure_capability`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyEnabled,
    Enabled,
}

/// Make sure `capability` is registered on the host.
///
/// Registered capabilities are left alone. Otherwise nothing is written
/// unless `proceed` is set, since this changes the host's configuration.
pub fn ensure_capability<T: Transport>(
    session: &mut Session<T>,
    capability: Capability,
    proceed: bool,
) -> Result<Provisioned> {
    let rpc_id = capability.rpc_id(session.rpc()).to_string();
    if is_registered(session.transport_mut(), &rpc_id)? {
        return Ok(Provisioned::AlreadyEnabled);
    }
    if !proceed {
        return Err(Error::ProvisioningDeclined(capability));
    }

    info!(%capability, rpc_id = %rpc_id, "Enabling capability");

    if capability == Capability::RemoteExecute {
        ensure_capability(session, Capability::CompileAndLink, proceed)?;
        install_helper(session)?;
    }

    let user = session.user().to_string();
    let handler = capability.handler(session.rpc());
    let class = user_class(session.transport_mut(), &user)?;
    register(
        session.transport_mut(),
        &rpc_id,
        capability.description(),
        &handler,
        &class,
    )?;

    info!(%capability, rpc_id = %rpc_id, user_class = %class, "Capability enabled");
    Ok(Provisioned::Enabled)
}

fn is_registered<T: Transport + ?Sized>(transport: &mut T, rpc_id: &str) -> Result<bool> {
    let rows = transport.execute_sql(SELECT_RPC, &[rpc_id])?;
    Ok(!rows.is_empty())
}

fn user_class<T: Transport + ?Sized>(transport: &mut T, user: &str) -> Result<String> {
    let rows = transport.execute_sql(SELECT_USER_CLASS, &[user])?;
    rows.into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .ok_or_else(|| Error::Validation(format!("user {user} has no user class")))
}

fn register<T: Transport + ?Sized>(
    transport: &mut T,
    rpc_id: &str,
    description: &str,
    handler: &str,
    class: &str,
) -> Result<()> {
    transport.execute_sql(INSERT_RPC, &[rpc_id, description, handler])?;
    transport.execute_sql(INSERT_AUTH, &[rpc_id, class, "0"])?;
    Ok(())
}

/// Save and compile the remote execution helper procedure.
///
/// Compiler errors, or output that cannot be parsed, fail the install.
fn install_helper<T: Transport>(session: &mut Session<T>) -> Result<()> {
    let helper = session.rpc().helper_file();
    info!(helper = %helper, "Installing helper procedure");
    session.send(&helper, HELPER_SOURCE.as_bytes())?;
    let output = session.compile_and_link(&helper)?;

    let failed = diagnostics::diagnostics(&output)
        .any(|d| d.map_or(true, |d| d.severity == Severity::Error));
    if failed {
        return Err(Error::HelperCompile { helper, output });
    }
    if !output.trim().is_empty() {
        warn!(helper = %helper, output = %output.trim(), "Helper compiler output");
    }
    Ok(())
}
