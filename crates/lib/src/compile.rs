//! Test-compile, compile-and-link and remote execution
//!
//! Test-compile goes through the element-service MRPC. Compile-and-link and
//! execution use optional MRPCs that a host may not have registered; those
//! calls fail with [`Error::NotRegistered`] until [`crate::provision`] has
//! enabled them.

use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::element::{self, ElementService, ElementType};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default id of the compile-and-link MRPC
pub const COMPILE_RPC_ID: &str = "81";

/// Default id of the remote execution MRPC
pub const EXECUTE_RPC_ID: &str = "9001";

/// Table whose metadata drives compilation of an element kind
pub fn compile_table(kind: ElementType) -> Option<&'static str> {
    match kind {
        ElementType::Procedure => Some("DBTBL25"),
        ElementType::Table | ElementType::Column => Some("DBTBL1"),
        ElementType::Data | ElementType::Unknown => None,
    }
}

/// Upload `source` and test-compile it as `local_file`.
///
/// Returns the compiler output untouched.
pub fn test_compile<T, R>(
    transport: &mut T,
    element_rpc: &str,
    local_file: &str,
    source: R,
) -> Result<String>
where
    T: Transport + ?Sized,
    R: Read,
{
    let mut elements = ElementService::new(&mut *transport, element_rpc);
    let token = elements.upload(source)?;
    info!(local_file, "Test compiling");
    elements.exec_comp(local_file, token)
}

/// Compile and link the saved element `filename` stands for
pub fn compile_and_link<T>(
    transport: &mut T,
    compile_rpc: &str,
    filename: impl AsRef<Path>,
) -> Result<String>
where
    T: Transport + ?Sized,
{
    let id = element::resolve(filename);
    let Some(table) = compile_table(id.kind) else {
        return Err(Error::UnsupportedElement {
            kind: id.kind,
            name: id.name,
        });
    };

    info!(table, name = %id.name, "Compiling and linking");
    transport
        .execute_mrpc(compile_rpc, &[table, &id.name])
        .map_err(|e| Error::from_call(compile_rpc, e))
}

/// Upload `source` and run it on the host, returning its output
pub fn execute<T, R>(
    transport: &mut T,
    element_rpc: &str,
    execute_rpc: &str,
    source: R,
) -> Result<String>
where
    T: Transport + ?Sized,
    R: Read,
{
    let token = ElementService::new(&mut *transport, element_rpc).upload(source)?;
    debug!(rpc = execute_rpc, "Executing uploaded code");
    transport
        .execute_mrpc(execute_rpc, &[token.as_str()])
        .map_err(|e| Error::from_call(execute_rpc, e))
}
