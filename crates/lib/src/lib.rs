//! Client for editing PSL elements stored on a PIP/FIS host.
//!
//! Element content travels through the element-service MRPC: uploads are
//! streamed in encoded chunks into a compilation token, downloads arrive in
//! pages. On top of that sit test-compile, compile-and-link and remote
//! execution, and the provisioning that enables the optional MRPCs.

pub mod codec;
pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod element;
pub mod error;
pub mod ops;
pub mod protocol;
pub mod provision;
pub mod session;
pub mod transport;
pub mod wire;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError};
pub use diagnostics::{Diagnostic, Severity};
pub use element::{ElementId, ElementType, Token};
pub use error::{Error, Result};
pub use ops::{Operation, Outcome};
pub use provision::{Capability, Provisioned};
pub use session::Session;
pub use transport::{TcpTransport, Transport, TransportError};
