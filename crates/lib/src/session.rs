//! One authenticated connection and the element operations run over it
//!
//! A [`Session`] owns its transport exclusively and closes it when dropped,
//! so every operation releases the connection on success and failure alike.

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::compile;
use crate::config::{Config, RpcSettings};
use crate::element::{ElementId, ElementService};
use crate::error::{Error, Result};
use crate::provision::{self, Capability, Provisioned};
use crate::transport::{TcpTransport, Transport};

pub struct Session<T: Transport> {
    transport: T,
    /// Login user id, used to look up the user class when provisioning
    user: String,
    /// Local account recorded as the author of saved elements
    username: String,
    rpc: RpcSettings,
}

impl Session<TcpTransport> {
    /// Connect to the host described by `config`
    pub fn connect(config: &Config) -> Result<Self> {
        let transport = TcpTransport::connect(&config.connect_options())?;
        info!(host = %config.host, port = config.port, server = %config.server, "Connected");
        Ok(Self::new(transport, &config.user, config.rpc.clone()))
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, user: impl Into<String>, rpc: RpcSettings) -> Self {
        Self {
            transport,
            user: user.into(),
            username: whoami::username(),
            rpc,
        }
    }

    /// Record saves under another local account name
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn rpc(&self) -> &RpcSettings {
        &self.rpc
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn elements(&mut self) -> ElementService<'_, T> {
        ElementService::new(&mut self.transport, &self.rpc.elements)
    }

    /// Read a whole element
    pub fn fetch(&mut self, id: &ElementId) -> Result<Vec<u8>> {
        info!(kind = %id.kind, name = %id.name, "Fetching element");
        self.elements().fetch(id)
    }

    /// Upload `source` and save it as `local_file`
    pub fn send(&mut self, local_file: &str, source: impl Read) -> Result<()> {
        info!(local_file, "Sending element");
        let username = self.username.clone();
        let mut elements = self.elements();
        let token = elements.upload(source)?;
        elements.save(local_file, token, &username)
    }

    /// Upload `source` and test-compile it as `local_file`
    pub fn test_compile(&mut self, local_file: &str, source: impl Read) -> Result<String> {
        compile::test_compile(&mut self.transport, &self.rpc.elements, local_file, source)
    }

    /// Compile and link the saved element `filename` stands for
    pub fn compile_and_link(&mut self, filename: impl AsRef<Path>) -> Result<String> {
        compile::compile_and_link(&mut self.transport, &self.rpc.compile, filename)
    }

    /// Upload `source` and run it on the host
    pub fn execute(&mut self, source: impl Read) -> Result<String> {
        compile::execute(
            &mut self.transport,
            &self.rpc.elements,
            &self.rpc.execute,
            source,
        )
    }

    /// Enable an optional MRPC; `proceed` is the user's confirmation
    pub fn ensure_capability(
        &mut self,
        capability: Capability,
        proceed: bool,
    ) -> Result<Provisioned> {
        provision::ensure_capability(self, capability, proceed)
    }

    /// Capability that would fix a [`Error::NotRegistered`] failure
    pub fn capability_for(&self, err: &Error) -> Option<Capability> {
        match err {
            Error::NotRegistered { rpc_id } => Capability::for_rpc_id(rpc_id, &self.rpc),
            _ => None,
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
