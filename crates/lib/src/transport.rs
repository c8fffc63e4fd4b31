use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::codec::{self, CodecError};
use crate::protocol::{Request, Response};

/// Errors from the host transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(std::io::Error),
    #[error("login rejected: {0}")]
    Login(String),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("server error {code}: {message}")]
    Server { code: String, message: String },
    #[error("unexpected response from host")]
    UnexpectedResponse,
    #[error("transport already closed")]
    Closed,
}

/// Remote procedure and SQL access to one PIP host
pub trait Transport {
    /// Call MRPC `id` and return the first value of its reply
    fn execute_mrpc(&mut self, id: &str, args: &[&str]) -> Result<String, TransportError>;

    /// Run a SQL statement and return its rows
    fn execute_sql(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> Result<Vec<Vec<String>>, TransportError>;

    /// End the session. Calling it again is a no-op.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn execute_mrpc(&mut self, id: &str, args: &[&str]) -> Result<String, TransportError> {
        (**self).execute_mrpc(id, args)
    }

    fn execute_sql(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> Result<Vec<Vec<String>>, TransportError> {
        (**self).execute_sql(query, params)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Connection settings for [`TcpTransport`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub server: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub timeout: Option<Duration>,
}

/// Framed transport over a TCP stream
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: String,
}

impl TcpTransport {
    /// Connect and log in
    pub fn connect(opts: &ConnectOptions) -> Result<Self, TransportError> {
        let peer = format!("{}:{}", opts.host, opts.port);
        let stream = Self::open(&peer, opts.timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                TransportError::Connection(std::io::Error::new(
                    e.kind(),
                    format!("cannot connect to {peer}: is the host listening?"),
                ))
            } else {
                TransportError::Connection(e)
            }
        })?;
        stream
            .set_read_timeout(opts.timeout)
            .map_err(TransportError::Connection)?;
        stream
            .set_write_timeout(opts.timeout)
            .map_err(TransportError::Connection)?;

        let mut transport = Self {
            stream: Some(stream),
            peer,
        };

        let login = Request::Login {
            server: opts.server.clone(),
            user: opts.user.clone(),
            password: opts.password.clone(),
        };
        match transport.send(&login) {
            Ok(Response::Ok(_)) => {}
            Ok(Response::Error { message, .. }) => return Err(TransportError::Login(message)),
            Ok(_) => return Err(TransportError::UnexpectedResponse),
            Err(e) => return Err(e),
        }
        debug!(peer = %transport.peer, server = %opts.server, user = %opts.user, "Logged in");

        Ok(transport)
    }

    fn open(peer: &str, timeout: Option<Duration>) -> std::io::Result<TcpStream> {
        let Some(timeout) = timeout else {
            return TcpStream::connect(peer);
        };

        let mut last_err = None;
        for addr in peer.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{peer} did not resolve to any address"),
            )
        }))
    }

    /// Send a raw request and return the raw response
    pub fn send(&mut self, req: &Request) -> Result<Response, TransportError> {
        let stream = self.stream.as_ref().ok_or(TransportError::Closed)?;
        let mut io = stream;
        codec::write_request(&mut io, req)?;
        let resp = codec::read_response(&mut io)?;
        Ok(resp)
    }
}

impl Transport for TcpTransport {
    fn execute_mrpc(&mut self, id: &str, args: &[&str]) -> Result<String, TransportError> {
        let req = Request::Mrpc {
            id: id.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        match self.send(&req)? {
            Response::Ok(values) => Ok(values.into_iter().next().unwrap_or_default()),
            Response::Error { code, message } => Err(TransportError::Server { code, message }),
            Response::Rows(_) => Err(TransportError::UnexpectedResponse),
        }
    }

    fn execute_sql(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> Result<Vec<Vec<String>>, TransportError> {
        let req = Request::Sql {
            query: query.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        };
        match self.send(&req)? {
            Response::Rows(rows) => Ok(rows),
            // Statements without a result set (INSERT) answer with a bare OK
            Response::Ok(_) => Ok(Vec::new()),
            Response::Error { code, message } => Err(TransportError::Server { code, message }),
        }
    }

    fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if let Err(e) = self.send(&Request::Close) {
            debug!(peer = %self.peer, error = %e, "Close request failed");
        }
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        debug!(peer = %self.peer, "Connection closed");
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
