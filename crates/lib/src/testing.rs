//! In-memory host used by the unit tests

use std::collections::VecDeque;

use crate::transport::{Transport, TransportError};
use crate::wire;

/// One call seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Mrpc { id: String, args: Vec<String> },
    Sql { query: String, params: Vec<String> },
}

impl Call {
    pub fn mrpc(id: &str, args: &[&str]) -> Self {
        Call::Mrpc {
            id: id.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            Call::Mrpc { args, .. } => args,
            Call::Sql { params, .. } => params,
        }
    }

    /// First MRPC argument, which names the element-service operation
    pub fn op(&self) -> Option<&str> {
        match self {
            Call::Mrpc { args, .. } => args.first().map(String::as_str),
            Call::Sql { .. } => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Call::Mrpc { id, .. } => Some(id.as_str()),
            Call::Sql { .. } => None,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            Call::Sql { query, .. } => Some(query.as_str()),
            Call::Mrpc { .. } => None,
        }
    }
}

/// Scripted host.
///
/// INITCODE calls are answered automatically: the payload is decoded into
/// [`MockTransport::uploaded`] and the reply is `T<n>` for the n-th call.
/// Every other MRPC pops the next scripted reply. SELECT statements pop the
/// next scripted result set, or return no rows when none is queued; other
/// statements always return no rows.
#[derive(Default)]
pub struct MockTransport {
    pub calls: Vec<Call>,
    pub uploaded: Vec<u8>,
    pub closed: usize,
    replies: VecDeque<Result<String, TransportError>>,
    rows: VecDeque<Result<Vec<Vec<String>>, TransportError>>,
    init_codes: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&mut self, reply: &str) {
        self.replies.push_back(Ok(reply.to_string()));
    }

    pub fn fail(&mut self, err: TransportError) {
        self.replies.push_back(Err(err));
    }

    pub fn not_registered(&mut self) {
        self.fail(TransportError::Server {
            code: crate::error::RPC_NOT_REGISTERED.to_string(),
            message: "Invalid MRPC".to_string(),
        });
    }

    pub fn rows(&mut self, rows: &[&[&str]]) {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        self.rows.push_back(Ok(rows));
    }

    /// Encoded payload of every INITCODE call, in order
    pub fn init_code_payloads(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter(|c| c.op() == Some("INITCODE"))
            .map(|c| c.args()[1].clone())
            .collect()
    }

    /// Operations in call order, `SQL` for statements
    pub fn ops(&self) -> Vec<String> {
        self.calls
            .iter()
            .map(|c| c.op().unwrap_or("SQL").to_string())
            .collect()
    }
}

impl Transport for MockTransport {
    fn execute_mrpc(&mut self, id: &str, args: &[&str]) -> Result<String, TransportError> {
        self.calls.push(Call::mrpc(id, args));

        if args.first() == Some(&"INITCODE") {
            let chunk =
                wire::decode_chunk(args[1]).map_err(|_| TransportError::UnexpectedResponse)?;
            self.uploaded.extend(chunk);
            self.init_codes += 1;
            return Ok(format!("T{}", self.init_codes));
        }

        self.replies
            .pop_front()
            .unwrap_or(Err(TransportError::UnexpectedResponse))
    }

    fn execute_sql(
        &mut self,
        query: &str,
        params: &[&str],
    ) -> Result<Vec<Vec<String>>, TransportError> {
        self.calls.push(Call::Sql {
            query: query.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        });
        if !query.starts_with("SELECT") {
            return Ok(Vec::new());
        }
        self.rows.pop_front().unwrap_or(Ok(Vec::new()))
    }

    fn close(&mut self) {
        self.closed += 1;
    }
}
