//! Frame protocol spoken with the PIP host
//!
//! Every exchange is one request frame followed by one response frame.
//! Element operations ride on top of `MRPC` requests, capability provisioning
//! on top of `SQL` requests.
//!
//! # Wire Format
//!
//! A frame is a list of fields (see [`crate::codec`] for the byte layout).
//! The first field names the message, the rest are its arguments.
//!
//! ## Request
//! ```text
//! LOGIN <server> <user> <password>
//! MRPC  <id> [arg...]
//! SQL   <query> [param...]
//! CLOSE
//! ```
//!
//! ## Response
//! ```text
//! OK   [value...]
//! ROWS <columns> [cell...]      cells in row-major order
//! ERR  <code> <message>
//! ```

/// Request sent to the host
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Authenticate against a server instance
    Login {
        server: String,
        user: String,
        password: String,
    },

    /// Invoke a registered remote procedure
    Mrpc { id: String, args: Vec<String> },

    /// Run a SQL statement with positional parameters
    Sql { query: String, params: Vec<String> },

    /// End the session
    Close,
}

/// Response from the host
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Call succeeded, with zero or more values
    Ok(Vec<String>),

    /// Result set of a SQL query
    Rows(Vec<Vec<String>>),

    /// Call failed on the host
    Error { code: String, message: String },
}

impl Request {
    /// Flatten the request into frame fields
    pub fn encode(&self) -> Vec<String> {
        match self {
            Request::Login {
                server,
                user,
                password,
            } => vec![
                "LOGIN".to_string(),
                server.clone(),
                user.clone(),
                password.clone(),
            ],
            Request::Mrpc { id, args } => {
                let mut fields = Vec::with_capacity(args.len() + 2);
                fields.push("MRPC".to_string());
                fields.push(id.clone());
                fields.extend(args.iter().cloned());
                fields
            }
            Request::Sql { query, params } => {
                let mut fields = Vec::with_capacity(params.len() + 2);
                fields.push("SQL".to_string());
                fields.push(query.clone());
                fields.extend(params.iter().cloned());
                fields
            }
            Request::Close => vec!["CLOSE".to_string()],
        }
    }

    /// Rebuild a request from frame fields
    pub fn decode(mut fields: Vec<String>) -> Result<Self, String> {
        if fields.is_empty() {
            return Err("empty request frame".to_string());
        }
        let cmd = fields.remove(0);
        let mut rest = fields.into_iter();

        match cmd.as_str() {
            "LOGIN" => {
                let (Some(server), Some(user), Some(password), None) =
                    (rest.next(), rest.next(), rest.next(), rest.next())
                else {
                    return Err("LOGIN expects exactly 3 fields".to_string());
                };
                Ok(Request::Login {
                    server,
                    user,
                    password,
                })
            }
            "MRPC" => {
                let id = rest.next().ok_or("MRPC without id")?;
                Ok(Request::Mrpc {
                    id,
                    args: rest.collect(),
                })
            }
            "SQL" => {
                let query = rest.next().ok_or("SQL without query")?;
                Ok(Request::Sql {
                    query,
                    params: rest.collect(),
                })
            }
            "CLOSE" => Ok(Request::Close),
            _ => Err(format!("unknown request: {cmd}")),
        }
    }
}

impl Response {
    /// Flatten the response into frame fields
    pub fn encode(&self) -> Vec<String> {
        match self {
            Response::Ok(values) => {
                let mut fields = Vec::with_capacity(values.len() + 1);
                fields.push("OK".to_string());
                fields.extend(values.iter().cloned());
                fields
            }
            Response::Rows(rows) => {
                let columns = rows.first().map_or(0, Vec::len);
                let mut fields = vec!["ROWS".to_string(), columns.to_string()];
                for row in rows {
                    fields.extend(row.iter().cloned());
                }
                fields
            }
            Response::Error { code, message } => {
                vec!["ERR".to_string(), code.clone(), message.clone()]
            }
        }
    }

    /// Rebuild a response from frame fields
    pub fn decode(mut fields: Vec<String>) -> Result<Self, String> {
        if fields.is_empty() {
            return Err("empty response frame".to_string());
        }
        let kind = fields.remove(0);

        match kind.as_str() {
            "OK" => Ok(Response::Ok(fields)),
            "ROWS" => {
                if fields.is_empty() {
                    return Err("ROWS without column count".to_string());
                }
                let columns: usize = fields
                    .remove(0)
                    .parse()
                    .map_err(|e| format!("invalid column count: {e}"))?;
                if columns == 0 {
                    return if fields.is_empty() {
                        Ok(Response::Rows(Vec::new()))
                    } else {
                        Err("cells present with zero columns".to_string())
                    };
                }
                if fields.len() % columns != 0 {
                    return Err(format!(
                        "{} cells do not fill rows of {columns} columns",
                        fields.len()
                    ));
                }
                let rows = fields.chunks(columns).map(<[String]>::to_vec).collect();
                Ok(Response::Rows(rows))
            }
            "ERR" => {
                let mut rest = fields.into_iter();
                let code = rest.next().ok_or("ERR without code")?;
                let message = rest.next().unwrap_or_default();
                Ok(Response::Error { code, message })
            }
            _ => Err(format!("unknown response: {kind}")),
        }
    }
}
