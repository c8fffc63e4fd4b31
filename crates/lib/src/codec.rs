use std::io::{Read, Write};
use thiserror::Error;

use crate::protocol::{Request, Response};

/// Upper bound for a single frame, guards against garbage length prefixes
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write a request frame to a writer
pub fn write_request(writer: &mut impl Write, req: &Request) -> Result<(), CodecError> {
    write_frame(writer, &req.encode())
}

/// Read a request frame from a reader
pub fn read_request(reader: &mut impl Read) -> Result<Request, CodecError> {
    Request::decode(read_frame(reader)?).map_err(CodecError::Protocol)
}

/// Write a response frame to a writer
pub fn write_response(writer: &mut impl Write, resp: &Response) -> Result<(), CodecError> {
    write_frame(writer, &resp.encode())
}

/// Read a response frame from a reader
pub fn read_response(reader: &mut impl Read) -> Result<Response, CodecError> {
    Response::decode(read_frame(reader)?).map_err(CodecError::Protocol)
}

/// Frame layout: `len:u32le | (field_len:u32le | utf8)*`
fn write_frame(writer: &mut impl Write, fields: &[String]) -> Result<(), CodecError> {
    let body_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    if body_len > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(body_len));
    }

    let mut buf = Vec::with_capacity(4 + body_len);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    for field in fields {
        buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
        buf.extend_from_slice(field.as_bytes());
    }

    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

fn read_frame(reader: &mut impl Read) -> Result<Vec<String>, CodecError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::Closed
        } else {
            CodecError::Io(e)
        }
    })?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let mut fields = Vec::new();
    let mut rest = body.as_slice();
    while !rest.is_empty() {
        let Some((head, tail)) = rest.split_first_chunk::<4>() else {
            return Err(CodecError::Protocol("truncated field length".to_string()));
        };
        let field_len = u32::from_le_bytes(*head) as usize;
        if tail.len() < field_len {
            return Err(CodecError::Protocol(format!(
                "field of {field_len} bytes overruns frame"
            )));
        }
        let (field, tail) = tail.split_at(field_len);
        let field = String::from_utf8(field.to_vec())
            .map_err(|e| CodecError::Protocol(format!("invalid UTF-8 in field: {e}")))?;
        fields.push(field);
        rest = tail;
    }

    Ok(fields)
}

/// Frame encoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("frame of {0} bytes exceeds limit")]
    TooLarge(usize),
    #[error("connection closed")]
    Closed,
}
