//! Text encoding of element bytes for `INITCODE` payloads
//!
//! Each byte is written as its decimal value followed by a pipe, so
//! `b"AB\n"` becomes `65|66|10|`. The empty chunk encodes to `""`, which the
//! host reads as the end of an upload.

/// Bytes per `INITCODE` call
pub const CHUNK_SIZE: usize = 1024;

/// Encode a chunk of raw bytes
pub fn encode_chunk(chunk: &[u8]) -> String {
    let mut out = String::with_capacity(chunk.len() * 4);
    for byte in chunk {
        out.push_str(&byte.to_string());
        out.push('|');
    }
    out
}

/// Decode an encoded chunk back into bytes
pub fn decode_chunk(encoded: &str) -> Result<Vec<u8>, String> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    let Some(body) = encoded.strip_suffix('|') else {
        return Err("encoded chunk is missing its trailing pipe".to_string());
    };
    body.split('|')
        .map(|value| {
            value
                .parse::<u8>()
                .map_err(|e| format!("invalid byte value {value:?}: {e}"))
        })
        .collect()
}
