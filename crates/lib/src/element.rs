//! Element identity and the element-service MRPC
//!
//! Elements are addressed by (type, name), both derived from a local file
//! name: `DEPACN.PROC` is the Procedure `DEPACN`.

use std::fmt;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::wire::{self, CHUNK_SIZE};

/// Default id of the element-service MRPC
pub const ELEMENT_RPC_ID: &str = "121";

/// Remote element classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Data,
    Procedure,
    Table,
    Column,
    /// Extension missing or not mapped; sent to the host as `""`
    Unknown,
}

impl ElementType {
    /// Map a file extension, case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_uppercase().as_str() {
            "DAT" => ElementType::Data,
            "PROC" | "PSL" => ElementType::Procedure,
            "TBL" => ElementType::Table,
            "COL" => ElementType::Column,
            _ => ElementType::Unknown,
        }
    }

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Data => "Data",
            ElementType::Procedure => "Procedure",
            ElementType::Table => "Table",
            ElementType::Column => "Column",
            ElementType::Unknown => "",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (type, name) pair addressing one element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId {
    pub kind: ElementType,
    pub name: String,
}

/// Resolve the element a local file stands for. Never fails.
pub fn resolve(filename: impl AsRef<Path>) -> ElementId {
    let path = filename.as_ref();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = path
        .extension()
        .map(|ext| ElementType::from_extension(&ext.to_string_lossy()))
        .unwrap_or(ElementType::Unknown);
    ElementId { kind, name }
}

/// File name without its directory, as the host expects in CHECKOBJ/SAVEOBJ
pub fn local_file_name(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Handle to uploaded code held by the host between calls.
///
/// Consumed by the call that uses it so one upload is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Token(String);

impl Token {
    /// The empty token, starting a new upload
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token(s)
    }
}

/// Client for the element-service MRPC
pub struct ElementService<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    rpc_id: &'a str,
}

impl<'a, T: Transport + ?Sized> ElementService<'a, T> {
    pub fn new(transport: &'a mut T, rpc_id: &'a str) -> Self {
        Self { transport, rpc_id }
    }

    fn call(&mut self, args: &[&str]) -> Result<String> {
        debug!(rpc = self.rpc_id, op = args.first().copied(), "MRPC call");
        self.transport
            .execute_mrpc(self.rpc_id, args)
            .map_err(|e| Error::from_call(self.rpc_id, e))
    }

    /// Open an element for reading, returning its transfer token and name
    pub fn init_obj(&mut self, id: &ElementId) -> Result<(Token, String)> {
        let reply = self.call(&["INITOBJ", "", "", "", id.kind.as_str(), &id.name])?;
        match reply.chars().next() {
            Some('0') => {
                // Message separators differ per element type (|, \r or \r\n);
                // after the status pair only a stray \n is left to drop.
                let err = reply.get(2..).unwrap_or_default();
                let err = err.strip_prefix('\n').unwrap_or(err);
                Err(Error::Validation(err.to_string()))
            }
            Some('1') => {
                let parts: Vec<&str> = reply.split("\r\n").skip(1).collect();
                match parts.as_slice() {
                    [token, name] => Ok((Token(token.to_string()), name.to_string())),
                    _ => Err(Error::MalformedReply(format!(
                        "INITOBJ returned {} fields, expected token and name",
                        parts.len()
                    ))),
                }
            }
            _ => Err(Error::MalformedReply(format!(
                "INITOBJ status {reply:?}"
            ))),
        }
    }

    /// Fetch the next page of an open element: (more pages follow, text)
    pub fn ret_obj(&mut self, token: &Token) -> Result<(bool, String)> {
        let reply = self.call(&["RETOBJ", "", "", "", "", "", token.as_str()])?;
        let mut chars = reply.chars();
        let more = match chars.next() {
            Some('1') => true,
            Some('0') => false,
            _ => {
                return Err(Error::MalformedReply(format!(
                    "RETOBJ status {reply:?}"
                )));
            }
        };
        Ok((more, chars.as_str().to_string()))
    }

    /// Append an encoded chunk to an upload
    pub fn init_code(&mut self, encoded: &str, token: Token) -> Result<Token> {
        self.call(&["INITCODE", encoded, token.as_str()]).map(Token)
    }

    /// Validate uploaded code as `local_file`
    pub fn check_obj(&mut self, local_file: &str, token: &Token) -> Result<()> {
        let reply = self.call(&["CHECKOBJ", "", "", local_file, "", "", token.as_str()])?;
        status(&reply, "CHECKOBJ")
    }

    /// Persist uploaded code as `local_file` on behalf of `username`
    pub fn save_obj(&mut self, local_file: &str, token: &Token, username: &str) -> Result<()> {
        let reply = self.call(&[
            "SAVEOBJ",
            "",
            "",
            local_file,
            "",
            "",
            token.as_str(),
            username,
        ])?;
        status(&reply, "SAVEOBJ")
    }

    /// Test-compile uploaded code, returning the compiler output
    pub fn exec_comp(&mut self, local_file: &str, token: Token) -> Result<String> {
        self.call(&["EXECCOMP", "", token.as_str(), local_file])
    }

    /// Stream `source` to the host and return the token holding it.
    ///
    /// Always ends with one empty INITCODE. A last line without a trailing
    /// newline is only staged by that call, and an empty source gets its
    /// token from it.
    pub fn upload<R: Read>(&mut self, mut source: R) -> Result<Token> {
        let mut token = Token::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut chunks = 0usize;
        let mut bytes = 0usize;

        loop {
            let n = read_chunk(&mut source, &mut buf)?;
            if n == 0 {
                break;
            }
            token = self.init_code(&wire::encode_chunk(&buf[..n]), token)?;
            chunks += 1;
            bytes += n;
        }
        drop(source);

        let token = self.init_code("", token)?;
        debug!(chunks, bytes, "Upload complete");
        Ok(token)
    }

    /// Read a whole element. Nothing is returned unless every page arrived.
    pub fn fetch(&mut self, id: &ElementId) -> Result<Vec<u8>> {
        let (token, name) = self.init_obj(id)?;
        debug!(kind = %id.kind, name = %name, "Element opened");

        let mut content = Vec::new();
        let mut pages = 0usize;
        loop {
            let (more, text) = self.ret_obj(&token)?;
            content.extend_from_slice(text.as_bytes());
            pages += 1;
            if !more {
                break;
            }
        }
        debug!(pages, bytes = content.len(), "Element fetched");
        Ok(content)
    }

    /// Check then save uploaded code. Save is skipped when the check fails.
    pub fn save(&mut self, local_file: &str, token: Token, username: &str) -> Result<()> {
        self.check_obj(local_file, &token)?;
        self.save_obj(local_file, &token, username)
    }
}

/// `0` in front means failure, with the message starting at offset 3
fn status(reply: &str, op: &str) -> Result<()> {
    match reply.chars().next() {
        Some('0') => Err(Error::Validation(
            reply.get(3..).unwrap_or_default().to_string(),
        )),
        Some(_) => Ok(()),
        None => Err(Error::MalformedReply(format!("{op} returned nothing"))),
    }
}

/// Fill `buf` from `source`, stopping early only at end of input
fn read_chunk(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockTransport};
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn resolve_known_extensions() {
        let cases = [
            ("foo.PROC", ElementType::Procedure, "foo"),
            ("bar.psl", ElementType::Procedure, "bar"),
            ("/src/dd/ACN.CID.COL", ElementType::Column, "ACN.CID"),
            ("dep/DEP.TBL", ElementType::Table, "DEP"),
            ("CUVAR.dat", ElementType::Data, "CUVAR"),
        ];
        for (file, kind, name) in cases {
            assert_eq!(
                resolve(file),
                ElementId {
                    kind,
                    name: name.to_string()
                },
                "{file}"
            );
        }
    }

    #[test]
    fn resolve_unknown_or_missing_extension() {
        assert_eq!(
            resolve("x.unknown"),
            ElementId {
                kind: ElementType::Unknown,
                name: "x".into()
            }
        );
        assert_eq!(resolve("/tmp/README").kind, ElementType::Unknown);
        assert_eq!(resolve("/tmp/README").name, "README");
        assert_eq!(resolve("").name, "");
    }

    #[test]
    fn local_file_name_drops_directory() {
        assert_eq!(local_file_name("/a/b/ZTEST.PROC"), "ZTEST.PROC");
    }

    #[test]
    fn upload_roundtrips_content() {
        let content: Vec<u8> = (0..3000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut mock = MockTransport::new();

        let token = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Cursor::new(content.clone()))
            .unwrap();

        assert_eq!(mock.uploaded, content);
        // 1024 + 1024 + 952, then the flush
        let sizes = mock.init_code_payloads();
        assert_eq!(sizes.len(), 4);
        assert_eq!(sizes.last().unwrap(), "");
        assert_eq!(token.as_str(), "T4");
    }

    fn upload_bytes(content: &[u8]) -> MockTransport {
        let mut mock = MockTransport::new();
        ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Cursor::new(content.to_vec()))
            .unwrap();
        mock
    }

    #[test]
    fn chunk_boundaries() {
        for (len, calls) in [(1023, 2), (1024, 2), (1025, 3), (2048, 3), (2049, 4)] {
            let content = vec![b'a'; len];
            let mock = upload_bytes(&content);
            let payloads = mock.init_code_payloads();

            assert_eq!(payloads.len(), calls, "{len} bytes");
            assert_eq!(payloads.last().unwrap(), "", "{len} bytes");
            assert!(payloads[..calls - 1].iter().all(|p| !p.is_empty()));
            assert_eq!(mock.uploaded, content);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn upload_reconstructs_any_content(
            content in prop::collection::vec(any::<u8>(), 0..4 * CHUNK_SIZE)
        ) {
            let mock = upload_bytes(&content);
            let payloads = mock.init_code_payloads();

            prop_assert_eq!(&mock.uploaded, &content);
            prop_assert_eq!(payloads.len(), content.len().div_ceil(CHUNK_SIZE) + 1);
            prop_assert_eq!(payloads.last().map(String::as_str), Some(""));
            prop_assert_eq!(payloads.iter().filter(|p| p.is_empty()).count(), 1);
        }
    }

    #[test]
    fn empty_upload_is_a_single_flush() {
        let mut mock = MockTransport::new();
        let token = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Cursor::new(Vec::new()))
            .unwrap();

        assert_eq!(mock.calls.len(), 1);
        assert_eq!(mock.init_code_payloads(), [""]);
        assert!(!token.as_str().is_empty());
    }

    #[test]
    fn flush_follows_last_partial_chunk_once() {
        let mut mock = MockTransport::new();
        ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Cursor::new(b"no newline at end".to_vec()))
            .unwrap();

        let payloads = mock.init_code_payloads();
        assert_eq!(payloads.len(), 2);
        assert!(!payloads[0].is_empty());
        assert_eq!(payloads[1], "");
    }

    #[test]
    fn upload_threads_token_through_calls() {
        let mut mock = MockTransport::new();
        ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Cursor::new(vec![b'x'; CHUNK_SIZE + 1]))
            .unwrap();

        let tokens: Vec<&str> = mock
            .calls
            .iter()
            .map(|c| c.args().last().map(String::as_str).unwrap_or_default())
            .collect();
        assert_eq!(tokens, ["", "T1", "T2"]);
    }

    #[test]
    fn upload_read_error_propagates_without_flush() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }

        let mut mock = MockTransport::new();
        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Failing)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(mock.calls.is_empty());
    }

    #[test]
    fn short_reads_are_accumulated_into_full_chunks() {
        struct Trickle(Vec<u8>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut mock = MockTransport::new();
        ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .upload(Trickle(vec![b'a'; 1500]))
            .unwrap();
        assert_eq!(mock.init_code_payloads().len(), 3);
        assert_eq!(mock.uploaded.len(), 1500);
    }

    #[test]
    fn fetch_concatenates_pages_in_order() {
        let mut mock = MockTransport::new();
        mock.reply("1\r\nTOK\r\nZTEST");
        mock.reply("1first,");
        mock.reply("1second,");
        mock.reply("0third");

        let id = resolve("ZTEST.PROC");
        let content = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .fetch(&id)
            .unwrap();

        assert_eq!(content, b"first,second,third");
        assert_eq!(
            mock.calls[0],
            Call::mrpc("121", &["INITOBJ", "", "", "", "Procedure", "ZTEST"])
        );
        assert!(mock.calls[1..].iter().all(|c| c.op() == Some("RETOBJ")));
        assert_eq!(mock.calls[1].args().last().unwrap(), "TOK");
    }

    #[test]
    fn fetch_keeps_empty_pages() {
        let mut mock = MockTransport::new();
        mock.reply("1\r\nTOK\r\nX");
        mock.reply("1");
        mock.reply("0");

        let content = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .fetch(&resolve("X.DAT"))
            .unwrap();
        assert!(content.is_empty());
        assert_eq!(mock.calls.len(), 3);
    }

    #[test]
    fn failed_init_issues_no_retrieve_calls() {
        let mut mock = MockTransport::new();
        mock.reply("0\r\nInvalid Type");

        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .fetch(&resolve("X.unknown"))
            .unwrap_err();

        assert!(matches!(err, Error::Validation(ref m) if m == "Invalid Type"));
        assert_eq!(mock.calls.len(), 1);
    }

    #[test]
    fn init_error_with_other_separators() {
        let mut mock = MockTransport::new();
        mock.reply("0|Data item not found");
        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .init_obj(&resolve("X.DAT"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "Data item not found"));
    }

    #[test]
    fn init_reply_without_name_is_malformed() {
        let mut mock = MockTransport::new();
        mock.reply("1\r\nTOK");
        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .init_obj(&resolve("X.PROC"))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedReply(_)));
    }

    #[test]
    fn fetch_fails_on_bad_page_status() {
        let mut mock = MockTransport::new();
        mock.reply("1\r\nTOK\r\nX");
        mock.reply("1page");
        mock.reply("");

        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .fetch(&resolve("X.PROC"))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedReply(_)));
    }

    #[test]
    fn save_checks_then_saves() {
        let mut mock = MockTransport::new();
        mock.reply("1");
        mock.reply("1");

        ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .save("ZTEST.PROC", Token::from("TOK".to_string()), "jdoe")
            .unwrap();

        assert_eq!(
            mock.calls,
            [
                Call::mrpc("121", &["CHECKOBJ", "", "", "ZTEST.PROC", "", "", "TOK"]),
                Call::mrpc(
                    "121",
                    &["SAVEOBJ", "", "", "ZTEST.PROC", "", "", "TOK", "jdoe"]
                ),
            ]
        );
    }

    #[test]
    fn failed_check_skips_save() {
        let mut mock = MockTransport::new();
        mock.reply("0\r\nUnknown column ACN.XYZ");

        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .save("ACN.XYZ.COL", Token::from("TOK".to_string()), "jdoe")
            .unwrap_err();

        assert!(matches!(err, Error::Validation(ref m) if m == "Unknown column ACN.XYZ"));
        assert_eq!(mock.calls.len(), 1);
        assert_eq!(mock.calls[0].op(), Some("CHECKOBJ"));
    }

    #[test]
    fn failed_save_is_reported() {
        let mut mock = MockTransport::new();
        mock.reply("1");
        mock.reply("0\r\nElement locked");

        let err = ElementService::new(&mut mock, ELEMENT_RPC_ID)
            .save("ZTEST.PROC", Token::from("TOK".to_string()), "jdoe")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "Element locked"));
    }
}
