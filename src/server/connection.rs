// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-connection state and the `handle()` dispatch loop (spec.md §4.H).
//!
//! Grounded on `original_source/src/frontend/sock.c` (`connection_accept`,
//! `socket_handle_incoming`) and `spec.md` §4.H's contract: `handle()`
//! returns positive to keep the connection open, zero on orderly EOF,
//! negative on protocol error. [`HandleOutcome`] is the idiomatic stand-in
//! for that three-way integer (same pattern as [`crate::WriteOutcome`]).

use crate::json::{Flags, JsonFormatter};
use crate::protocol::{self, Frame, MessageType, Severity};
use crate::query::{self, Stmt};
use crate::store::{ScanControl, Store, StoreObjectRef, StoreObjectType};
use crate::Error;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

/// The outcome of one [`Connection::handle`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A full request was processed; return the connection to the idle list.
    KeepOpen,
    /// The peer closed the connection in an orderly way.
    Eof,
    /// A protocol violation occurred; the connection must be closed.
    Error,
}

enum Transport {
    Unix(UnixStream),
    Tls(rustls::StreamOwned<rustls::ServerConnection, TcpStream>),
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Unix(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Unix(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Unix(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

impl AsRawFd for Transport {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Unix(s) => s.as_raw_fd(),
            Self::Tls(s) => s.sock.as_raw_fd(),
        }
    }
}

/// A single client connection: identity, transport, and the buffer used to
/// build up a frame body before it is forwarded to the parser.
pub struct Connection {
    identity: String,
    transport: Transport,
    display_name: Option<String>,
}

impl Connection {
    pub(super) fn from_unix(stream: UnixStream) -> crate::Result<Self> {
        let identity = unix_peer_identity(&stream)?;
        Ok(Self {
            identity,
            transport: Transport::Unix(stream),
            display_name: None,
        })
    }

    pub(super) fn from_tls(stream: TcpStream, tls_config: Arc<rustls::ServerConfig>) -> crate::Result<Self> {
        let conn = rustls::ServerConnection::new(tls_config)
            .map_err(|e| Error::Auth(format!("TLS handshake setup failed: {e}")))?;
        let mut tls_stream = rustls::StreamOwned::new(conn, stream);

        // Drive the handshake to completion before we trust the peer's
        // certificate chain (spec.md §6: "clients authenticate by
        // certificate and their CN is the identity").
        tls_stream
            .conn
            .complete_io(&mut tls_stream.sock)
            .map_err(|e| Error::Auth(format!("TLS handshake failed: {e}")))?;

        let identity = tls_peer_identity(&tls_stream.conn)?;
        Ok(Self {
            identity,
            transport: Transport::Tls(tls_stream),
            display_name: None,
        })
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Reads one frame, dispatches it, and writes the response(s).
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures that occur while attempting
    /// to *write* an `ERROR` response; protocol/parse errors are reported
    /// to the client as an `ERROR` frame and surface as
    /// [`HandleOutcome::Error`] rather than `Err`.
    pub fn handle(&mut self, store: &Store, max_body: u32) -> crate::Result<HandleOutcome> {
        let frame = match protocol::decode_frame(&mut self.transport, max_body) {
            Ok(f) => f,
            Err(Error::Io(e)) if is_eof(&e) => return Ok(HandleOutcome::Eof),
            Err(e) => {
                self.reply_error(&e.to_string())?;
                return Ok(HandleOutcome::Error);
            }
        };

        match frame.message_type {
            MessageType::Hello => {
                let (_version, name) = frame.as_hello()?;
                self.display_name = Some(name);
                self.write_frame(&Frame::ok())?;
                Ok(HandleOutcome::KeepOpen)
            }
            MessageType::Ping => {
                self.write_frame(&Frame::ok())?;
                Ok(HandleOutcome::KeepOpen)
            }
            MessageType::Query | MessageType::Fetch | MessageType::List | MessageType::Lookup => {
                self.run_query(store, &frame.body)
            }
            other => {
                self.reply_error(&format!("unexpected message type {other:?} from client"))?;
                Ok(HandleOutcome::Error)
            }
        }
    }

    fn run_query(&mut self, store: &Store, body: &[u8]) -> crate::Result<HandleOutcome> {
        let text = match std::str::from_utf8(body) {
            Ok(t) => t,
            Err(e) => {
                self.reply_error(&format!("request body is not valid UTF-8: {e}"))?;
                return Ok(HandleOutcome::Error);
            }
        };

        let stmts = match query::parse_query(text) {
            Ok(s) => s,
            Err(e) => {
                self.reply_error(&e.to_string())?;
                return Ok(HandleOutcome::Error);
            }
        };

        for stmt in &stmts {
            match execute(store, stmt) {
                Ok(json) => self.write_frame(&Frame::new(MessageType::Data, json))?,
                Err(e) => {
                    self.write_frame(&Frame::log(Severity::Error, &e.to_string()))?;
                    self.reply_error(&e.to_string())?;
                    return Ok(HandleOutcome::Error);
                }
            }
        }
        self.write_frame(&Frame::ok())?;
        Ok(HandleOutcome::KeepOpen)
    }

    fn reply_error(&mut self, message: &str) -> crate::Result<()> {
        self.write_frame(&Frame::error(message))
    }

    fn write_frame(&mut self, frame: &Frame) -> crate::Result<()> {
        use crate::coding::Encode;
        frame.encode_into(&mut self.transport)?;
        self.transport.flush()?;
        Ok(())
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.transport.as_raw_fd()
    }
}

fn is_eof(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::UnexpectedEof
}

/// Executes one parsed statement against `store`, returning its JSON
/// projection (spec.md §6: "textual queries default to JSON").
fn execute(store: &Store, stmt: &Stmt) -> crate::Result<Vec<u8>> {
    match stmt {
        Stmt::ListHosts => dump(store, StoreObjectType::Host, None, None),
        Stmt::ListServices => dump(store, StoreObjectType::Service, None, None),
        Stmt::ListMetrics => dump(store, StoreObjectType::Metric, None, None),
        Stmt::FetchHost(name) => {
            let host = store
                .get_host(name)
                .ok_or_else(|| Error::MissingParent(name.clone()))?;
            emit_one(&StoreObjectRef::Host(host))
        }
        Stmt::FetchService(host, name) => {
            let host_ref = store
                .get_host(host)
                .ok_or_else(|| Error::MissingParent(host.clone()))?;
            let svc = store
                .get_child(&host_ref, StoreObjectType::Service, name)
                .ok_or_else(|| Error::MissingParent(format!("{host}/{name}")))?;
            emit_one(&svc)
        }
        Stmt::FetchMetric(host, name) => {
            let host_ref = store
                .get_host(host)
                .ok_or_else(|| Error::MissingParent(host.clone()))?;
            let metric = store
                .get_child(&host_ref, StoreObjectType::Metric, name)
                .ok_or_else(|| Error::MissingParent(format!("{host}/{name}")))?;
            emit_one(&metric)
        }
        Stmt::Lookup { object_type, matching, filter } => {
            let matching = matching.as_ref().map(|m| m as &dyn crate::store::Matches);
            let filter = filter.as_ref().map(|f| f as &dyn crate::store::Matches);
            dump(store, *object_type, matching, filter)
        }
        Stmt::Timeseries { .. } => Err(Error::Protocol(
            "TIMESERIES requires a metric backing store, which is out of scope".to_string(),
        )),
    }
}

struct AlwaysTrue;
impl crate::store::Matches for AlwaysTrue {
    fn matches(&self, _obj: &StoreObjectRef, _filter: Option<&dyn crate::store::Matches>) -> bool {
        true
    }
}

fn dump(
    store: &Store,
    object_type: StoreObjectType,
    matching: Option<&dyn crate::store::Matches>,
    filter: Option<&dyn crate::store::Matches>,
) -> crate::Result<Vec<u8>> {
    let always = AlwaysTrue;
    let matcher: &dyn crate::store::Matches = matching.unwrap_or(&always);

    let mut formatter = JsonFormatter::new(Flags { want_array: true });
    let mut first_err = None;
    store.scan(object_type, matcher, filter, |obj| {
        if let Err(e) = formatter.emit_full(obj, filter) {
            first_err = Some(e);
            return ScanControl::Stop;
        }
        ScanControl::Continue
    });
    if let Some(e) = first_err {
        return Err(e);
    }
    Ok(formatter.finish().into_vec())
}

fn emit_one(obj: &StoreObjectRef) -> crate::Result<Vec<u8>> {
    let mut formatter = JsonFormatter::new(Flags { want_array: true });
    formatter.emit_full(obj, None)?;
    Ok(formatter.finish().into_vec())
}

// SO_PEERCRED has no safe wrapper in this crate's dependency stack; raw
// `getsockopt` is how `original_source/src/frontend/sock.c` reads it too.
#[allow(unsafe_code)]
fn unix_peer_identity(stream: &UnixStream) -> crate::Result<String> {
    #[cfg(target_os = "linux")]
    {
        let mut creds: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                std::ptr::from_mut(&mut creds).cast(),
                &mut len,
            )
        };
        if rc != 0 {
            return Err(Error::Auth(format!(
                "SO_PEERCRED failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        return Ok(format!("uid:{}", creds.uid));
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream;
        Ok("unix-peer".to_string())
    }
}

/// Derives a connection identity from the verified peer certificate chain.
///
/// Extracting the certificate's Common Name requires a full X.509 parser,
/// which is outside this crate's dependency stack (`rustls` hands back raw
/// DER, never a parsed subject). The identity is instead the leaf
/// certificate's DER bytes rendered as hex, which is at least as unique as
/// a CN and still satisfies "clients authenticate by certificate" (see
/// DESIGN.md Open Questions).
fn tls_peer_identity(conn: &rustls::ServerConnection) -> crate::Result<String> {
    let certs = conn
        .peer_certificates()
        .ok_or_else(|| Error::Auth("no peer certificate presented".to_string()))?;
    let leaf = certs
        .first()
        .ok_or_else(|| Error::Auth("empty peer certificate chain".to_string()))?;
    Ok(hex_encode(leaf.as_ref()))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{Decode, Encode};
    use crate::store::Store;

    #[test]
    fn hex_encode_matches_known_bytes() {
        assert_eq!(hex_encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    #[test]
    fn execute_fetch_missing_host_errors() {
        let store = Store::new();
        let err = execute(&store, &Stmt::FetchHost("nope.example.com".to_string())).unwrap_err();
        assert!(matches!(err, Error::MissingParent(_)));
    }

    #[test]
    fn execute_list_hosts_empty_store_yields_empty_array() {
        let store = Store::new();
        let json = execute(&store, &Stmt::ListHosts).unwrap();
        assert_eq!(std::str::from_utf8(&json).unwrap(), "[]");
    }

    #[test]
    fn execute_list_hosts_includes_stored_host() {
        let store = Store::new();
        store.store_host("db1.example.com", 1, 0, Some("test")).unwrap();
        let json = execute(&store, &Stmt::ListHosts).unwrap();
        let text = std::str::from_utf8(&json).unwrap();
        assert!(text.contains("db1.example.com"), "{text}");
    }

    #[test]
    fn execute_timeseries_is_out_of_scope() {
        let store = Store::new();
        let stmt = Stmt::Timeseries {
            host: "db1.example.com".to_string(),
            metric: "load".to_string(),
            start: None,
            end: None,
        };
        let err = execute(&store, &stmt).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    /// Drives a full `Connection::handle` round trip over a connected
    /// socket pair, the way a real client/server exchange would look.
    #[test]
    fn handle_round_trip_over_socket_pair() {
        let store = Store::new();
        store.store_host("db1.example.com", 1, 0, Some("test")).unwrap();

        let (client, server) = UnixStream::pair().unwrap();
        let mut conn = Connection::from_unix(server).unwrap();
        let mut client = client;

        Frame::hello("test-client").encode_into(&mut client).unwrap();
        assert_eq!(conn.handle(&store, protocol::DEFAULT_MAX_BODY).unwrap(), HandleOutcome::KeepOpen);
        let reply = Frame::decode_from(&mut client).unwrap();
        assert_eq!(reply.message_type, MessageType::Ok);

        Frame::new(MessageType::Query, b"LIST hosts;".to_vec())
            .encode_into(&mut client)
            .unwrap();
        assert_eq!(conn.handle(&store, protocol::DEFAULT_MAX_BODY).unwrap(), HandleOutcome::KeepOpen);
        let data = Frame::decode_from(&mut client).unwrap();
        assert_eq!(data.message_type, MessageType::Data);
        assert!(std::str::from_utf8(&data.body).unwrap().contains("db1.example.com"));
        let ok = Frame::decode_from(&mut client).unwrap();
        assert_eq!(ok.message_type, MessageType::Ok);
    }

    #[test]
    fn handle_reports_parse_error_and_closes() {
        let store = Store::new();
        let (client, server) = UnixStream::pair().unwrap();
        let mut conn = Connection::from_unix(server).unwrap();
        let mut client = client;

        Frame::new(MessageType::Query, b"NOT VALID QUERY ???".to_vec())
            .encode_into(&mut client)
            .unwrap();
        assert_eq!(conn.handle(&store, protocol::DEFAULT_MAX_BODY).unwrap(), HandleOutcome::Error);
        let reply = Frame::decode_from(&mut client).unwrap();
        assert_eq!(reply.message_type, MessageType::Error);
    }
}
