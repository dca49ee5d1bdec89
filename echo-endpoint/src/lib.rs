//! # Echo Endpoint
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide an in-memory
//! transport and a trivial serializer for integration testing `parley-core`.
//! It is not intended for production use.
//!
//! [`EchoTransport`] plays the server side of an exchange from a script of
//! queued [`Script`] entries; with an empty script it echoes the request
//! bytes back as a `200` reply. Everything the engine does to a connection
//! is recorded in an [`ActivityLog`] so tests can assert on configured
//! options, written bytes, and whether any I/O happened at all.
//!
//! [`LineSerializer`] is a stand-in for the out-of-scope XML grammar: one
//! line for the protocol method name, one line per argument.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use parley_core::client::options::FormatOptions;
use parley_core::client::request::Request;
use parley_core::serializer::{RpcResponse, SerializeError, Serializer};
use parley_core::transport::{
    BodyReader, Connection, ConnectionOption, Cookie, Transport, TransportError, TransportReply,
    WriteChannel,
};
use parley_core::value::{Fault, Value, ValueKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// One scripted response.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<Cookie>,
    /// Declared content length. Often differs from the chunk total on
    /// purpose, to exercise the unknown-length path.
    pub content_length: Option<u64>,
    /// Body chunks, delivered one per read.
    pub chunks: Vec<Vec<u8>>,
    /// Suspend (and immediately re-wake) between chunks, so the engine's
    /// suspension path gets exercised rather than its tight loop.
    pub yield_between_chunks: bool,
}

impl ScriptedReply {
    /// A `200 OK` reply with a known-length body delivered in one read.
    pub fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
            content_length: Some(body.len() as u64),
            chunks: vec![body.to_vec()],
            yield_between_chunks: false,
        }
    }

    /// A reply of unknown length delivered in the given chunks.
    pub fn chunked(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            content_length: None,
            chunks,
            ..Self::ok(b"")
        }
    }

    /// A reply with the given status line and empty body.
    pub fn status(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            content_length: Some(0),
            chunks: Vec::new(),
            ..Self::ok(b"")
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(Cookie {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.content_length = Some(body.len() as u64);
        self.chunks = vec![body.to_vec()];
        self
    }

    pub fn yielding(mut self) -> Self {
        self.yield_between_chunks = true;
        self
    }

    fn into_reply(self) -> TransportReply {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.append(
                name.parse::<http::header::HeaderName>().expect("header name"),
                value.parse().expect("header value"),
            );
        }
        TransportReply {
            status: StatusCode::from_u16(self.status).expect("status code"),
            reason: self.reason,
            headers,
            cookies: self.cookies,
            content_length: self.content_length,
            body: Box::new(ScriptedBody {
                chunks: self.chunks.into(),
                yield_between_chunks: self.yield_between_chunks,
                pending_yield: false,
            }),
        }
    }
}

/// One scripted transport behavior, consumed per call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with this reply.
    Reply(ScriptedReply),
    /// Fail while awaiting the reply, optionally still carrying one (the
    /// server answered, the transport complained).
    Fail {
        message: String,
        reply: Option<ScriptedReply>,
    },
    /// Fail during the write phase.
    FailOnWrite { message: String },
}

/// Everything the engine did to this transport.
#[derive(Debug, Default)]
pub struct ActivityLog {
    pub opens: AtomicUsize,
    /// Debug renderings of every configured option, in application order.
    pub options: Mutex<Vec<String>>,
    /// The exact bytes of every request written.
    pub written: Mutex<Vec<Vec<u8>>>,
}

impl ActivityLog {
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> Vec<String> {
        self.options.lock().expect("options lock").clone()
    }

    pub fn written_requests(&self) -> Vec<Vec<u8>> {
        self.written.lock().expect("written lock").clone()
    }
}

/// An in-memory transport driven by a script.
#[derive(Debug, Default)]
pub struct EchoTransport {
    script: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<ActivityLog>,
}

impl EchoTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next scripted behavior.
    pub fn push(&self, script: Script) {
        self.script.lock().expect("script lock").push_back(script);
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.push(Script::Reply(reply));
    }

    pub fn log(&self) -> Arc<ActivityLog> {
        self.log.clone()
    }
}

impl Transport for EchoTransport {
    fn open(&self, _endpoint: &http::Uri) -> Result<Box<dyn Connection>, TransportError> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EchoConnection {
            script: self.script.clone(),
            log: self.log.clone(),
        }))
    }
}

struct EchoConnection {
    script: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<ActivityLog>,
}

impl Connection for EchoConnection {
    fn configure(&mut self, option: ConnectionOption) {
        self.log
            .options
            .lock()
            .expect("options lock")
            .push(format!("{option:?}"));
    }

    fn open_write_channel(
        self: Box<Self>,
    ) -> BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>> {
        Box::pin(async move {
            Ok(Box::new(EchoWriteChannel {
                script: self.script,
                log: self.log,
                written: None,
            }) as Box<dyn WriteChannel>)
        })
    }
}

struct EchoWriteChannel {
    script: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<ActivityLog>,
    written: Option<Bytes>,
}

impl WriteChannel for EchoWriteChannel {
    fn write(
        mut self: Box<Self>,
        body: Bytes,
    ) -> BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>> {
        Box::pin(async move {
            let write_failure = {
                let mut script = self.script.lock().expect("script lock");
                if matches!(script.front(), Some(Script::FailOnWrite { .. })) {
                    match script.pop_front() {
                        Some(Script::FailOnWrite { message }) => Some(message),
                        _ => None,
                    }
                } else {
                    None
                }
            };
            if let Some(message) = write_failure {
                return Err(TransportError::new(message));
            }
            self.log
                .written
                .lock()
                .expect("written lock")
                .push(body.to_vec());
            self.written = Some(body);
            Ok(self as Box<dyn WriteChannel>)
        })
    }

    fn into_reply(self: Box<Self>) -> BoxFuture<'static, Result<TransportReply, TransportError>> {
        Box::pin(async move {
            let next = self.script.lock().expect("script lock").pop_front();
            match next {
                Some(Script::Reply(reply)) => Ok(reply.into_reply()),
                Some(Script::Fail { message, reply }) => {
                    let mut err = TransportError::new(message);
                    if let Some(reply) = reply {
                        err = err.with_reply(reply.into_reply());
                    }
                    Err(err)
                }
                Some(Script::FailOnWrite { message }) => Err(TransportError::new(message)),
                // No script queued: echo the request back.
                None => {
                    let body = self.written.map(|b| b.to_vec()).unwrap_or_default();
                    Ok(ScriptedReply::ok(&body).into_reply())
                }
            }
        })
    }
}

struct ScriptedBody {
    chunks: VecDeque<Vec<u8>>,
    yield_between_chunks: bool,
    pending_yield: bool,
}

impl BodyReader for ScriptedBody {
    fn poll_read(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize, TransportError>> {
        if self.pending_yield {
            self.pending_yield = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        match self.chunks.pop_front() {
            None => Poll::Ready(Ok(0)),
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.chunks.push_front(chunk[n..].to_vec());
                }
                if self.yield_between_chunks {
                    self.pending_yield = true;
                }
                Poll::Ready(Ok(n))
            }
        }
    }
}

/// A line-oriented stand-in for the XML wire grammar.
///
/// Requests serialize as the protocol method name followed by one rendered
/// argument per line. Responses starting with `fault <code> <message>`
/// decode as faults; anything else decodes as a value shaped by the
/// expected kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineSerializer;

fn render(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Double(v) => v.to_string(),
        Value::DateTime(v) => v.clone(),
        Value::Base64(v) => format!("base64[{}]", v.len()),
        Value::Struct(members) => format!("struct[{}]", members.len()),
        Value::Array(items) => format!("array[{}]", items.len()),
        Value::Nil => "nil".to_string(),
    }
}

impl Serializer for LineSerializer {
    fn serialize_request(
        &self,
        out: &mut Vec<u8>,
        request: &Request,
        _format: &FormatOptions,
    ) -> Result<(), SerializeError> {
        out.extend_from_slice(request.protocol_name.as_bytes());
        out.push(b'\n');
        for argument in &request.arguments {
            out.extend_from_slice(render(argument).as_bytes());
            out.push(b'\n');
        }
        Ok(())
    }

    fn deserialize_response(
        &self,
        bytes: &[u8],
        expected: ValueKind,
    ) -> Result<RpcResponse, SerializeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SerializeError::Response(e.to_string()))?
            .trim_end_matches('\n');
        if let Some(rest) = text.strip_prefix("fault ") {
            let (code, message) = rest
                .split_once(' ')
                .ok_or_else(|| SerializeError::Response("malformed fault".to_string()))?;
            let code = code
                .parse()
                .map_err(|_| SerializeError::Response("malformed fault code".to_string()))?;
            return Ok(RpcResponse::fault(Fault {
                code,
                message: message.to_string(),
            }));
        }
        let value = match expected {
            ValueKind::Int => Value::Int(
                text.parse()
                    .map_err(|_| SerializeError::Response("expected an integer".to_string()))?,
            ),
            ValueKind::Bool => Value::Bool(
                text.parse()
                    .map_err(|_| SerializeError::Response("expected a boolean".to_string()))?,
            ),
            ValueKind::Double => Value::Double(
                text.parse()
                    .map_err(|_| SerializeError::Response("expected a double".to_string()))?,
            ),
            ValueKind::Array => Value::Array(
                text.lines()
                    .map(|line| Value::String(line.to_string()))
                    .collect(),
            ),
            _ => Value::String(text.to_string()),
        };
        Ok(RpcResponse::value(value))
    }
}
