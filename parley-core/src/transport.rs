//! # Transport Collaborator Contract
//!
//! The black-box request/response channel the invocation engine drives. The
//! engine never opens sockets itself; it asks a [`Transport`] for a
//! connection handle, pushes configuration onto it, and then walks the
//! exchange through its suspension points:
//!
//! 1. [`Connection::open_write_channel`]: suspends until the transport
//!    grants a writable stream.
//! 2. [`WriteChannel::write`]: suspends until the request bytes are sent.
//! 3. [`WriteChannel::into_reply`]: suspends until status and headers
//!    arrive.
//! 4. [`BodyReader::poll_read`]: repeated suspend/resume cycle delivering
//!    body chunks. Poll-style so that reads which complete without actually
//!    suspending can be drained in a tight loop.
//!
//! A transport failure that nonetheless carries a usable response (a
//! non-success status with a body, say) attaches the reply to the
//! [`TransportError`]; the engine adopts it and defers status translation to
//! decode time.

use crate::BoxError;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

/// Opens connection handles towards an endpoint.
///
/// Creating the handle performs no I/O; the connection is established lazily
/// when the write channel is acquired. Connection reuse, DNS, TLS and HTTP
/// framing are entirely the implementor's business.
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &Uri) -> Result<Box<dyn Connection>, TransportError>;
}

/// An unopened outbound connection being configured.
pub trait Connection: Send {
    /// Pushes one recognized option onto the connection.
    fn configure(&mut self, option: ConnectionOption);

    /// Suspends until the transport grants a writable stream.
    fn open_write_channel(
        self: Box<Self>,
    ) -> BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>>;
}

/// A granted writable stream.
pub trait WriteChannel: Send {
    /// Sends the request body. Resolves once the bytes are handed off.
    fn write(
        self: Box<Self>,
        body: Bytes,
    ) -> BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>>;

    /// Suspends until the response status and headers arrive.
    fn into_reply(self: Box<Self>) -> BoxFuture<'static, Result<TransportReply, TransportError>>;
}

/// An incrementally readable response body.
pub trait BodyReader: Send {
    /// Reads the next chunk into `buf`.
    ///
    /// `Ok(0)` signals end of stream. A `Poll::Ready` result means the read
    /// completed without suspending; `Poll::Pending` hands control back to
    /// the transport until its callback wakes the task.
    fn poll_read(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize, TransportError>>;
}

/// The head of a transport response plus its readable body.
pub struct TransportReply {
    pub status: StatusCode,
    /// The status reason phrase as sent by the server (which may differ from
    /// the canonical phrase for the code).
    pub reason: String,
    pub headers: HeaderMap,
    pub cookies: Vec<Cookie>,
    /// Declared content length; `None` when unknown (chunked delivery).
    pub content_length: Option<u64>,
    pub body: Box<dyn BodyReader>,
}

impl fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportReply")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A single configuration directive pushed onto a [`Connection`].
///
/// The engine enumerates the per-call option snapshot into these; transports
/// honor what they recognize.
#[derive(Debug, Clone)]
pub enum ConnectionOption {
    Method(Method),
    ContentType(String),
    Header(String, String),
    UserAgent(String),
    ProtocolVersion(Version),
    KeepAlive(bool),
    CookieStore(Arc<CookieJar>),
    ExpectContinue(bool),
    FollowRedirects(bool),
    Timeout(Duration),
    ConnectionGroup(String),
    Credentials(Credentials),
    PreAuthenticate(bool),
    BufferWrites(bool),
    AcceptEncoding(String),
    ProxyServer(ProxyServer),
    ClientCertificate(Certificate),
}

/// Username/password credentials for the endpoint or an intermediary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// An intermediary proxy server to route the connection through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyServer {
    pub uri: Uri,
    pub credentials: Option<Credentials>,
}

/// A client certificate in PEM form, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate(pub Vec<u8>);

/// A response cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// The conversation-scoped cookie store shared across calls on one proxy.
///
/// Deliberately not an invariant-protected structure: overlapping calls share
/// it by design, and callers that mutate it concurrently serialize access
/// themselves.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records cookies from a response, replacing same-named entries.
    pub fn store(&self, incoming: &[Cookie]) {
        let mut cookies = self.cookies.lock().expect("cookie jar lock poisoned");
        for cookie in incoming {
            match cookies.iter_mut().find(|c| c.name == cookie.name) {
                Some(existing) => existing.value = cookie.value.clone(),
                None => cookies.push(cookie.clone()),
            }
        }
    }

    /// A snapshot of the stored cookies.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().expect("cookie jar lock poisoned").clone()
    }
}

/// A failure in the underlying request/response channel.
///
/// May carry the reply the server managed to produce; the engine reads its
/// body and defers status translation rather than failing the exchange
/// outright.
#[derive(Debug, thiserror::Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<BoxError>,
    reply: Option<TransportReply>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            reply: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
            reply: None,
        }
    }

    /// Attaches the reply the server produced despite the failure.
    pub fn with_reply(mut self, reply: TransportReply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Extracts the attached reply, or gives the error back unchanged.
    pub fn into_reply(mut self) -> Result<TransportReply, Self> {
        match self.reply.take() {
            Some(reply) => Ok(reply),
            None => Err(self),
        }
    }
}
