//! # Parley Client
//!
//! The proxy a caller invokes methods on. Each call resolves a local method
//! against the proxy's [`ServiceSchema`], builds an immutable request,
//! configures an outbound connection from a per-call snapshot of the
//! [`TransportOptions`], drives the exchange state machine, and decodes the
//! reply through the serializer collaborator.
//!
//! Two call paths share one exchange machine:
//!
//! * **[`ParleyClient::invoke`]** awaits the machine inline; the calling
//!   task is occupied for the whole exchange.
//! * **[`ParleyClient::begin_invoke`]** spawns the machine and returns an
//!   [`InvokeHandle`]; completion fires an optional callback and satisfies
//!   the handle's fires-once signal. [`ParleyClient::end_invoke`] waits on
//!   that signal, rethrows any captured error, and performs status check,
//!   decompression, decoding and observer delivery exactly like the inline
//!   path. A second `end_invoke` on the same handle fails with
//!   [`InvokeError::DuplicateCompletion`].
//!
//! Resolution and endpoint errors are raised synchronously, before any I/O.

pub mod exchange;
pub mod options;
pub mod request;
pub mod response;

use crate::observer::WireObserver;
use crate::schema::{ProtocolMethod, ResolveError, ServiceSchema};
use crate::serializer::{SerializeError, Serializer};
use crate::transport::{ConnectionOption, Cookie, Transport, TransportError};
use crate::value::{Fault, Value, ValueKind};
use bytes::Bytes;
use exchange::{CompletedExchange, ExchangeFuture};
use http::{HeaderMap, Method, Uri};
use options::TransportOptions;
use request::{CallIdentity, ProxyId, Request, SequenceCounter};
use response::{Decompressor, ReadResponseError, StatusError, check_status, read_response};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Content type identifying the text-based RPC payload.
pub const CONTENT_TYPE: &str = "text/xml";

/// Notified once when an asynchronous call completes, after the handle's
/// completion signal has been satisfied.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised while invoking a method through a [`ParleyClient`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// Neither the url option nor the schema's endpoint marker is set.
    /// Raised before any connection is opened.
    #[error("proxy endpoint marker or url option not set")]
    MissingEndpoint,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Transport status in the 400 range.
    #[error("client error: '{0}'")]
    ClientProtocol(String),
    /// Any other non-success transport status.
    #[error("server error: '{0}'")]
    ServerProtocol(String),
    /// The decoded response carried an application-level fault.
    #[error(transparent)]
    Fault(#[from] Fault),
    /// `end_invoke` called twice on one handle.
    #[error("duplicate call to end_invoke on one handle")]
    DuplicateCompletion,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Decompress(#[from] response::DecompressError),
}

impl From<StatusError> for InvokeError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::ClientProtocol(reason) => InvokeError::ClientProtocol(reason),
            StatusError::ServerProtocol(reason) => InvokeError::ServerProtocol(reason),
        }
    }
}

impl From<ReadResponseError> for InvokeError {
    fn from(err: ReadResponseError) -> Self {
        match err {
            ReadResponseError::Fault(fault) => InvokeError::Fault(fault),
            ReadResponseError::Serialize(err) => InvokeError::Serialize(err),
        }
    }
}

/// Headers and cookies recorded from the last completed exchange.
#[derive(Debug, Clone, Default)]
struct ResponseRecord {
    headers: HeaderMap,
    cookies: Vec<Cookie>,
}

/// The handle for one in-flight asynchronous call.
///
/// Holds the fires-once completion signal plus everything `end_invoke` needs
/// to finish the call. Consumed by the first successful `end_invoke`.
#[derive(Debug)]
pub struct InvokeHandle {
    completion: Option<oneshot::Receiver<Result<CompletedExchange, InvokeError>>>,
    identity: CallIdentity,
    method: ProtocolMethod,
    options: TransportOptions,
}

impl InvokeHandle {
    /// The identity correlating this call's request and response.
    pub fn identity(&self) -> CallIdentity {
        self.identity
    }
}

/// A call prepared up to the point where the exchange machine can run.
struct PreparedCall {
    exchange: ExchangeFuture,
    identity: CallIdentity,
    method: ProtocolMethod,
    options: TransportOptions,
}

/// A dynamic client for one remote XML-RPC service.
///
/// Generic over the transport and serializer collaborators. Multiple calls
/// may be in flight concurrently; each owns its state exclusively. The only
/// intentionally shared mutable resource is the cookie jar.
pub struct ParleyClient<T, S> {
    transport: T,
    serializer: Arc<S>,
    schema: Arc<ServiceSchema>,
    options: TransportOptions,
    observer: Option<Arc<dyn WireObserver>>,
    proxy_id: ProxyId,
    sequence: SequenceCounter,
    last_response: Mutex<Option<ResponseRecord>>,
}

impl<T, S> ParleyClient<T, S>
where
    T: Transport,
    S: Serializer + 'static,
{
    pub fn new(transport: T, serializer: S, schema: ServiceSchema) -> Self {
        Self {
            transport,
            serializer: Arc::new(serializer),
            schema: Arc::new(schema),
            options: TransportOptions::default(),
            observer: None,
            proxy_id: ProxyId::generate(),
            sequence: SequenceCounter::default(),
            last_response: Mutex::new(None),
        }
    }

    /// Registers the byte-capture observer for this proxy.
    pub fn with_observer(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The opaque token identifying this proxy instance.
    pub fn proxy_id(&self) -> ProxyId {
        self.proxy_id
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Mutable access to the proxy's options. Calls snapshot the options at
    /// start, so changes never affect calls already in flight.
    pub fn options_mut(&mut self) -> &mut TransportOptions {
        &mut self.options
    }

    pub fn schema(&self) -> &ServiceSchema {
        &self.schema
    }

    /// Headers recorded from the last completed exchange.
    pub fn response_headers(&self) -> Option<HeaderMap> {
        self.last_response
            .lock()
            .expect("response record lock poisoned")
            .as_ref()
            .map(|r| r.headers.clone())
    }

    /// Cookies recorded from the last completed exchange.
    pub fn response_cookies(&self) -> Option<Vec<Cookie>> {
        self.last_response
            .lock()
            .expect("response record lock poisoned")
            .as_ref()
            .map(|r| r.cookies.clone())
    }

    /// Invokes a method by local name, blocking the calling task for the
    /// whole exchange.
    pub async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, InvokeError> {
        let method = self.schema.resolve(method, &arguments)?.clone();
        self.invoke_method(&method, arguments).await
    }

    /// Invokes an already resolved method descriptor.
    pub async fn invoke_method(
        &self,
        method: &ProtocolMethod,
        arguments: Vec<Value>,
    ) -> Result<Value, InvokeError> {
        let call = self.start(method.clone(), arguments)?;
        let PreparedCall {
            exchange,
            identity,
            method,
            options,
        } = call;
        let outcome = exchange.await;
        self.finish(outcome, &method, identity, &options)
    }

    /// Begins an asynchronous call by local name.
    ///
    /// The exchange runs detached; the returned handle's completion signal is
    /// satisfied exactly once, after which the optional `callback` fires.
    /// Resolution and endpoint failures are still returned synchronously.
    pub fn begin_invoke(
        &self,
        method: &str,
        arguments: Vec<Value>,
        callback: Option<CompletionCallback>,
    ) -> Result<InvokeHandle, InvokeError> {
        let method = self.schema.resolve(method, &arguments)?.clone();
        self.begin_invoke_method(&method, arguments, callback)
    }

    /// Begins an asynchronous call on an already resolved descriptor.
    pub fn begin_invoke_method(
        &self,
        method: &ProtocolMethod,
        arguments: Vec<Value>,
        callback: Option<CompletionCallback>,
    ) -> Result<InvokeHandle, InvokeError> {
        let call = self.start(method.clone(), arguments)?;
        let PreparedCall {
            exchange,
            identity,
            method,
            options,
        } = call;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = exchange.await;
            // Satisfy the blocking waiter first, then notify the callback;
            // both observe completion exactly once.
            let _ = tx.send(outcome);
            if let Some(callback) = callback {
                callback();
            }
        });
        Ok(InvokeHandle {
            completion: Some(rx),
            identity,
            method,
            options,
        })
    }

    /// Waits for an asynchronous call to complete and produces its result.
    ///
    /// Rethrows any error captured during the exchange, then applies status
    /// validation, decompression, decoding and observer delivery exactly as
    /// the inline path does. The handle is consumed: a second call fails with
    /// [`InvokeError::DuplicateCompletion`] without waiting.
    pub async fn end_invoke(&self, handle: &mut InvokeHandle) -> Result<Value, InvokeError> {
        let Some(completion) = handle.completion.take() else {
            return Err(InvokeError::DuplicateCompletion);
        };
        let outcome = match completion.await {
            Ok(outcome) => outcome,
            Err(_) => Err(InvokeError::Transport(TransportError::new(
                "asynchronous call dropped before completion",
            ))),
        };
        self.finish(outcome, &handle.method, handle.identity, &handle.options)
    }

    /// Calls the built-in `system.listMethods` introspection method.
    pub async fn system_list_methods(&self) -> Result<Value, InvokeError> {
        self.invoke_method(&system_method("system.listMethods", vec![], ValueKind::Array), vec![])
            .await
    }

    /// Calls the built-in `system.methodSignature` introspection method.
    pub async fn system_method_signature(&self, method: &str) -> Result<Value, InvokeError> {
        self.invoke_method(
            &system_method(
                "system.methodSignature",
                vec![ValueKind::String],
                ValueKind::Array,
            ),
            vec![Value::from(method)],
        )
        .await
    }

    /// Calls the built-in `system.methodHelp` introspection method.
    pub async fn system_method_help(&self, method: &str) -> Result<Value, InvokeError> {
        self.invoke_method(
            &system_method(
                "system.methodHelp",
                vec![ValueKind::String],
                ValueKind::String,
            ),
            vec![Value::from(method)],
        )
        .await
    }

    /// Resolves the endpoint, builds the request, opens and configures the
    /// connection, and hands back the ready-to-run exchange. Everything that
    /// can fail before I/O fails here.
    fn start(
        &self,
        method: ProtocolMethod,
        arguments: Vec<Value>,
    ) -> Result<PreparedCall, InvokeError> {
        ServiceSchema::check_arguments(&arguments)?;
        let options = self.options.clone();
        let endpoint = self.effective_endpoint(&options)?;
        let identity = CallIdentity {
            proxy: self.proxy_id,
            sequence: self.sequence.next(),
        };
        let request = Request::build(
            &method,
            arguments,
            identity,
            options.protocol_method.as_deref(),
        );
        tracing::debug!(
            endpoint = %endpoint,
            method = %request.protocol_name,
            sequence = identity.sequence,
            "starting call"
        );

        let mut conn = self.transport.open(&endpoint)?;
        conn.configure(ConnectionOption::Method(Method::POST));
        conn.configure(ConnectionOption::ContentType(CONTENT_TYPE.to_string()));
        options.apply_to(conn.as_mut());

        let serializer: Arc<dyn Serializer> = self.serializer.clone();
        let exchange = ExchangeFuture::new(
            conn,
            request,
            serializer,
            options.format.clone(),
            self.observer.clone(),
        );
        Ok(PreparedCall {
            exchange,
            identity,
            method,
            options,
        })
    }

    /// The per-call url option takes precedence over the schema's endpoint
    /// marker; neither present fails before any connection is opened.
    fn effective_endpoint(&self, options: &TransportOptions) -> Result<Uri, InvokeError> {
        if let Some(url) = &options.url {
            return Ok(url.clone());
        }
        self.schema
            .endpoint()
            .cloned()
            .ok_or(InvokeError::MissingEndpoint)
    }

    /// The shared tail of both call paths: records headers and cookies,
    /// validates the status, decompresses and decodes, and delivers the raw
    /// wire bytes to the response observer after the decode attempt, so a
    /// decode failure still lets a later decode run over the captured bytes.
    fn finish(
        &self,
        outcome: Result<CompletedExchange, InvokeError>,
        method: &ProtocolMethod,
        identity: CallIdentity,
        options: &TransportOptions,
    ) -> Result<Value, InvokeError> {
        let exchange = outcome?;

        options.cookie_jar.store(&exchange.cookies);
        *self
            .last_response
            .lock()
            .expect("response record lock poisoned") = Some(ResponseRecord {
            headers: exchange.headers.clone(),
            cookies: exchange.cookies.clone(),
        });

        let raw: Bytes = exchange.body.clone();
        let result = self.decode(&exchange, method);
        if let Some(observer) = &self.observer {
            observer.on_response(&identity, &raw);
        }
        result
    }

    fn decode(
        &self,
        exchange: &CompletedExchange,
        method: &ProtocolMethod,
    ) -> Result<Value, InvokeError> {
        check_status(exchange.status, &exchange.reason)?;
        let decompressor = Decompressor::select(&exchange.headers);
        let value = if decompressor.is_passthrough() {
            read_response(self.serializer.as_ref(), &exchange.body, method.returns)?
        } else {
            let decompressed = decompressor.decompress(&exchange.body)?;
            read_response(self.serializer.as_ref(), &decompressed, method.returns)?
        };
        Ok(value)
    }
}

/// Descriptor for one of the protocol's built-in introspection methods.
fn system_method(protocol_name: &str, params: Vec<ValueKind>, returns: ValueKind) -> ProtocolMethod {
    ProtocolMethod {
        local_name: protocol_name.to_string(),
        protocol_name: protocol_name.to_string(),
        is_begin_variant: false,
        params,
        returns,
    }
}
