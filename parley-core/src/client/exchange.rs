//! # The Exchange State Machine
//!
//! One in-flight call, modelled as an explicit finite-state [`Future`]
//! walking the transport's suspension points:
//!
//! ```text
//! Acquire -> Write -> AwaitReply -> ReadBody -> Done
//! ```
//!
//! `Done` is terminal and reachable directly from any state on error. Each
//! suspension point hands control back to the transport and is resumed by
//! exactly one wakeup; reads that complete without suspending are drained in
//! a tight loop inside a single `poll` to bound wakeup overhead.
//!
//! Both call paths drive this one machine: the synchronous path awaits it
//! inline on the calling task, the asynchronous path spawns it and collects
//! the outcome through a fires-once completion signal.

use crate::client::InvokeError;
use crate::client::options::FormatOptions;
use crate::client::request::Request;
use crate::observer::WireObserver;
use crate::serializer::Serializer;
use crate::transport::{
    BodyReader, Connection, Cookie, TransportError, TransportReply, WriteChannel,
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Initial scratch size when the content length is unknown.
const DEFAULT_READ_BUFFER: usize = 1024;

/// Everything the transport delivered for one call: status line, headers,
/// cookies, and the raw (still compressed, still encoded) body bytes.
#[derive(Debug, Clone)]
pub struct CompletedExchange {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    pub cookies: Vec<Cookie>,
    pub body: Bytes,
}

/// The response head, kept aside while the body is being read.
struct ReplyHead {
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
}

enum State {
    /// Waiting for the transport to grant a writable stream.
    Acquire(BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>>),
    /// Request bytes handed to the transport; waiting for the write to land.
    Writing(BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>>),
    /// Waiting for response status and headers.
    AwaitingReply(BoxFuture<'static, Result<TransportReply, TransportError>>),
    /// Incrementally reading the response body.
    ReadingBody(BodyPhase),
    Done,
}

/// One in-flight exchange. Created by the proxy once per call; exclusively
/// owned by that call.
pub(crate) struct ExchangeFuture {
    request: Request,
    serializer: Arc<dyn Serializer>,
    format: FormatOptions,
    observer: Option<Arc<dyn WireObserver>>,
    /// The serialized request, retained so the observer sees the exact bytes
    /// sent.
    wire_bytes: Option<Bytes>,
    head: Option<ReplyHead>,
    state: State,
}

impl ExchangeFuture {
    pub(crate) fn new(
        conn: Box<dyn Connection>,
        request: Request,
        serializer: Arc<dyn Serializer>,
        format: FormatOptions,
        observer: Option<Arc<dyn WireObserver>>,
    ) -> Self {
        Self {
            request,
            serializer,
            format,
            observer,
            wire_bytes: None,
            head: None,
            state: State::Acquire(conn.open_write_channel()),
        }
    }

    fn fail(&mut self, err: InvokeError) -> Poll<Result<CompletedExchange, InvokeError>> {
        self.state = State::Done;
        Poll::Ready(Err(err))
    }

    fn complete(&mut self, body: Vec<u8>) -> Poll<Result<CompletedExchange, InvokeError>> {
        self.state = State::Done;
        let head = self
            .head
            .take()
            .expect("reply head recorded before body completion");
        tracing::trace!(
            sequence = self.request.identity.sequence,
            status = %head.status,
            body_len = body.len(),
            "exchange completed"
        );
        Poll::Ready(Ok(CompletedExchange {
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            cookies: head.cookies,
            body: Bytes::from(body),
        }))
    }

    /// Records the reply head and enters the body phase, or completes
    /// immediately when the declared length is zero.
    fn enter_reply(
        &mut self,
        reply: TransportReply,
    ) -> Option<Poll<Result<CompletedExchange, InvokeError>>> {
        tracing::trace!(
            sequence = self.request.identity.sequence,
            status = %reply.status,
            content_length = ?reply.content_length,
            "response head received"
        );
        self.head = Some(ReplyHead {
            status: reply.status,
            reason: reply.reason,
            headers: reply.headers,
            cookies: reply.cookies,
        });
        if reply.content_length == Some(0) {
            return Some(self.complete(Vec::new()));
        }
        self.state = State::ReadingBody(BodyPhase::new(
            reply.body,
            reply.content_length.map(|n| n as usize),
        ));
        None
    }

    /// A transport failure that still carries a reply is adopted: its body
    /// is read and status translation deferred to decode time. Anything else
    /// terminates the exchange.
    fn adopt_or_fail(
        &mut self,
        err: TransportError,
    ) -> Option<Poll<Result<CompletedExchange, InvokeError>>> {
        match err.into_reply() {
            Ok(reply) => self.enter_reply(reply),
            Err(err) => Some(self.fail(err.into())),
        }
    }
}

impl Future for ExchangeFuture {
    type Output = Result<CompletedExchange, InvokeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Acquire(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(channel)) => {
                        let mut out = Vec::new();
                        if let Err(err) =
                            this.serializer
                                .serialize_request(&mut out, &this.request, &this.format)
                        {
                            return this.fail(err.into());
                        }
                        let bytes = Bytes::from(out);
                        this.wire_bytes = Some(bytes.clone());
                        this.state = State::Writing(channel.write(bytes));
                    }
                    Poll::Ready(Err(err)) => {
                        if let Some(outcome) = this.adopt_or_fail(err) {
                            return outcome;
                        }
                    }
                },
                State::Writing(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(channel)) => {
                        // The write phase completes fully, observer included,
                        // strictly before the response phase starts.
                        if let Some(observer) = &this.observer {
                            let bytes = this
                                .wire_bytes
                                .as_ref()
                                .expect("request serialized before write");
                            observer.on_request(&this.request.identity, bytes);
                        }
                        this.state = State::AwaitingReply(channel.into_reply());
                    }
                    Poll::Ready(Err(err)) => {
                        if let Some(outcome) = this.adopt_or_fail(err) {
                            return outcome;
                        }
                    }
                },
                State::AwaitingReply(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(reply)) => {
                        if let Some(outcome) = this.enter_reply(reply) {
                            return outcome;
                        }
                    }
                    Poll::Ready(Err(err)) => {
                        if let Some(outcome) = this.adopt_or_fail(err) {
                            return outcome;
                        }
                    }
                },
                State::ReadingBody(phase) => {
                    // Reads that complete synchronously are processed here
                    // without yielding; a suspending read returns control to
                    // the transport until its callback wakes us.
                    let outcome = loop {
                        phase.ensure_capacity();
                        match phase.reader.poll_read(cx, &mut phase.scratch) {
                            Poll::Pending => return Poll::Pending,
                            Poll::Ready(Err(err)) => break Err(err),
                            Poll::Ready(Ok(n)) => {
                                if let Some(body) = phase.consume(n) {
                                    break Ok(body);
                                }
                            }
                        }
                    };
                    match outcome {
                        Ok(body) => return this.complete(body),
                        Err(err) => return this.fail(err.into()),
                    }
                }
                State::Done => {
                    return this.fail(InvokeError::Transport(TransportError::new(
                        "exchange polled after completion",
                    )));
                }
            }
        }
    }
}

/// Body accumulation, mirroring the declared-length rules:
///
/// * known length: the scratch buffer is allocated to exactly that size once;
/// * unknown length: scratch starts at a default size and is replaced by a
///   larger one if a length becomes known;
/// * a single read equal to the full known length is adopted directly as the
///   final body, no copy;
/// * partial chunks append into a separate accumulation buffer;
/// * a zero-length read ends the stream.
struct BodyPhase {
    reader: Box<dyn BodyReader>,
    content_length: Option<usize>,
    scratch: Vec<u8>,
    buffered: Option<Vec<u8>>,
}

impl BodyPhase {
    fn new(reader: Box<dyn BodyReader>, content_length: Option<usize>) -> Self {
        Self {
            reader,
            content_length,
            scratch: Vec::new(),
            buffered: None,
        }
    }

    fn ensure_capacity(&mut self) {
        match self.content_length {
            Some(len) if self.scratch.len() < len => self.scratch = vec![0; len],
            None if self.scratch.is_empty() => self.scratch = vec![0; DEFAULT_READ_BUFFER],
            _ => {}
        }
    }

    /// Folds one read result into the accumulation state. Returns the final
    /// body once the stream is exhausted or fully delivered.
    fn consume(&mut self, n: usize) -> Option<Vec<u8>> {
        if n == 0 {
            return Some(self.buffered.take().unwrap_or_default());
        }
        if self.buffered.is_none() && self.content_length == Some(n) {
            // The whole body arrived in one read: adopt the scratch buffer
            // as-is instead of copying it.
            let mut body = std::mem::take(&mut self.scratch);
            body.truncate(n);
            return Some(body);
        }
        self.buffered
            .get_or_insert_with(|| Vec::with_capacity(self.scratch.len()))
            .extend_from_slice(&self.scratch[..n]);
        None
    }
}
