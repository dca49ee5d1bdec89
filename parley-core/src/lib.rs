//! # Parley Core
//!
//! `parley-core` is a client-side runtime for XML-RPC: it lets a caller
//! invoke methods on a local proxy and have each call translated into a
//! protocol request, sent over a request/response transport, and its reply
//! translated back into a typed [`value::Value`], either inline on the
//! calling task or detached with begin/end completion.
//!
//! ## Key Components
//!
//! * **[`ParleyClient`]:** The main entry point. It resolves local calls
//!   against a [`schema::ServiceSchema`] descriptor table, builds and
//!   configures the outbound request, and drives the exchange through the
//!   transport collaborator.
//! * **[`schema::ServiceSchema`]:** The per-proxy descriptor table mapping
//!   local method signatures to wire-level protocol names, built once from
//!   declarative per-method markers.
//! * **[`transport::Transport`] & [`serializer::Serializer`]:** The two
//!   external collaborators. The transport is the black-box
//!   request/response channel (connections, TLS, framing); the serializer
//!   owns the XML wire grammar. The engine itself performs no socket I/O
//!   and spells no XML.
//!
//! ## Call paths
//!
//! A synchronous call ([`ParleyClient::invoke`]) occupies the calling task
//! for the whole exchange. An asynchronous call
//! ([`ParleyClient::begin_invoke`] / [`ParleyClient::end_invoke`]) runs the
//! same multi-phase exchange detached (acquire write channel, serialize,
//! send, await status, incrementally read a body of possibly unknown
//! length) and completes exactly once, satisfying both an optional callback
//! and the blocking-wait handle.
//!
//! ## Observers
//!
//! An optional [`observer::WireObserver`] receives the exact request and
//! response wire bytes per call, correlated by
//! [`client::request::CallIdentity`]; unregistered observers cost nothing.

pub mod client;
pub mod observer;
pub mod schema;
pub mod serializer;
pub mod transport;
pub mod value;

pub use client::{InvokeError, InvokeHandle, ParleyClient};

/// Type alias for the standard boxed error used in generic bounds.
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
