//! # Serializer Collaborator Contract
//!
//! The wire grammar, how requests and responses are spelled as XML, is
//! owned by an external [`Serializer`], exactly as the engine treats the
//! transport stack. The engine hands it a built [`Request`] together with the
//! per-call formatting flags and a byte buffer to fill; on the way back it
//! hands over the (already decompressed) response bytes and the expected
//! return kind and receives an [`RpcResponse`], which either carries the
//! return value or an application-level [`crate::value::Fault`].

use crate::client::options::FormatOptions;
use crate::client::request::Request;
use crate::value::{Fault, Value, ValueKind};

/// Encodes requests and decodes responses.
pub trait Serializer: Send + Sync {
    /// Serializes `request` into `out` using the supplied formatting flags.
    fn serialize_request(
        &self,
        out: &mut Vec<u8>,
        request: &Request,
        format: &FormatOptions,
    ) -> Result<(), SerializeError>;

    /// Decodes a response body, shaping the return value as `expected`.
    fn deserialize_response(
        &self,
        bytes: &[u8],
        expected: ValueKind,
    ) -> Result<RpcResponse, SerializeError>;
}

/// A decoded protocol response.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub return_value: Value,
    /// A non-empty fault means the server answered with an application-level
    /// error instead of a return value.
    pub fault: Option<Fault>,
}

impl RpcResponse {
    pub fn value(return_value: Value) -> Self {
        Self {
            return_value,
            fault: None,
        }
    }

    pub fn fault(fault: Fault) -> Self {
        Self {
            return_value: Value::Nil,
            fault: Some(fault),
        }
    }
}

/// Errors raised by a [`Serializer`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("failed to serialize request: '{0}'")]
    Request(String),
    #[error("failed to deserialize response: '{0}'")]
    Response(String),
}
