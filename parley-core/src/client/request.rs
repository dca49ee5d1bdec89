//! # Request Construction
//!
//! Pure construction of the outbound protocol request: the per-proxy opaque
//! identity, the per-call sequence number, and the immutable [`Request`]
//! handed to the serializer. No I/O happens here.

use crate::schema::ProtocolMethod;
use crate::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// The opaque token identifying one proxy instance, generated at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyId(Uuid);

impl ProxyId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Correlates one request with its response for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallIdentity {
    /// The proxy the call was issued on.
    pub proxy: ProxyId,
    /// Strictly increasing within the proxy's lifetime; never reused.
    pub sequence: u64,
}

/// Issues per-call sequence numbers, starting at 1.
#[derive(Debug, Default)]
pub(crate) struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// One outbound protocol request.
///
/// Immutable once built; owned exclusively by the invocation that created it.
#[derive(Debug, Clone)]
pub struct Request {
    /// The wire-level procedure identifier.
    pub protocol_name: String,
    pub arguments: Vec<Value>,
    pub method: ProtocolMethod,
    pub identity: CallIdentity,
}

impl Request {
    /// Combines a resolved descriptor, arguments and a call identity.
    ///
    /// `override_name`, when present, replaces the descriptor's protocol name
    /// (the per-proxy protocol-method override option).
    pub fn build(
        method: &ProtocolMethod,
        arguments: Vec<Value>,
        identity: CallIdentity,
        override_name: Option<&str>,
    ) -> Self {
        let protocol_name = override_name
            .map(str::to_string)
            .unwrap_or_else(|| method.protocol_name.clone());
        Self {
            protocol_name,
            arguments,
            method: method.clone(),
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MethodSpec;
    use crate::schema::ServiceSchema;

    fn method() -> ProtocolMethod {
        ServiceSchema::builder()
            .method(MethodSpec::rpc_named("GetQuote", "getQuote"))
            .build()
            .expect("schema builds")
            .methods()[0]
            .clone()
    }

    #[test]
    fn sequence_numbers_are_strictly_increasing() {
        let counter = SequenceCounter::default();
        let issued: Vec<u64> = (0..100).map(|_| counter.next()).collect();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(issued.first(), Some(&1));
    }

    #[test]
    fn override_replaces_protocol_name() {
        let identity = CallIdentity {
            proxy: ProxyId::generate(),
            sequence: 1,
        };
        let request = Request::build(&method(), vec![], identity, Some("other.method"));
        assert_eq!(request.protocol_name, "other.method");
        let request = Request::build(&method(), vec![], identity, None);
        assert_eq!(request.protocol_name, "getQuote");
    }
}
