//! # Service Schema & Method Resolution
//!
//! Maps local method calls to protocol method descriptors.
//!
//! A [`ServiceSchema`] is a descriptor table built once per proxy type from
//! declarative per-method metadata ([`MethodSpec`]). Protocol-name derivation
//! happens at table construction: an explicit marker name wins, a plain
//! marker without a name defaults to the local method name, and an unnamed
//! begin marker strips the fixed `Begin` prefix from the local name. Per-call
//! resolution is then a pure lookup over the table: arguments are checked for
//! the (illegal) absent value, overloads are matched by the runtime kinds of
//! the supplied arguments, and a name-only retry classifies the failure.
//!
//! Resolution failures are local, synchronous, and cheap; they never reach
//! the transport layer.

use crate::value::{Value, ValueKind};
use http::Uri;

/// Local name prefix identifying the begin half of an asynchronous pairing.
const BEGIN_PREFIX: &str = "Begin";

/// Declarative metadata attached to one exposed method.
#[derive(Debug, Clone)]
pub enum MethodMarker {
    /// A plain protocol method. `None` means "use the local method name".
    Rpc(Option<String>),
    /// The begin variant of an asynchronous pairing. `None` means "derive by
    /// stripping the `Begin` prefix from the local name".
    Begin(Option<String>),
}

/// The declared signature of one exposed method, prior to schema construction.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub local_name: String,
    pub marker: Option<MethodMarker>,
    pub params: Vec<ValueKind>,
    pub returns: ValueKind,
}

impl MethodSpec {
    /// A method carrying a plain marker without an explicit protocol name.
    pub fn rpc(local_name: &str) -> Self {
        Self {
            local_name: local_name.to_string(),
            marker: Some(MethodMarker::Rpc(None)),
            params: Vec::new(),
            returns: ValueKind::String,
        }
    }

    /// A method carrying a plain marker with an explicit protocol name.
    pub fn rpc_named(local_name: &str, protocol_name: &str) -> Self {
        Self {
            marker: Some(MethodMarker::Rpc(Some(protocol_name.to_string()))),
            ..Self::rpc(local_name)
        }
    }

    /// A begin-variant method without an explicit protocol name.
    pub fn begin(local_name: &str) -> Self {
        Self {
            marker: Some(MethodMarker::Begin(None)),
            ..Self::rpc(local_name)
        }
    }

    /// A begin-variant method with an explicit protocol name.
    pub fn begin_named(local_name: &str, protocol_name: &str) -> Self {
        Self {
            marker: Some(MethodMarker::Begin(Some(protocol_name.to_string()))),
            ..Self::rpc(local_name)
        }
    }

    /// A method carrying no marker at all. Fails schema construction; exists
    /// so callers get the failure at build time rather than silently.
    pub fn unmarked(local_name: &str) -> Self {
        Self {
            marker: None,
            ..Self::rpc(local_name)
        }
    }

    /// Sets the parameter kinds of this signature.
    pub fn params(mut self, params: impl Into<Vec<ValueKind>>) -> Self {
        self.params = params.into();
        self
    }

    /// Sets the return kind of this signature.
    pub fn returns(mut self, returns: ValueKind) -> Self {
        self.returns = returns;
        self
    }
}

/// A resolved mapping from a local method to its wire-level identity.
///
/// Derived once at schema construction and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ProtocolMethod {
    pub local_name: String,
    pub protocol_name: String,
    pub is_begin_variant: bool,
    pub params: Vec<ValueKind>,
    pub returns: ValueKind,
}

/// Errors raised while building a [`ServiceSchema`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("method '{0}' carries neither an rpc nor a begin marker")]
    MissingProtocolName(String),
    #[error("method '{0}' has an invalid signature for a begin method")]
    InvalidBeginSignature(String),
}

/// Errors raised while resolving a call against a [`ServiceSchema`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("null arguments are invalid")]
    NullArgument,
    #[error("invoke on non-existent method '{0}'")]
    UnknownMethod(String),
    #[error("method parameters match the signature of more than one method called '{0}'")]
    AmbiguousOverload(String),
    #[error("method parameters do not match the signature of any method called '{0}'")]
    ParameterMismatch(String),
}

/// The descriptor table for one proxy type.
///
/// Holds the resolved [`ProtocolMethod`] records and the optional per-type
/// endpoint marker. Immutable once built.
#[derive(Debug, Clone)]
pub struct ServiceSchema {
    endpoint: Option<Uri>,
    methods: Vec<ProtocolMethod>,
}

impl ServiceSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// The endpoint declared on the proxy type, if any.
    pub fn endpoint(&self) -> Option<&Uri> {
        self.endpoint.as_ref()
    }

    /// All methods in this schema, in declaration order.
    pub fn methods(&self) -> &[ProtocolMethod] {
        &self.methods
    }

    /// Rejects argument lists containing the absent value.
    ///
    /// The protocol's value model has no null primitive, so this fails before
    /// any other resolution work happens.
    pub fn check_arguments(arguments: &[Value]) -> Result<(), ResolveError> {
        if arguments.iter().any(|a| matches!(a, Value::Nil)) {
            return Err(ResolveError::NullArgument);
        }
        Ok(())
    }

    /// Resolves a call by local method name and argument values.
    ///
    /// Attempts an overload lookup using the runtime kind of each supplied
    /// argument; exactly one exact match wins. Otherwise the lookup is
    /// retried by name only to classify the failure: no candidate is
    /// [`ResolveError::UnknownMethod`], several are
    /// [`ResolveError::AmbiguousOverload`], and a single candidate whose
    /// signature does not fit is [`ResolveError::ParameterMismatch`].
    pub fn resolve(
        &self,
        local_name: &str,
        arguments: &[Value],
    ) -> Result<&ProtocolMethod, ResolveError> {
        Self::check_arguments(arguments)?;

        let kinds: Vec<ValueKind> = arguments.iter().map(Value::kind).collect();
        let mut exact = self
            .methods
            .iter()
            .filter(|m| m.local_name == local_name && m.params == kinds);
        if let Some(method) = exact.next() {
            if exact.next().is_none() {
                return Ok(method);
            }
            return Err(ResolveError::AmbiguousOverload(local_name.to_string()));
        }

        let by_name: Vec<&ProtocolMethod> = self
            .methods
            .iter()
            .filter(|m| m.local_name == local_name)
            .collect();
        match by_name.len() {
            0 => Err(ResolveError::UnknownMethod(local_name.to_string())),
            1 => Err(ResolveError::ParameterMismatch(local_name.to_string())),
            _ => Err(ResolveError::AmbiguousOverload(local_name.to_string())),
        }
    }
}

/// Builds a [`ServiceSchema`], deriving protocol names from the declared
/// markers.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    endpoint: Option<Uri>,
    specs: Vec<MethodSpec>,
}

impl SchemaBuilder {
    /// Declares the per-type endpoint marker.
    pub fn endpoint(mut self, endpoint: Uri) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Declares one exposed method.
    pub fn method(mut self, spec: MethodSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<ServiceSchema, SchemaError> {
        let methods = self
            .specs
            .into_iter()
            .map(resolve_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ServiceSchema {
            endpoint: self.endpoint,
            methods,
        })
    }
}

/// Derives the wire-level identity of one declared method.
fn resolve_spec(spec: MethodSpec) -> Result<ProtocolMethod, SchemaError> {
    let (protocol_name, is_begin_variant) = match &spec.marker {
        Some(MethodMarker::Begin(Some(name))) => (name.clone(), true),
        Some(MethodMarker::Begin(None)) => {
            let stripped = spec
                .local_name
                .strip_prefix(BEGIN_PREFIX)
                .filter(|rest| !rest.is_empty())
                .ok_or_else(|| SchemaError::InvalidBeginSignature(spec.local_name.clone()))?;
            (stripped.to_string(), true)
        }
        Some(MethodMarker::Rpc(Some(name))) => (name.clone(), false),
        Some(MethodMarker::Rpc(None)) => (spec.local_name.clone(), false),
        None => return Err(SchemaError::MissingProtocolName(spec.local_name)),
    };
    Ok(ProtocolMethod {
        local_name: spec.local_name,
        protocol_name,
        is_begin_variant,
        params: spec.params,
        returns: spec.returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(specs: Vec<MethodSpec>) -> ServiceSchema {
        let mut builder = ServiceSchema::builder();
        for spec in specs {
            builder = builder.method(spec);
        }
        builder.build().expect("schema builds")
    }

    #[test]
    fn explicit_protocol_name_wins_over_local_name() {
        let schema = schema(vec![MethodSpec::rpc_named("ListMethods", "system.listMethods")]);
        let method = schema.resolve("ListMethods", &[]).expect("resolves");
        assert_eq!(method.protocol_name, "system.listMethods");
        assert!(!method.is_begin_variant);
    }

    #[test]
    fn plain_marker_defaults_to_local_name() {
        let schema = schema(vec![MethodSpec::rpc("getQuote").params([ValueKind::String])]);
        let method = schema
            .resolve("getQuote", &[Value::from("IBM")])
            .expect("resolves");
        assert_eq!(method.protocol_name, "getQuote");
    }

    #[test]
    fn empty_begin_marker_strips_prefix() {
        let schema = schema(vec![MethodSpec::begin("BeginGetQuote")]);
        let method = schema.resolve("BeginGetQuote", &[]).expect("resolves");
        assert_eq!(method.protocol_name, "GetQuote");
        assert!(method.is_begin_variant);
    }

    #[test]
    fn begin_marker_with_explicit_name_keeps_it() {
        let schema = schema(vec![MethodSpec::begin_named("StartQuote", "getQuote")]);
        let method = schema.resolve("StartQuote", &[]).expect("resolves");
        assert_eq!(method.protocol_name, "getQuote");
        assert!(method.is_begin_variant);
    }

    #[test]
    fn begin_marker_requires_prefix_and_suffix() {
        for local in ["GetQuote", "Begin"] {
            let err = ServiceSchema::builder()
                .method(MethodSpec::begin(local))
                .build()
                .expect_err("invalid begin signature");
            assert!(matches!(err, SchemaError::InvalidBeginSignature(name) if name == local));
        }
    }

    #[test]
    fn unmarked_method_fails_construction() {
        let err = ServiceSchema::builder()
            .method(MethodSpec::unmarked("Orphan"))
            .build()
            .expect_err("missing marker");
        assert!(matches!(err, SchemaError::MissingProtocolName(name) if name == "Orphan"));
    }

    #[test]
    fn exact_kind_match_selects_one_overload() {
        let schema = schema(vec![
            MethodSpec::rpc("echo").params([ValueKind::Int]),
            MethodSpec::rpc("echo").params([ValueKind::String]),
        ]);
        let method = schema
            .resolve("echo", &[Value::from("text")])
            .expect("resolves");
        assert_eq!(method.params, vec![ValueKind::String]);
    }

    #[test]
    fn two_candidates_without_exact_match_are_ambiguous() {
        let schema = schema(vec![
            MethodSpec::rpc("echo").params([ValueKind::Int]),
            MethodSpec::rpc("echo").params([ValueKind::String]),
        ]);
        let err = schema
            .resolve("echo", &[Value::Bool(true)])
            .expect_err("no exact match");
        assert!(matches!(err, ResolveError::AmbiguousOverload(name) if name == "echo"));
    }

    #[test]
    fn single_candidate_with_wrong_kinds_is_a_parameter_mismatch() {
        let schema = schema(vec![MethodSpec::rpc("echo").params([ValueKind::Int])]);
        let err = schema
            .resolve("echo", &[Value::from("nope")])
            .expect_err("kind mismatch");
        assert!(matches!(err, ResolveError::ParameterMismatch(name) if name == "echo"));
    }

    #[test]
    fn missing_method_is_unknown() {
        let schema = schema(vec![MethodSpec::rpc("echo")]);
        let err = schema.resolve("nosuch", &[]).expect_err("unknown");
        assert!(matches!(err, ResolveError::UnknownMethod(name) if name == "nosuch"));
    }

    #[test]
    fn nil_argument_is_rejected_before_lookup() {
        let schema = schema(vec![MethodSpec::rpc("echo").params([ValueKind::String])]);
        let err = schema
            .resolve("echo", &[Value::Nil])
            .expect_err("nil argument");
        assert!(matches!(err, ResolveError::NullArgument));
    }
}
