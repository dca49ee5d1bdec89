//! # Transport Options
//!
//! The per-proxy configuration a caller can adjust between calls. The proxy
//! snapshots the whole set (by `Clone`) at the start of every call, so
//! overlapping calls on one proxy each see a consistent, immutable view;
//! the only deliberately shared piece is the cookie jar.
//!
//! [`TransportOptions::apply_to`] pushes every recognized option onto an
//! outbound connection before it is used, a pure side-effecting
//! configuration step with no failure modes of its own.

use crate::transport::{
    Certificate, Connection, ConnectionOption, CookieJar, Credentials, ProxyServer,
};
use http::{Uri, Version};
use std::sync::Arc;
use std::time::Duration;

/// Value advertised when compression is enabled.
const ACCEPT_ENCODING: &str = "gzip,deflate";

/// Per-proxy transport configuration, snapshotted per call.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Explicit per-call endpoint; takes precedence over the schema's
    /// endpoint marker.
    pub url: Option<Uri>,
    pub user_agent: String,
    pub protocol_version: Version,
    pub keep_alive: bool,
    pub expect_continue: bool,
    pub follow_redirects: bool,
    pub timeout: Duration,
    pub connection_group: Option<String>,
    pub credentials: Option<Credentials>,
    pub pre_authenticate: bool,
    pub buffer_writes: bool,
    /// Advertise acceptance of gzip and deflate response encodings.
    pub enable_compression: bool,
    pub proxy_server: Option<ProxyServer>,
    pub headers: Vec<(String, String)>,
    pub client_certificates: Vec<Certificate>,
    /// Shared across calls on the same proxy by design.
    pub cookie_jar: Arc<CookieJar>,
    /// When set, replaces the resolved protocol method name for every call.
    pub protocol_method: Option<String>,
    /// Overrides the response text encoding assumed by the serializer.
    pub response_encoding: Option<String>,
    /// Formatting flags passed through to the serializer.
    pub format: FormatOptions,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            url: None,
            user_agent: "parley".to_string(),
            protocol_version: Version::HTTP_11,
            keep_alive: true,
            expect_continue: false,
            follow_redirects: true,
            timeout: Duration::from_secs(100),
            connection_group: None,
            credentials: None,
            pre_authenticate: false,
            buffer_writes: true,
            enable_compression: false,
            proxy_server: None,
            headers: Vec::new(),
            client_certificates: Vec::new(),
            cookie_jar: Arc::new(CookieJar::new()),
            protocol_method: None,
            response_encoding: None,
            format: FormatOptions::default(),
        }
    }
}

impl TransportOptions {
    /// Pushes every recognized option onto `conn`, enumerating the header and
    /// certificate collections individually.
    pub fn apply_to(&self, conn: &mut dyn Connection) {
        if let Some(proxy) = &self.proxy_server {
            conn.configure(ConnectionOption::ProxyServer(proxy.clone()));
        }
        conn.configure(ConnectionOption::UserAgent(self.user_agent.clone()));
        conn.configure(ConnectionOption::ProtocolVersion(self.protocol_version));
        conn.configure(ConnectionOption::KeepAlive(self.keep_alive));
        conn.configure(ConnectionOption::CookieStore(self.cookie_jar.clone()));
        conn.configure(ConnectionOption::ExpectContinue(self.expect_continue));
        conn.configure(ConnectionOption::FollowRedirects(self.follow_redirects));
        conn.configure(ConnectionOption::Timeout(self.timeout));
        if let Some(group) = &self.connection_group {
            conn.configure(ConnectionOption::ConnectionGroup(group.clone()));
        }
        if let Some(credentials) = &self.credentials {
            conn.configure(ConnectionOption::Credentials(credentials.clone()));
        }
        conn.configure(ConnectionOption::PreAuthenticate(self.pre_authenticate));
        conn.configure(ConnectionOption::BufferWrites(self.buffer_writes));
        if self.enable_compression {
            conn.configure(ConnectionOption::AcceptEncoding(ACCEPT_ENCODING.to_string()));
        }
        for (name, value) in &self.headers {
            conn.configure(ConnectionOption::Header(name.clone(), value.clone()));
        }
        for certificate in &self.client_certificates {
            conn.configure(ConnectionOption::ClientCertificate(certificate.clone()));
        }
    }
}

/// Formatting flags handed through to the serializer collaborator.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Overrides the request text encoding.
    pub encoding: Option<String>,
    pub use_indentation: bool,
    pub indentation: usize,
    pub use_int_tag: bool,
    pub use_string_tag: bool,
    pub use_empty_params_tag: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            use_indentation: true,
            indentation: 2,
            use_int_tag: false,
            use_string_tag: true,
            use_empty_params_tag: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, WriteChannel};
    use futures_util::future::BoxFuture;

    #[derive(Default)]
    struct RecordingConnection {
        seen: Vec<ConnectionOption>,
    }

    impl Connection for RecordingConnection {
        fn configure(&mut self, option: ConnectionOption) {
            self.seen.push(option);
        }

        fn open_write_channel(
            self: Box<Self>,
        ) -> BoxFuture<'static, Result<Box<dyn WriteChannel>, TransportError>> {
            unimplemented!("configuration-only test double")
        }
    }

    #[test]
    fn applies_every_recognized_option() {
        let mut options = TransportOptions::default();
        options.headers.push(("X-Trace".to_string(), "1".to_string()));
        options
            .client_certificates
            .push(Certificate(b"pem".to_vec()));
        options.connection_group = Some("pool-a".to_string());
        options.credentials = Some(Credentials {
            username: "u".to_string(),
            password: "p".to_string(),
        });

        let mut conn = RecordingConnection::default();
        options.apply_to(&mut conn);

        let seen = conn.seen;
        assert!(seen.iter().any(|o| matches!(o, ConnectionOption::UserAgent(ua) if ua == "parley")));
        assert!(seen.iter().any(|o| matches!(o, ConnectionOption::KeepAlive(true))));
        assert!(
            seen.iter()
                .any(|o| matches!(o, ConnectionOption::Timeout(t) if *t == Duration::from_secs(100)))
        );
        assert!(
            seen.iter()
                .any(|o| matches!(o, ConnectionOption::ConnectionGroup(g) if g == "pool-a"))
        );
        assert!(seen.iter().any(|o| matches!(o, ConnectionOption::Credentials(_))));
        assert!(
            seen.iter()
                .any(|o| matches!(o, ConnectionOption::Header(n, v) if n == "X-Trace" && v == "1"))
        );
        assert!(seen.iter().any(|o| matches!(o, ConnectionOption::ClientCertificate(_))));
        // Compression off by default: no Accept-Encoding advertisement.
        assert!(!seen.iter().any(|o| matches!(o, ConnectionOption::AcceptEncoding(_))));
    }

    #[test]
    fn compression_advertises_gzip_and_deflate() {
        let options = TransportOptions {
            enable_compression: true,
            ..TransportOptions::default()
        };
        let mut conn = RecordingConnection::default();
        options.apply_to(&mut conn);
        assert!(
            conn.seen
                .iter()
                .any(|o| matches!(o, ConnectionOption::AcceptEncoding(v) if v == "gzip,deflate"))
        );
    }
}
