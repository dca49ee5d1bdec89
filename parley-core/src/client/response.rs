//! # Response Reading
//!
//! Pure functions over a completed transport exchange: validating the status
//! line, selecting a decompression filter from the `Content-Encoding` header,
//! and delegating decoding to the serializer collaborator.

use crate::serializer::{SerializeError, Serializer};
use crate::value::{Fault, Value, ValueKind};
use flate2::read::{DeflateDecoder, GzDecoder};
use http::{HeaderMap, StatusCode, header};
use std::io::Read;

/// A non-success transport status, translated by origin.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// Status in the 400 range: the caller did something wrong.
    #[error("client error: '{0}'")]
    ClientProtocol(String),
    /// Any other non-success status. Server *application* errors are not
    /// reported this way; they arrive as fault responses.
    #[error("server error: '{0}'")]
    ServerProtocol(String),
}

/// Validates the transport status: `2xx` proceeds, `400` is the caller's
/// fault, anything else non-success is the server's.
pub fn check_status(status: StatusCode, reason: &str) -> Result<(), StatusError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::BAD_REQUEST {
        Err(StatusError::ClientProtocol(reason.to_string()))
    } else {
        Err(StatusError::ServerProtocol(reason.to_string()))
    }
}

/// The decompression filter selected for a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decompressor {
    Passthrough,
    Gzip,
    Deflate,
}

/// Failure while running a response body through a decompression filter.
#[derive(Debug, thiserror::Error)]
#[error("failed to decompress response body: '{0}'")]
pub struct DecompressError(#[from] std::io::Error);

impl Decompressor {
    /// Selects a filter from the `Content-Encoding` header, compared
    /// case-insensitively by substring. An absent or unrecognized header
    /// passes bytes through unchanged.
    pub fn select(headers: &HeaderMap) -> Self {
        let encoding = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if encoding.contains("gzip") {
            Decompressor::Gzip
        } else if encoding.contains("deflate") {
            Decompressor::Deflate
        } else {
            Decompressor::Passthrough
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Decompressor::Passthrough)
    }

    /// Runs `bytes` through the filter. `Passthrough` copies; callers that
    /// care check [`Decompressor::is_passthrough`] first and use the raw
    /// bytes directly.
    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        let mut out = Vec::new();
        match self {
            Decompressor::Passthrough => out.extend_from_slice(bytes),
            Decompressor::Gzip => {
                GzDecoder::new(bytes).read_to_end(&mut out)?;
            }
            Decompressor::Deflate => {
                // Raw deflate, not the zlib-wrapped variant.
                DeflateDecoder::new(bytes).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }
}

/// Failure while decoding an (already decompressed) response body.
#[derive(Debug, thiserror::Error)]
pub enum ReadResponseError {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

/// Delegates decoding to the serializer and surfaces a carried fault as an
/// error.
pub fn read_response(
    serializer: &dyn Serializer,
    bytes: &[u8],
    expected: ValueKind,
) -> Result<Value, ReadResponseError> {
    let response = serializer.deserialize_response(bytes, expected)?;
    if let Some(fault) = response.fault {
        return Err(ReadResponseError::Fault(fault));
    }
    Ok(response.return_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder};
    use std::io::Write;

    fn headers_with_encoding(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, value.parse().expect("header value"));
        headers
    }

    #[test]
    fn bad_request_is_the_callers_fault() {
        let err = check_status(StatusCode::BAD_REQUEST, "Bad Method").expect_err("400");
        assert!(matches!(err, StatusError::ClientProtocol(reason) if reason == "Bad Method"));
    }

    #[test]
    fn other_failures_are_the_servers_fault() {
        let err =
            check_status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").expect_err("500");
        assert!(matches!(err, StatusError::ServerProtocol(_)));

        let err = check_status(StatusCode::FOUND, "Found").expect_err("302");
        assert!(matches!(err, StatusError::ServerProtocol(_)));
    }

    #[test]
    fn success_statuses_proceed() {
        assert!(check_status(StatusCode::OK, "OK").is_ok());
        assert!(check_status(StatusCode::NO_CONTENT, "No Content").is_ok());
    }

    #[test]
    fn selection_is_case_insensitive_and_substring_based() {
        assert_eq!(
            Decompressor::select(&headers_with_encoding("GZip")),
            Decompressor::Gzip
        );
        assert_eq!(
            Decompressor::select(&headers_with_encoding("x-deflate")),
            Decompressor::Deflate
        );
        assert_eq!(
            Decompressor::select(&headers_with_encoding("identity")),
            Decompressor::Passthrough
        );
        assert_eq!(
            Decompressor::select(&HeaderMap::new()),
            Decompressor::Passthrough
        );
    }

    #[test]
    fn gzip_round_trip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<value>ok</value>").expect("encode");
        let compressed = encoder.finish().expect("finish");

        let out = Decompressor::Gzip.decompress(&compressed).expect("decompress");
        assert_eq!(out, b"<value>ok</value>");
    }

    #[test]
    fn deflate_round_trip() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<value>ok</value>").expect("encode");
        let compressed = encoder.finish().expect("finish");

        let out = Decompressor::Deflate
            .decompress(&compressed)
            .expect("decompress");
        assert_eq!(out, b"<value>ok</value>");
    }

    #[test]
    fn garbage_gzip_input_fails() {
        assert!(Decompressor::Gzip.decompress(b"not gzip").is_err());
    }
}
