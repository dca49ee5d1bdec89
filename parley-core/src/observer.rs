//! # Wire Observers
//!
//! An optional diagnostics hook receiving the exact bytes sent and received
//! for each call, correlated by [`CallIdentity`]. Observers never participate
//! in control flow: the engine checks for one once per call and pays nothing
//! when none is registered.
//!
//! Timing contract: `on_request` fires after the request bytes have been
//! handed to the transport and strictly before the response phase starts;
//! `on_response` fires with the raw wire bytes (pre-decompression) after the
//! decode attempt completes, even when decoding fails, so the captured
//! stream can be decoded again later.

use crate::client::request::CallIdentity;

/// Pre-send and post-receive byte capture hooks.
pub trait WireObserver: Send + Sync {
    fn on_request(&self, identity: &CallIdentity, bytes: &[u8]);
    fn on_response(&self, identity: &CallIdentity, bytes: &[u8]);
}
