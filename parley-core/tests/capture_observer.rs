use parley_core::client::request::CallIdentity;
use parley_core::observer::WireObserver;
use std::sync::Mutex;

// A byte-capture observer recording every request and response it sees,
// keyed by sequence number.
#[derive(Debug, Default)]
pub struct CaptureObserver {
    pub requests: Mutex<Vec<(u64, Vec<u8>)>>,
    pub responses: Mutex<Vec<(u64, Vec<u8>)>>,
}

impl WireObserver for CaptureObserver {
    fn on_request(&self, identity: &CallIdentity, bytes: &[u8]) {
        self.requests
            .lock()
            .unwrap()
            .push((identity.sequence, bytes.to_vec()));
    }

    fn on_response(&self, identity: &CallIdentity, bytes: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push((identity.sequence, bytes.to_vec()));
    }
}
