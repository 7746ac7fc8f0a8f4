//! A scripted fake cloud service standing in for the real transport in
//! record mode.

#![allow(dead_code)]

use async_trait::async_trait;
use cloudreplay::{
    Error, RequestRecord, ResponseRecord, Result, Transport, TransportError, TransportErrorKind,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
enum Reply {
    Respond(ResponseRecord),
    Fail(TransportErrorKind, String),
}

/// Answers by `(METHOD, path)`; the query string is not part of the route.
/// Every response carries a `Date` header derived from `epoch`, so two
/// recordings of the same test differ the way real runs do.
pub struct FakeCloud {
    epoch: u64,
    routes: HashMap<(String, String), Reply>,
    calls: AtomicUsize,
    received: Mutex<Vec<RequestRecord>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::with_epoch(1_700_000_000)
    }

    pub fn with_epoch(epoch: u64) -> Self {
        Self {
            epoch,
            routes: HashMap::new(),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn route(mut self, method: &str, path: &str, response: ResponseRecord) -> Self {
        self.routes
            .insert((method.to_string(), path.to_string()), Reply::Respond(response));
        self
    }

    #[must_use]
    pub fn failing(mut self, method: &str, path: &str, kind: TransportErrorKind, message: &str) -> Self {
        self.routes.insert(
            (method.to_string(), path.to_string()),
            Reply::Fail(kind, message.to_string()),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<RequestRecord> {
        self.received.lock().expect("received lock").clone()
    }
}

#[async_trait]
impl Transport for FakeCloud {
    async fn send(&self, request: RequestRecord) -> Result<ResponseRecord> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .expect("received lock")
            .push(request.clone());

        let path = request
            .target
            .split_once('?')
            .map_or(request.target.as_str(), |(path, _)| path);
        let key = (request.method.clone(), path.to_string());
        match self.routes.get(&key) {
            Some(Reply::Respond(response)) => Ok(response
                .clone()
                .header("Date", format!("epoch-{}", self.epoch + n as u64))
                .header("X-Request-Id", format!("req-{}-{n}", self.epoch))),
            Some(Reply::Fail(kind, message)) => {
                Err(Error::Transport(TransportError::new(*kind, message.clone())))
            }
            None => Ok(ResponseRecord::new(404).body(format!("no route for {} {path}", request.method))),
        }
    }
}
