//! Shared test transport.

#![allow(dead_code)]

use api_query::transport::{Response, Transport};
use api_query::{Error, Method, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&str, &Method, &Value) -> api_query::Result<Response> + Send + Sync;

/// Records every call, optionally sleeps, and answers through a closure.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    delay: Duration,
    calls: Mutex<Vec<(String, Method, Value)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Method, &Value) -> api_query::Result<Response> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answers 200 with `{"echo": input}`.
    pub fn echo() -> Self {
        Self::new(|_, _, input| Response::from_json(200, &json!({ "echo": input })))
    }

    /// Answers with the given status and body for every call.
    pub fn fixed(status: u16, body: Value) -> Self {
        Self::new(move |_, _, _| Response::from_json(status, &body))
    }

    /// Fails every call at the transport level.
    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_, _, _| Err(Error::Transport(TransportError::Other(message.to_string()))))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<Value> {
        self.calls.lock().unwrap().iter().map(|(_, _, v)| v.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, path: &str, method: &Method, input: &Value) -> api_query::Result<Response> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), method.clone(), input.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(path, method, input)
    }
}

pub fn shared(t: ScriptedTransport) -> Arc<ScriptedTransport> {
    Arc::new(t)
}
