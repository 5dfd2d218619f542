//! In-memory transport with per-URL scripted outcomes.

use crate::error::{TransportError, TransportErrorKind};
use crate::transport::{Transport, TransportResponse};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One scripted outcome for a GET
#[derive(Clone, Debug)]
pub(crate) enum Scripted {
    Response(TransportResponse),
    Error(TransportErrorKind),
    /// Never completes; only cancellation gets the caller out
    Hang,
}

impl Scripted {
    pub(crate) fn ok(status: u16, body: &str) -> Self {
        Scripted::Response(TransportResponse::new(status, Some(body.as_bytes().to_vec())))
    }

    pub(crate) fn status(status: u16) -> Self {
        Scripted::Response(TransportResponse::new(status, None))
    }

    pub(crate) fn timeout() -> Self {
        Scripted::Error(TransportErrorKind::Timeout)
    }

    pub(crate) fn refused() -> Self {
        Scripted::Error(TransportErrorKind::Connect)
    }
}

/// Replays scripted outcomes per URL; the last outcome repeats once the script runs out
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, url: &str, outcomes: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), outcomes.into_iter().collect());
    }

    /// Every URL requested so far, in request order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn next_outcome(&self, url: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.next_outcome(url) {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Error(kind)) => Err(TransportError::new(url, kind, "scripted failure")),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(TransportError::new(
                url,
                TransportErrorKind::Connect,
                "no script for url",
            )),
        }
    }
}

/// Log lines written by a `tracing` subscriber, shared with the test
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Install a subscriber that writes into this buffer for the current thread
    pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || logs.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines that contain `needle`
    pub(crate) fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
