//! Listener fixtures

use http_stream::{FetchResult, ResponseListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Listener that forwards each delivered batch into a channel
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Vec<FetchResult>>,
}

impl ResponseListener for ChannelListener {
    fn on_responses(&self, results: &[FetchResult]) {
        let _ = self.tx.send(results.to_vec());
    }
}

/// Create a channel listener and the receiving end of its batches
pub fn channel_listener() -> (Arc<ChannelListener>, mpsc::UnboundedReceiver<Vec<FetchResult>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener { tx }), rx)
}

/// Wait for the next delivered batch, failing the test after `secs` seconds
pub async fn next_batch(
    rx: &mut mpsc::UnboundedReceiver<Vec<FetchResult>>,
    secs: u64,
) -> Vec<FetchResult> {
    tokio::time::timeout(Duration::from_secs(secs), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("listener channel closed")
}

/// Assert that no batch arrives within `millis` milliseconds
pub async fn assert_no_batch(rx: &mut mpsc::UnboundedReceiver<Vec<FetchResult>>, millis: u64) {
    match tokio::time::timeout(Duration::from_millis(millis), rx.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(batch)) => panic!("unexpected notification: {batch:?}"),
    }
}
