//! Batch fetch demo
//!
//! Starts a small local server, registers a printing listener, requests one
//! batch of three URLs and shuts down once the batch has been delivered.
//!
//! `/api2/test` does not exist on the server, so it comes back as 404 after the
//! configured retries.
//!
//! ```text
//! RUST_LOG=http_stream=debug cargo run --example http_getter
//! ```

use axum::extract::Path;
use axum::http::header;
use axum::routing::get;
use axum::{Json, Router};
use http_stream::{Config, FetchResult, ResponseListener, StreamCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Prints every delivered batch, then signals the main task
struct PrintingListener {
    done: mpsc::UnboundedSender<usize>,
}

impl ResponseListener for PrintingListener {
    fn on_responses(&self, results: &[FetchResult]) {
        for result in results {
            println!("--- result");
            println!(
                "code:{}\nbody:{}\nurl:{}",
                result.status(),
                summarize(result),
                result.url()
            );
        }
        let _ = self.done.send(results.len());
    }
}

fn summarize(result: &FetchResult) -> String {
    match result.body() {
        Some(body) if body.len() > 256 => format!("<{} bytes>", body.len()),
        _ => result.body_or_null().into_owned(),
    }
}

async fn api(Path(param): Path<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "request": param,
        "message": "hello world",
    }))
}

async fn image() -> ([(header::HeaderName, &'static str); 1], Vec<u8>) {
    let bytes: Vec<u8> = (0..=255u8).cycle().take(16 * 1024).collect();
    ([(header::CONTENT_TYPE, "image/jpeg")], bytes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("http_stream=info")),
        )
        .init();

    let app = Router::new()
        .route("/api/:param", get(api))
        .route("/image", get(image));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "demo server stopped");
        }
    });

    // keep the 404 retries short for the demo
    let mut config = Config::default();
    config.retry.base_delay = Duration::from_millis(100);
    let coordinator = StreamCoordinator::new(config)?;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    coordinator.add_listener(Arc::new(PrintingListener { done: done_tx }))?;

    println!("dispatching batch");
    coordinator.request_many(vec![
        format!("{base}/api/test"),
        format!("{base}/api2/test"),
        format!("{base}/image"),
    ])?;
    println!("dispatch returned, waiting for listener");

    match tokio::time::timeout(Duration::from_secs(30), done_rx.recv()).await {
        Ok(Some(count)) => println!("received {count} results"),
        Ok(None) | Err(_) => println!("no results received"),
    }

    coordinator.shutdown().await;
    Ok(())
}
