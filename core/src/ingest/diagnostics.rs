use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Appends raw process lines to a file for later inspection.
///
/// Never fails the run: open or write errors are logged once and the writer
/// stops; lines sent after that are dropped.
pub struct DiagnosticLog {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl DiagnosticLog {
    pub fn start(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "diagnostic log disabled");
                    return;
                }
            };

            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!(path = %path.display(), error = %e, "diagnostic log disabled");
                    return;
                }
            }
            if let Err(e) = file.flush().await {
                tracing::warn!(path = %path.display(), error = %e, "diagnostic log flush failed");
            }
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            handle,
        }
    }

    /// Queues a line without waiting; drops it when the writer is full or gone.
    pub fn write(&self, line: &str) {
        if self.tx.try_send(line.to_string()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Flushes queued lines and waits for the writer to finish.
    pub async fn close(self) {
        let DiagnosticLog {
            tx,
            dropped,
            handle,
        } = self;
        drop(tx);
        let _ = handle.await;
        let dropped = dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            tracing::debug!(dropped, "diagnostic lines dropped");
        }
    }
}
