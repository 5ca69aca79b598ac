//! Fire-and-forget record writer
//!
//! Writes are queued to a single task and applied in submission order. When
//! several updates for the same book are queued at once only the latest of
//! each kind is written. Failures are logged and never reach the caller.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{PersistenceGateway, ReadingPosition};
use crate::annotations::Highlight;

enum WriteOp {
    Position {
        book_id: String,
        position: ReadingPosition,
    },
    Highlights {
        book_id: String,
        highlights: Vec<Highlight>,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Position,
    Highlights,
}

/// Handle to the writer task; cheap to clone
#[derive(Clone)]
pub struct RecordWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl RecordWriter {
    /// Start the writer task on the current runtime
    pub fn spawn(gateway: Arc<dyn PersistenceGateway>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(gateway, rx));
        Self { tx }
    }

    pub fn save_position(&self, book_id: &str, position: ReadingPosition) {
        self.submit(WriteOp::Position {
            book_id: book_id.to_string(),
            position,
        });
    }

    pub fn save_highlights(&self, book_id: &str, highlights: Vec<Highlight>) {
        self.submit(WriteOp::Highlights {
            book_id: book_id.to_string(),
            highlights,
        });
    }

    /// Wait until everything submitted so far has been attempted
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.submit(WriteOp::Flush(done));
        let _ = wait.await;
    }

    fn submit(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!("Record writer has stopped; dropping write");
        }
    }
}

async fn run(gateway: Arc<dyn PersistenceGateway>, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(op) = rx.try_recv() {
            batch.push(op);
        }

        // Latest write of each kind per book wins
        let mut latest: HashMap<(String, Kind), usize> = HashMap::new();
        for (i, op) in batch.iter().enumerate() {
            match op {
                WriteOp::Position { book_id, .. } => {
                    latest.insert((book_id.clone(), Kind::Position), i);
                }
                WriteOp::Highlights { book_id, .. } => {
                    latest.insert((book_id.clone(), Kind::Highlights), i);
                }
                WriteOp::Flush(_) => {}
            }
        }

        let mut waiters = Vec::new();
        for (i, op) in batch.into_iter().enumerate() {
            match op {
                WriteOp::Position { book_id, position } => {
                    if latest.get(&(book_id.clone(), Kind::Position)) == Some(&i) {
                        match gateway.save_position(&book_id, &position).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::debug!("Book {} is gone; position not saved", book_id)
                            }
                            Err(e) => {
                                tracing::warn!("Failed to save position for {}: {}", book_id, e)
                            }
                        }
                    }
                }
                WriteOp::Highlights { book_id, highlights } => {
                    if latest.get(&(book_id.clone(), Kind::Highlights)) == Some(&i) {
                        match gateway.save_highlights(&book_id, &highlights).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::debug!("Book {} is gone; highlights not saved", book_id)
                            }
                            Err(e) => {
                                tracing::warn!("Failed to save highlights for {}: {}", book_id, e)
                            }
                        }
                    }
                }
                WriteOp::Flush(done) => waiters.push(done),
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }
}
