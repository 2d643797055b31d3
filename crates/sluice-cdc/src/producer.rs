//! Downstream producer seam

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{CdcError, Result};
use crate::record::ProducerRecord;

/// Destination for assembled transaction batches.
///
/// A batch is accepted in full or rejected in full; implementations must not
/// acknowledge partial batches. The send completes asynchronously, so
/// failures surface on the caller's await rather than through a side
/// channel.
#[async_trait]
pub trait ProducerSink: Send + Sync {
    /// Hand one transaction batch to the destination.
    async fn send(&self, record: ProducerRecord) -> Result<()>;
}

/// In-process sink that retains every batch it accepts.
///
/// Used by tests and embedded pipelines that do not need a real transport.
/// Cloning shares the underlying buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    batches: Vec<ProducerRecord>,
    fail_next: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches accepted so far, in send order.
    pub async fn batches(&self) -> Vec<ProducerRecord> {
        self.inner.lock().await.batches.clone()
    }

    /// Number of accepted batches.
    pub async fn batch_count(&self) -> usize {
        self.inner.lock().await.batches.len()
    }

    /// Make the next send fail, for exercising the error path.
    pub async fn fail_next_send(&self) {
        self.inner.lock().await.fail_next = true;
    }
}

#[async_trait]
impl ProducerSink for MemorySink {
    async fn send(&self, record: ProducerRecord) -> Result<()> {
        let mut state = self.inner.lock().await;
        if state.fail_next {
            state.fail_next = false;
            return Err(CdcError::producer("injected send failure"));
        }
        state.batches.push(record);
        Ok(())
    }
}
