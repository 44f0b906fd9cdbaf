//! Record sinks
//!
//! Branches of one poll cycle may finish in any order and all push into the
//! same sink, so implementations must accept concurrent pushes. Ordering
//! across branches is not guaranteed.

use crate::error::RecordError;
use crate::poller::record::Record;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Destination for emitted records.
pub trait RecordSink: Send + Sync {
    /// Hand a record to the sink.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Emission` if the sink can no longer accept records.
    fn push(&self, record: Record) -> Result<(), RecordError>;
}

impl RecordSink for mpsc::UnboundedSender<Record> {
    fn push(&self, record: Record) -> Result<(), RecordError> {
        self.send(record)
            .map_err(|_| RecordError::Emission("record channel is closed".to_string()))
    }
}

impl RecordSink for mpsc::Sender<Record> {
    fn push(&self, record: Record) -> Result<(), RecordError> {
        self.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RecordError::Emission("record channel is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                RecordError::Emission("record channel is closed".to_string())
            }
        })
    }
}

/// In-memory sink that keeps every record it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of records received so far
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether no record has been received
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn push(&self, record: Record) -> Result<(), RecordError> {
        self.records
            .lock()
            .map_err(|_| RecordError::Emission("memory sink lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.push(Record::new()).unwrap();
        sink.push(Record::new()).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records().len(), 2);
    }

    #[tokio::test]
    async fn test_unbounded_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.push(Record::new()).unwrap();
        assert!(rx.recv().await.is_some());

        drop(rx);
        assert!(matches!(
            tx.push(Record::new()),
            Err(RecordError::Emission(_))
        ));
    }

    #[test]
    fn test_bounded_channel_sink_full() {
        let (tx, _rx) = mpsc::channel(1);
        tx.push(Record::new()).unwrap();
        assert!(matches!(
            tx.push(Record::new()),
            Err(RecordError::Emission(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_pushes() {
        let sink = Arc::new(MemorySink::new());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let sink = sink.clone();
                tokio::spawn(async move { sink.push(Record::new()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(sink.len(), 16);
    }
}
