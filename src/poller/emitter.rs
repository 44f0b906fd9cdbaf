//! Turning responses and failures into records
//!
//! The emitter is the only place records are built. Errors while building
//! one are limited to [`RecordError`](crate::error::RecordError): they are
//! logged and the record is dropped, never propagated into the poll cycle.

use crate::poller::client::TransportError;
use crate::poller::codec::Codec;
use crate::poller::decorate::Decorator;
use crate::poller::record::Record;
use crate::poller::sink::RecordSink;
use crate::request::{structure_request, RequestDescriptor};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Tag carried by every failure record
pub const FAILURE_TAG: &str = "_http_request_failure";

/// Field holding the failure details
pub const FAILURE_FIELD: &str = "http_request_failure";

/// Builds records and hands them to the sink.
#[derive(Clone)]
pub struct Emitter {
    codec: Arc<dyn Codec>,
    decorator: Arc<dyn Decorator>,
    sink: Arc<dyn RecordSink>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}

impl Emitter {
    /// Create an emitter
    pub fn new(
        codec: Arc<dyn Codec>,
        decorator: Arc<dyn Decorator>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            codec,
            decorator,
            sink,
        }
    }

    /// Codec used to decode response bodies
    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Emit one record per object decoded from `body`.
    ///
    /// An empty body yields a single empty record. Returns the number of
    /// records handed to the sink; records that fail to decode, decorate or
    /// enqueue are logged and dropped.
    pub fn emit_success(&self, request: &RequestDescriptor, body: &[u8]) -> usize {
        let records = if body.is_empty() {
            Ok(vec![Record::new()])
        } else {
            self.codec
                .decode(body)
                .map(|objects| objects.into_iter().map(Record::from_fields).collect())
        };

        let records: Vec<Record> = match records {
            Ok(records) => records,
            Err(e) => {
                error!(url = %request.url(), error = %e, "Dropping undecodable response");
                return 0;
            }
        };

        let mut emitted = 0;
        for mut record in records {
            match self
                .decorator
                .decorate(&mut record)
                .and_then(|()| self.sink.push(record))
            {
                Ok(()) => emitted += 1,
                Err(e) => {
                    error!(url = %request.url(), error = %e, "Dropping record");
                }
            }
        }

        debug!(url = %request.url(), records = emitted, "Emitted records");
        emitted
    }

    /// Emit a failure record for `request`.
    ///
    /// Returns whether the record reached the sink.
    pub fn emit_failure(
        &self,
        request: &RequestDescriptor,
        failure: &TransportError,
        elapsed: Duration,
    ) -> bool {
        let mut record = Record::new();
        record.add_tag(FAILURE_TAG);
        record.set(
            FAILURE_FIELD,
            serde_json::json!({
                "request": JsonValue::Object(structure_request(request)),
                "error": failure.message,
                "backtrace": failure.causes,
                "runtime_seconds": elapsed.as_secs_f64(),
            }),
        );

        match self.sink.push(record) {
            Ok(()) => true,
            Err(e) => {
                error!(url = %request.url(), error = %e, "Dropping failure record");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;
    use crate::poller::client::TransportErrorKind;
    use crate::poller::codec::JsonCodec;
    use crate::poller::decorate::PipelineDecorator;
    use crate::poller::sink::MemorySink;
    use crate::request::{normalize_request, ClientSpec, StructuredSpec, REDACTED};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RejectingDecorator;

    impl Decorator for RejectingDecorator {
        fn decorate(&self, _record: &mut Record) -> Result<(), RecordError> {
            Err(RecordError::Emission("rejected".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingDecorator {
        calls: AtomicUsize,
    }

    impl Decorator for CountingDecorator {
        fn decorate(&self, _record: &mut Record) -> Result<(), RecordError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request() -> RequestDescriptor {
        normalize_request(&ClientSpec::Url("http://localhost:8000".to_string()), "v3").unwrap()
    }

    fn emitter(decorator: Arc<dyn Decorator>) -> (Emitter, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Emitter::new(Arc::new(JsonCodec), decorator, sink.clone()), sink)
    }

    #[test]
    fn test_emit_success_decorates_each_record() {
        let decorator = Arc::new(CountingDecorator::default());
        let (emitter, sink) = emitter(decorator.clone());

        let count = emitter.emit_success(&request(), br#"[{"a": 1}, {"b": 2}]"#);
        assert_eq!(count, 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(decorator.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_success_empty_body_yields_empty_record() {
        let (emitter, sink) = emitter(Arc::new(PipelineDecorator::new().with_type("burrow")));

        assert_eq!(emitter.emit_success(&request(), b""), 1);
        let records = sink.records();
        assert_eq!(records[0].get("type").unwrap(), "burrow");
        assert_eq!(records[0].fields().len(), 1);
    }

    #[test]
    fn test_emit_success_drops_malformed_body() {
        let (emitter, sink) = emitter(Arc::new(PipelineDecorator::new()));
        assert_eq!(emitter.emit_success(&request(), b"{not json"), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_emit_success_drops_rejected_records() {
        let (emitter, sink) = emitter(Arc::new(RejectingDecorator));
        assert_eq!(emitter.emit_success(&request(), br#"{"a": 1}"#), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_emit_success_survives_closed_sink() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Record>();
        drop(rx);
        let emitter = Emitter::new(
            Arc::new(JsonCodec),
            Arc::new(PipelineDecorator::new()),
            Arc::new(tx),
        );
        assert_eq!(emitter.emit_success(&request(), br#"{"a": 1}"#), 0);
    }

    #[test]
    fn test_emit_failure_layout() {
        let decorator = Arc::new(CountingDecorator::default());
        let (emitter, sink) = emitter(decorator.clone());
        let failure = TransportError {
            kind: TransportErrorKind::Connect,
            message: "connection refused".to_string(),
            causes: vec!["tcp connect error".to_string()],
        };

        assert!(emitter.emit_failure(&request(), &failure, Duration::from_millis(250)));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.has_tag(FAILURE_TAG));

        let details = record.get(FAILURE_FIELD).unwrap();
        assert_eq!(details["request"]["url"], "http://localhost:8000/v3/kafka");
        assert_eq!(details["error"], "connection refused");
        assert_eq!(details["backtrace"], serde_json::json!(["tcp connect error"]));
        assert_eq!(details["runtime_seconds"], 0.25);

        assert_eq!(decorator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_emit_failure_redacts_password() {
        let (emitter, sink) = emitter(Arc::new(PipelineDecorator::new()));
        let spec = ClientSpec::Structured(StructuredSpec {
            url: Some("http://localhost:8000".to_string()),
            user: Some("burrow".to_string()),
            password: Some("hunter2".to_string()),
            ..StructuredSpec::default()
        });
        let request = normalize_request(&spec, "v3").unwrap();
        let failure = TransportError::new(TransportErrorKind::Timeout, "timed out");

        emitter.emit_failure(&request, &failure, Duration::ZERO);

        let line = sink.records()[0].to_json_line().unwrap();
        assert!(!line.contains("hunter2"));
        assert!(line.contains(REDACTED));
    }
}
