//! Exchange interceptor
//!
//! [`AuditLayer`] sits in a [`LayerStack`] and records every exchange that
//! passes through it:
//!
//! 1. **Request**: sanitize headers, resolve the correlation id and actor,
//!    capture the query string and body (leaving the body readable).
//! 2. **Buffer**: allocate an exchange-private [`ResponseBuffer`].
//! 3. **Downstream**: call `next`. A normal return is drained into the buffer
//!    and captured. A fault (an `Err`, a panic, or a failing response body) is
//!    reported, and the buffer is replaced by a 500 carrying the fault
//!    message.
//! 4. **Finalize**: build the record, hand it to the sink, then forward the
//!    buffer to the caller. Forwarding happens whether or not the sink
//!    accepted the record.
//!
//! If the interception future is dropped before step 4, including while the
//! request body is still arriving, a record with a cancelled outcome is still
//! emitted.
//!
//! Both bodies are held in memory in full. `max_buffered_body` caps that; an
//! exchange over the cap fails instead of being forwarded.
//!
//! # Example
//!
//! ```rust,ignore
//! use exchange_audit::{AuditConfig, AuditLayer, TracingSink};
//! use exchange_audit_core::LayerStack;
//!
//! let mut stack = LayerStack::new();
//! stack.push(Box::new(AuditLayer::new(AuditConfig::default(), TracingSink::new())));
//! ```
//!
//! [`LayerStack`]: exchange_audit_core::LayerStack

use crate::capture;
use crate::config::AuditConfig;
use crate::correlation::CorrelationResolver;
use crate::identity::{ClaimsIdentity, IdentitySource};
use crate::record::{ExchangeRecord, RecordBuilder, RequestFacts, ResponseFacts};
use crate::reporter::{ErrorReporter, TracingErrorReporter};
use crate::sink::AuditSink;
use chrono::Utc;
use exchange_audit_core::{
    full, BoxFuture, BoxedNext, Fault, HandlerResult, MiddlewareLayer, Request, Response,
    ResponseBuffer,
};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

/// Captured request body text, available to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequestBody(pub String);

impl CapturedRequestBody {
    /// The captured text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Audit-capture middleware layer.
#[derive(Clone)]
pub struct AuditLayer {
    config: Arc<AuditConfig>,
    resolver: Arc<CorrelationResolver>,
    sink: Arc<dyn AuditSink>,
    reporter: Arc<dyn ErrorReporter>,
    identity: Arc<dyn IdentitySource>,
}

impl AuditLayer {
    /// Create a layer emitting to `sink`.
    ///
    /// Faults are reported with [`TracingErrorReporter`] and the actor is
    /// read from the configured claim with [`ClaimsIdentity`].
    ///
    /// Out-of-range settings are pulled into range with
    /// [`AuditConfig::normalized`].
    pub fn new<S: AuditSink>(config: AuditConfig, sink: S) -> Self {
        if let Err(err) = config.validate() {
            tracing::warn!(error = %err, "audit configuration out of range, normalizing");
        }
        let config = config.normalized();
        Self {
            resolver: Arc::new(CorrelationResolver::new(&config.correlation_header)),
            identity: Arc::new(ClaimsIdentity::new(config.identity_claim.clone())),
            config: Arc::new(config),
            sink: Arc::new(sink),
            reporter: Arc::new(TracingErrorReporter),
        }
    }

    /// Use a custom fault reporter
    pub fn with_reporter<R: ErrorReporter>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Use a custom identity source
    pub fn with_identity<I: IdentitySource>(mut self, identity: I) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Whether this exchange should be audited at all
    fn should_audit(&self, req: &Request) -> bool {
        self.config.enabled
            && !self.config.should_skip_path(req.path())
            && self.config.should_sample()
    }

    /// Run one exchange through the interceptor.
    ///
    /// Audited exchanges always resolve to `Ok`: downstream faults come back
    /// as a 500 response. Exchanges that are not audited (disabled, skipped
    /// path, not sampled) return whatever `next` returns.
    pub async fn intercept(&self, mut req: Request, next: BoxedNext) -> HandlerResult {
        if !self.should_audit(&req) {
            return next(req).await;
        }

        let config = &self.config;
        let request_time = Utc::now();
        let exchange_id = self.resolver.resolve(req.headers());
        let actor = self.identity.actor(&req);
        let facts = RequestFacts::from_request(
            &req,
            exchange_id,
            actor,
            &config.excluded_headers,
            request_time,
        );

        // Armed before the body is read so a cut-off upload is still recorded.
        let mut guard = ExchangeGuard::new(
            RecordBuilder::new(facts).recorded_by(config.service_name.clone()),
            self.sink.clone(),
        );

        req.enable_buffering_limited(config.max_buffered_body).await;
        let request_body = capture::capture_request(&mut req, config.max_body_capture).await;
        guard.set_request_body(request_body.clone());
        req.extensions_mut().insert(exchange_id);
        req.extensions_mut().insert(CapturedRequestBody(request_body));

        let mut buffer = ResponseBuffer::new();

        let span = tracing::info_span!("exchange", exchange_id = %exchange_id);
        let downstream = AssertUnwindSafe(next(req).instrument(span))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Fault::from_panic(panic)));

        let completed = match downstream {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                match buffer.drain_limited(body, config.max_buffered_body).await {
                    Ok(_) => Ok(parts),
                    Err(err) => Err(Fault::from_body_error(err)),
                }
            }
            Err(fault) => Err(fault),
        };

        let (parts, record) = match completed {
            Ok(parts) => {
                let text = capture::capture_response(
                    &mut buffer,
                    config.max_body_capture,
                    &config.fault_placeholder,
                )
                .await;
                let response = ResponseFacts {
                    status: parts.status,
                    body: text,
                };
                (parts, guard.finish(|b| b.success(response, Utc::now())))
            }
            Err(fault) => {
                self.reporter.report(&exchange_id, &fault);

                let message = fault.message_or(&config.fault_placeholder).to_string();
                buffer.reset();
                if let Err(err) = buffer.write_all(message.as_bytes()).await {
                    tracing::error!(exchange_id = %exchange_id, error = %err, "failed to buffer fault body");
                }

                let (parts, _) = fault.to_response(&config.fault_placeholder).into_parts();
                (parts, guard.finish(|b| b.failure(&message, Utc::now())))
            }
        };

        if let Some(record) = record {
            self.emit(record).await;
        }

        let mut transport = Vec::with_capacity(buffer.len());
        if let Err(err) = buffer.forward_to(&mut transport).await {
            tracing::error!(exchange_id = %exchange_id, error = %err, "failed to forward response body");
        }
        Ok(Response::from_parts(parts, full(transport)))
    }

    async fn emit(&self, record: ExchangeRecord) {
        let exchange_id = record.exchange_id;
        let status = record.status_code;
        let elapsed_ms = record.elapsed_ms;

        match self.sink.emit(record).await {
            Ok(()) => tracing::debug!(
                exchange_id = %exchange_id,
                status,
                elapsed_ms,
                "exchange recorded"
            ),
            Err(err) => tracing::warn!(
                exchange_id = %exchange_id,
                error = %err,
                "failed to emit exchange record"
            ),
        }
    }
}

impl MiddlewareLayer for AuditLayer {
    fn call(&self, req: Request, next: BoxedNext) -> BoxFuture<HandlerResult> {
        let layer = self.clone();
        Box::pin(async move { layer.intercept(req, next).await })
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}

/// Owns the record of an in-flight exchange.
///
/// Dropped before [`ExchangeGuard::finish`] (the interception future was
/// cancelled), it emits a cancelled record on the current runtime instead.
struct ExchangeGuard {
    builder: Option<RecordBuilder>,
    sink: Arc<dyn AuditSink>,
}

impl ExchangeGuard {
    fn new(builder: RecordBuilder, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            builder: Some(builder),
            sink,
        }
    }

    fn set_request_body(&mut self, body: String) {
        if let Some(builder) = self.builder.as_mut() {
            builder.set_request_body(body);
        }
    }

    /// Disarm the guard and complete the record
    fn finish(
        mut self,
        complete: impl FnOnce(RecordBuilder) -> ExchangeRecord,
    ) -> Option<ExchangeRecord> {
        self.builder.take().map(complete)
    }
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        let Some(builder) = self.builder.take() else {
            return;
        };

        let record = builder.cancelled(Utc::now());
        let exchange_id = record.exchange_id;
        let sink = self.sink.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.emit(record).await {
                        tracing::warn!(
                            exchange_id = %exchange_id,
                            error = %err,
                            "failed to emit cancelled exchange record"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    exchange_id = %exchange_id,
                    "exchange cancelled outside a runtime, record dropped"
                );
            }
        }
    }
}
