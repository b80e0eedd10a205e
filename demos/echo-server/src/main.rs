//! Echo server with audit capture
//!
//! Run with: cargo run -p echo-server
//!
//! Then try:
//!   curl -d '{"a":1}' http://127.0.0.1:8080/echo
//!   curl -H "X-Correlation-Id: 3fa85f64-5717-4562-b3fc-2c963f66afa6" http://127.0.0.1:8080/
//!   curl -H "X-User-Email: ada@example.com" http://127.0.0.1:8080/whoami
//!   curl http://127.0.0.1:8080/fail
//!
//! Every exchange is logged as an `api trace record` line. `LOG_FORMAT`
//! picks compact, pretty or json output and `ADDR` the listen address.
//! Audit settings come from `EXCHANGE_AUDIT_*` variables or a `.env` file.

use exchange_audit::{
    logging::{self, LogFormat},
    AuditConfig, AuditLayer, CapturedRequestBody, ChannelSink, ExchangeId, Principal, TracingSink,
};
use exchange_audit_core::{
    handler_fn, BoxFuture, BoxedNext, Fault, HandlerResult, IntoResponse, LayerStack,
    MiddlewareLayer, Request, Server,
};
use http::StatusCode;

/// Trusts an `X-User-Email` header as the authenticated principal.
#[derive(Clone)]
struct HeaderAuth;

impl MiddlewareLayer for HeaderAuth {
    fn call(&self, mut req: Request, next: BoxedNext) -> BoxFuture<HandlerResult> {
        let email = req
            .headers()
            .get("x-user-email")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(email) = email {
            req.extensions_mut()
                .insert(Principal::new().with_claim("email", email));
        }
        Box::pin(async move { next(req).await })
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}

async fn route(mut req: Request) -> HandlerResult {
    let path = req.path().to_string();
    match path.as_str() {
        "/echo" => {
            let body = req.bytes().await?;
            Ok(body.to_vec().into_response())
        }
        "/captured" => {
            // The interceptor already read the body; it is still available here.
            let captured = req
                .extensions()
                .get::<CapturedRequestBody>()
                .map(|body| body.as_str().to_string())
                .unwrap_or_default();
            Ok(captured.into_response())
        }
        "/whoami" => {
            let id = req
                .extensions()
                .get::<ExchangeId>()
                .map(ToString::to_string)
                .unwrap_or_default();
            let actor = req
                .extensions()
                .get::<Principal>()
                .and_then(|principal| principal.claim("email"))
                .unwrap_or("anonymous")
                .to_string();
            Ok(format!("{} as {}", id, actor).into_response())
        }
        "/fail" => Err(Fault::new("demo failure")),
        "/panic" => panic!("demo panic"),
        "/teapot" => Ok((StatusCode::IM_A_TEAPOT, "short and stout").into_response()),
        _ => Ok("ok".into_response()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse::<LogFormat>().ok())
        .unwrap_or_default();
    logging::init(format);

    let config = AuditConfig::from_env()?;
    tracing::info!(
        service = %config.service_name,
        enabled = config.enabled,
        sample_rate = config.sample_rate,
        "audit capture configured"
    );

    let (sink, _worker) = ChannelSink::spawn(TracingSink::new());

    let mut layers = LayerStack::new();
    layers.push(Box::new(HeaderAuth));
    layers.push(Box::new(AuditLayer::new(config, sink)));

    let addr = std::env::var("ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    Server::new(layers, handler_fn(route)).run(&addr).await
}
