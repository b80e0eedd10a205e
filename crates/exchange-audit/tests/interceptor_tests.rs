use bytes::Bytes;
use exchange_audit::{
    AuditConfig, AuditLayer, AuditSink, EmitFuture, ExchangeId, ExchangeRecord, MemorySink,
    Principal, SinkError, SinkResult,
};
use exchange_audit_core::{
    boxed, handler_fn, BoxError, BoxFuture, BoxedNext, Fault, HandlerResult, IntoResponse,
    LayerStack, MiddlewareLayer, Request, Response, TestClient, TestRequest,
};
use futures_util::stream;
use http::StatusCode;
use http_body_util::StreamBody;
use hyper::body::Frame;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

const GUID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

fn client(layer: AuditLayer, handler: BoxedNext) -> TestClient {
    let mut stack = LayerStack::new();
    stack.push(Box::new(layer));
    TestClient::new(stack, handler)
}

fn audited(handler: BoxedNext) -> (TestClient, MemorySink) {
    let sink = MemorySink::new();
    let layer = AuditLayer::new(AuditConfig::default(), sink.clone());
    (client(layer, handler), sink)
}

fn ok_handler() -> BoxedNext {
    handler_fn(|_req| async { Ok("ok".into_response()) })
}

fn echo_handler() -> BoxedNext {
    handler_fn(|mut req: Request| async move {
        let body = req.bytes().await?;
        Ok(body.to_vec().into_response())
    })
}

fn only_record(sink: &MemorySink) -> ExchangeRecord {
    let records = sink.records();
    assert_eq!(records.len(), 1, "expected exactly one record");
    records.into_iter().next().unwrap()
}

/// Sink that refuses every record
struct RejectingSink;

impl AuditSink for RejectingSink {
    fn emit(&self, _record: ExchangeRecord) -> EmitFuture<'_> {
        let result: SinkResult = Err(SinkError::Write("telemetry backend down".into()));
        Box::pin(async move { result })
    }
}

/// Stands in for an authentication layer that already ran
#[derive(Clone)]
struct StubAuth;

impl MiddlewareLayer for StubAuth {
    fn call(&self, mut req: Request, next: BoxedNext) -> BoxFuture<HandlerResult> {
        if req.headers().contains_key(http::header::AUTHORIZATION) {
            req.extensions_mut()
                .insert(Principal::new().with_claim("email", "ada@example.com"));
        }
        Box::pin(async move { next(req).await })
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}

#[tokio::test]
async fn test_get_without_carrier() {
    let (client, sink) = audited(ok_handler());

    let response = client.get("/status?verbose=1").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "ok");

    let record = only_record(&sink);
    assert_eq!(record.method, "GET");
    assert_eq!(record.status_code, 200);
    assert_eq!(record.response_body, "200: ok");
    assert_eq!(record.query_string, "?verbose=1");
    assert_eq!(record.request_body, "");
    assert_eq!(record.exchange_id.as_uuid().get_version_num(), 4);
    assert!(record.outcome.is_success());
    assert!(record.response_time >= record.request_time);
}

#[tokio::test]
async fn test_post_with_failing_downstream() {
    let (client, sink) = audited(handler_fn(|_req| async { Err(Fault::new("boom")) }));

    let response = client.post("/orders", "{\"a\":1}").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_body_contains("boom");

    let record = only_record(&sink);
    assert_eq!(record.status_code, 500);
    assert_eq!(record.request_body, "{\"a\":1}");
    assert!(record.response_body.contains("boom"));
    assert_eq!(record.outcome.error(), Some("boom"));
}

#[tokio::test]
async fn test_carrier_id_is_used() {
    let (client, sink) = audited(ok_handler());

    client
        .request(TestRequest::get("/").header("correlationid", GUID))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(only_record(&sink).exchange_id.to_string(), GUID);
}

#[tokio::test]
async fn test_missing_or_malformed_carrier_gives_distinct_ids() {
    let (client, sink) = audited(ok_handler());

    client.get("/").await;
    client
        .request(TestRequest::get("/").header("x-correlation-id", "not-a-guid"))
        .await;

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].exchange_id, records[1].exchange_id);
}

#[tokio::test]
async fn test_zero_length_get() {
    let (client, sink) = audited(echo_handler());

    let response = client
        .request(TestRequest::get("/empty").body(Bytes::new()))
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "");

    let record = only_record(&sink);
    assert_eq!(record.request_body, "");
    assert_eq!(record.response_body, "200: ");
}

#[tokio::test]
async fn test_authorization_hidden_from_record_but_kept_downstream() {
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let handler = handler_fn(move |req: Request| {
        let captured = captured.clone();
        async move {
            let auth = req
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *captured.lock().unwrap() = auth;
            Ok(().into_response())
        }
    });

    let sink = MemorySink::new();
    let mut stack = LayerStack::new();
    stack.push(Box::new(StubAuth));
    stack.push(Box::new(AuditLayer::new(AuditConfig::default(), sink.clone())));
    let client = TestClient::new(stack, handler);

    client
        .request(
            TestRequest::get("/me")
                .header("Authorization", "Bearer token-123")
                .header("Proxy-Authorization", "Basic abc")
                .header("Accept", "text/plain"),
        )
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(seen.lock().unwrap().as_deref(), Some("Bearer token-123"));

    let record = only_record(&sink);
    assert!(!record.headers.to_ascii_lowercase().contains("authorization"));
    assert!(!record.headers.contains("token-123"));
    assert!(record.headers.contains("accept:text/plain\n"));
    assert_eq!(record.actor, "ada@example.com");
}

#[tokio::test]
async fn test_sink_failure_still_delivers_response() {
    let layer = AuditLayer::new(AuditConfig::default(), RejectingSink);
    let client = client(layer, echo_handler());

    let response = client.post("/echo", "still here").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "still here");
}

#[tokio::test]
async fn test_panicking_downstream_becomes_500() {
    let (client, sink) = audited(handler_fn(|_req: Request| async move {
        if true {
            panic!("handler exploded");
        }
        Ok(().into_response())
    }));

    let response = client.get("/panic").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text(), "handler exploded");

    let record = only_record(&sink);
    assert_eq!(record.status_code, 500);
    assert_eq!(record.outcome.error(), Some("handler exploded"));
}

#[tokio::test]
async fn test_failing_response_stream_is_a_fault() {
    let handler = handler_fn(|_req| async {
        let frames = vec![
            Ok(Frame::data(Bytes::from_static(b"half a "))),
            Err(BoxError::from("upstream reset")),
        ];
        let body = boxed(StreamBody::new(stream::iter(frames)));
        Ok(Response::new(body))
    });
    let (client, sink) = audited(handler);

    let response = client.get("/broken").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text(), "upstream reset");

    let record = only_record(&sink);
    assert_eq!(record.response_body, "upstream reset");
    assert!(!record.outcome.is_success());
}

#[tokio::test]
async fn test_chunked_request_is_read_to_end() {
    let (client, sink) = audited(echo_handler());

    let response = client
        .request(TestRequest::put("/upload").chunked(vec!["hello ", "chunked ", "world"]))
        .await;
    assert_eq!(response.text(), "hello chunked world");
    assert_eq!(only_record(&sink).request_body, "hello chunked world");
}

#[tokio::test]
async fn test_downstream_status_and_headers_are_preserved() {
    let handler = handler_fn(|_req| async {
        let mut response = (StatusCode::CREATED, "made").into_response();
        response
            .headers_mut()
            .insert("x-resource-id", http::HeaderValue::from_static("42"));
        Ok(response)
    });
    let (client, sink) = audited(handler);

    let response = client.post("/things", "{}").await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.headers().get("x-resource-id").unwrap(), "42");
    assert_eq!(only_record(&sink).response_body, "201: made");
}

#[tokio::test]
async fn test_downstream_reads_exchange_id() {
    let handler = handler_fn(|req: Request| async move {
        let id = req
            .extensions()
            .get::<ExchangeId>()
            .map(ToString::to_string)
            .unwrap_or_default();
        Ok(id.into_response())
    });
    let (client, sink) = audited(handler);

    let response = client
        .request(TestRequest::get("/").header("X-Correlation-Id", GUID))
        .await;
    assert_eq!(response.text(), GUID);
    assert_eq!(only_record(&sink).exchange_id.to_string(), GUID);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_each_get_one_record() {
    let (client, sink) = audited(echo_handler());
    let client = Arc::new(client);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let body = format!("request {}", i);
                let response = client.post("/echo", body.clone()).await;
                assert_eq!(response.text(), body);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let records = sink.records();
    assert_eq!(records.len(), 32);
    for record in &records {
        assert_eq!(record.response_body, format!("200: {}", record.request_body));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_bytes_pass_through_unchanged(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (delivered, records) = rt.block_on(async {
            let (client, sink) = audited(echo_handler());
            let response = client.post("/echo", payload.clone()).await;
            (response.body().clone(), sink.records())
        });

        prop_assert_eq!(&delivered[..], &payload[..]);
        prop_assert_eq!(records.len(), 1);
        prop_assert!(records[0].response_time >= records[0].request_time);
    }
}
