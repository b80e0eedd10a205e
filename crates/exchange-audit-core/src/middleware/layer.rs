//! Continuation-style middleware chain

use crate::error::HandlerResult;
use crate::request::Request;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A boxed next function for middleware chains
///
/// Resolves to the downstream response, or to the [`Fault`](crate::Fault) downstream
/// processing raised.
pub type BoxedNext = Arc<dyn Fn(Request) -> BoxFuture<HandlerResult> + Send + Sync>;

/// Wrap an async function as a [`BoxedNext`]
pub fn handler_fn<F, Fut>(f: F) -> BoxedNext
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |req: Request| Box::pin(f(req)) as BoxFuture<HandlerResult>)
}

/// Trait for middleware that can be placed in a [`LayerStack`]
pub trait MiddlewareLayer: Send + Sync + 'static {
    /// Apply this middleware to a request, calling `next` to continue the chain
    fn call(&self, req: Request, next: BoxedNext) -> BoxFuture<HandlerResult>;

    /// Clone this middleware into a boxed trait object
    fn clone_box(&self) -> Box<dyn MiddlewareLayer>;
}

impl Clone for Box<dyn MiddlewareLayer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A stack of middleware layers
#[derive(Clone, Default)]
pub struct LayerStack {
    layers: Vec<Box<dyn MiddlewareLayer>>,
}

impl LayerStack {
    /// Create a new empty layer stack
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a middleware layer to the stack
    ///
    /// Layers are executed in the order they are added (outermost first).
    pub fn push(&mut self, layer: Box<dyn MiddlewareLayer>) {
        self.layers.push(layer);
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Get the number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Execute the middleware stack with a final handler
    pub fn execute(&self, req: Request, handler: BoxedNext) -> BoxFuture<HandlerResult> {
        self.compose(handler)(req)
    }

    /// Fold the stack around `handler` into a single continuation
    pub fn compose(&self, handler: BoxedNext) -> BoxedNext {
        // Built inside out: the first layer pushed ends up outermost.
        let mut next = handler;

        for layer in self.layers.iter().rev() {
            let layer = layer.clone_box();
            let current_next = next;
            next = Arc::new(move |req: Request| {
                let layer = layer.clone_box();
                let next = current_next.clone();
                Box::pin(async move { layer.call(req, next).await }) as BoxFuture<HandlerResult>
            });
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::empty;
    use crate::error::Fault;
    use crate::response::IntoResponse;
    use http::{Method, StatusCode};
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Create a test request with the given method and path
    fn create_test_request(method: Method, path: &str) -> Request {
        let req = http::Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        Request::new(parts, empty())
    }

    fn status_handler(status: StatusCode) -> BoxedNext {
        handler_fn(move |_req| async move { Ok((status, "handler").into_response()) })
    }

    /// A simple test middleware that tracks execution order
    #[derive(Clone)]
    struct OrderTrackingMiddleware {
        id: usize,
        order: Arc<Mutex<Vec<(usize, &'static str)>>>,
    }

    impl MiddlewareLayer for OrderTrackingMiddleware {
        fn call(&self, req: Request, next: BoxedNext) -> BoxFuture<HandlerResult> {
            let id = self.id;
            let order = self.order.clone();

            Box::pin(async move {
                order.lock().unwrap().push((id, "pre"));
                let response = next(req).await;
                order.lock().unwrap().push((id, "post"));
                response
            })
        }

        fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
            Box::new(self.clone())
        }
    }

    /// A middleware that answers without calling next
    #[derive(Clone)]
    struct ShortCircuitMiddleware {
        status: StatusCode,
    }

    impl MiddlewareLayer for ShortCircuitMiddleware {
        fn call(&self, _req: Request, _next: BoxedNext) -> BoxFuture<HandlerResult> {
            let status = self.status;
            Box::pin(async move { Ok((status, "short").into_response()) })
        }

        fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
            Box::new(self.clone())
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_middleware_execution_order(num_layers in 1usize..10usize) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let order = Arc::new(Mutex::new(Vec::new()));

                let mut stack = LayerStack::new();
                for id in 0..num_layers {
                    stack.push(Box::new(OrderTrackingMiddleware { id, order: order.clone() }));
                }

                let request = create_test_request(Method::GET, "/test");
                let _ = stack.execute(request, status_handler(StatusCode::OK)).await;

                let execution_order = order.lock().unwrap();
                prop_assert_eq!(execution_order.len(), num_layers * 2);

                // Outermost first on the way in, innermost first on the way out
                for i in 0..num_layers {
                    prop_assert_eq!(execution_order[i], (i, "pre"));
                    prop_assert_eq!(execution_order[num_layers + i], (num_layers - 1 - i, "post"));
                }
                Ok(())
            });
            result?;
        }
    }

    #[tokio::test]
    async fn test_empty_layer_stack_calls_handler_directly() {
        let stack = LayerStack::new();
        let request = create_test_request(Method::GET, "/test");
        let response = stack
            .execute(request, status_handler(StatusCode::ACCEPTED))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let mut stack = LayerStack::new();
        stack.push(Box::new(ShortCircuitMiddleware {
            status: StatusCode::UNAUTHORIZED,
        }));

        let handler_called = Arc::new(AtomicBool::new(false));
        let flag = handler_called.clone();
        let handler = handler_fn(move |_req| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok("handler".into_response())
            }
        });

        let request = create_test_request(Method::GET, "/test");
        let response = stack.execute(request, handler).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!handler_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_fault_propagates_through_layers() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = LayerStack::new();
        stack.push(Box::new(OrderTrackingMiddleware {
            id: 0,
            order: order.clone(),
        }));

        let handler = handler_fn(|_req| async { Err(Fault::new("boom")) });
        let request = create_test_request(Method::POST, "/fail");
        let fault = stack.execute(request, handler).await.unwrap_err();

        assert_eq!(fault.message(), "boom");
        assert_eq!(order.lock().unwrap().len(), 2);
    }
}
