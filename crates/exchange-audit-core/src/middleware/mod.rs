//! Middleware infrastructure
//!
//! A middleware receives the request and a [`BoxedNext`] continuation for the
//! rest of the chain. It may inspect or change the request, decide whether to
//! call `next`, and inspect or change what comes back.
//!
//! # Example
//!
//! ```rust,ignore
//! use exchange_audit_core::{handler_fn, LayerStack, IntoResponse};
//!
//! let mut stack = LayerStack::new();
//! stack.push(Box::new(my_layer));
//!
//! let handler = handler_fn(|_req| async { Ok("hello".into_response()) });
//! let response = stack.execute(request, handler).await;
//! ```

mod layer;

pub use layer::{handler_fn, BoxFuture, BoxedNext, LayerStack, MiddlewareLayer};
