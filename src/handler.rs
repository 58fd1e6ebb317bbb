//! The application-supplied request handler: a functional value the
//! connection pipeline drives once per request, rather than a concrete
//! function wired directly into the pipeline.
//!
//! An async fn in a trait isn't directly object-safe, so the handler's
//! future is boxed with `futures::future::BoxFuture`.

use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::HttpError;

/// A request handler: given a mutable borrow of the context for the
/// duration of the call, produces a boxed future resolving to `()` on
/// success (the handler is expected to have written and flushed a response
/// through the context before returning) or an `HttpError` that the
/// connection pipeline turns into an error response or a torn-down
/// connection.
pub type Handler = Box<dyn for<'a> Fn(&'a mut Context<'_>) -> BoxFuture<'a, Result<(), HttpError>> + Send + Sync>;

/// Wraps a plain async closure as a `Handler`. Most callers will use this
/// rather than constructing the trait object directly, since the explicit
/// higher-ranked trait bound on `Handler` is awkward to name at a closure
/// literal's call site.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Context<'_>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), HttpError>> + Send + 'static,
{
    Box::new(move |ctx| Box::pin(f(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_wraps_without_panicking() {
        let _h: Handler = handler(|ctx: &mut Context<'_>| {
            let status = ctx.request.path.len();
            async move {
                let _ = status;
                Ok(())
            }
        });
    }
}
