// Request-handling steps
//
// Every step of a route's chain - plain handler functions, resolved DI
// middleware and the final controller action - is a `RequestHandler`. Steps
// receive shared request/response handles plus an explicit `Next`
// continuation, exactly like a transport-native handler.

use crate::{Error, Next, Request, Response};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A step in a route's handler chain.
///
/// Returning `Err` is equivalent to calling [`Next::fail`].
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), Error>;
}

/// A step that only runs once an earlier step has failed.
///
/// Calling [`Next::call`] hands control back to regular handlers; calling
/// [`Next::fail`] passes the (possibly replaced) error to the next error
/// handler.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, err: Error, req: Request, res: Response, next: Next)
    -> Result<(), Error>;
}

/// Type-erased handler as stored in route chains
pub type BoxedHandler = Arc<dyn RequestHandler>;

/// Type-erased error handler
pub type BoxedErrorHandler = Arc<dyn ErrorHandler>;

/// A handler that wraps an async function.
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    #[inline(always)]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    #[inline(always)]
    async fn handle(&self, req: Request, res: Response, next: Next) -> Result<(), Error> {
        (self.f)(req, res, next).await
    }
}

/// An error handler that wraps an async function.
#[derive(Clone)]
pub struct FnErrorHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(Error, Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    async fn handle(
        &self,
        err: Error,
        req: Request,
        res: Response,
        next: Next,
    ) -> Result<(), Error> {
        (self.f)(err, req, res, next).await
    }
}

/// Create a boxed handler from an async function.
///
/// # Example
///
/// ```ignore
/// let log = handler_fn(|req, _res, next| async move {
///     tracing::info!(path = req.path(), "incoming");
///     next.call();
///     Ok(())
/// });
/// ```
#[inline]
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}

/// Create a boxed error handler from an async function.
#[inline]
pub fn error_handler_fn<F, Fut>(f: F) -> BoxedErrorHandler
where
    F: Fn(Error, Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(FnErrorHandler { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpRequest;

    fn request() -> Request {
        Request::new(HttpRequest::new("GET", "/test"))
    }

    #[tokio::test]
    async fn test_fn_handler_can_respond() {
        let h = handler_fn(|_req, res, _next| async move { res.status(202).send("ok") });
        let res = Response::new();

        h.handle(request(), res.clone(), Next::new()).await.unwrap();

        let snapshot = res.to_http_response();
        assert_eq!(snapshot.status, 202);
        assert_eq!(snapshot.text(), "ok");
    }

    #[tokio::test]
    async fn test_fn_handler_can_continue() {
        let h = handler_fn(|_req, _res, next| async move {
            next.call();
            Ok(())
        });
        let next = Next::new();

        h.handle(request(), Response::new(), next.clone()).await.unwrap();
        assert!(next.is_called());
    }

    #[tokio::test]
    async fn test_error_handler_receives_error() {
        let h = error_handler_fn(|err, _req, res, _next| async move {
            res.status(err.status_code()).send(err.to_string())
        });
        let res = Response::new();

        h.handle(
            Error::Forbidden("nope".into()),
            request(),
            res.clone(),
            Next::new(),
        )
        .await
        .unwrap();

        assert_eq!(res.to_http_response().status, 403);
    }

    #[test]
    fn test_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn RequestHandler>();
        assert_send_sync::<dyn ErrorHandler>();
    }
}
