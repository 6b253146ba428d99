// Application stack and HTTP server

use crate::http::Signal;
use crate::logging::{debug, error, info, trace};
use crate::routing::strip_mount;
use crate::{
    BoxedErrorHandler, BoxedHandler, Error, HttpRequest, HttpResponse, Next, Request, Response,
    Router,
};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request as HyperRequest, Response as HyperResponse, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

enum Layer {
    Handler(BoxedHandler),
    Router { root: String, router: Arc<Router> },
    ErrorHandler(BoxedErrorHandler),
}

/// Outcome of running one step
enum Flow {
    Continue,
    Fail(Error),
    Done,
}

/// An ordered stack of global handlers, mounted routers and error handlers.
///
/// Layers run in the order they were added. Regular layers are skipped while
/// an error is pending; error handlers are skipped while none is.
#[derive(Default)]
pub struct Application {
    layers: Vec<Layer>,
}

impl Application {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a handler that runs for every request
    pub fn use_handler(&mut self, handler: BoxedHandler) -> &mut Self {
        self.layers.push(Layer::Handler(handler));
        self
    }

    /// Mount a router below a root path
    pub fn use_router(&mut self, root: impl Into<String>, router: Router) -> &mut Self {
        self.layers.push(Layer::Router {
            root: root.into(),
            router: Arc::new(router),
        });
        self
    }

    /// Add an error handler
    pub fn use_error_handler(&mut self, handler: BoxedErrorHandler) -> &mut Self {
        self.layers.push(Layer::ErrorHandler(handler));
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Run a request through the stack and return the finished response
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let req = Request::new(request);
        let res = Response::new();

        debug!(method = %req.method(), path = %req.path(), "Handling request");

        let (pending, finished) = self.run_layers(&req, &res).await;

        if let Some(err) = pending {
            render_error(&err, &res);
        } else if !finished && !res.headers_sent() {
            let err = Error::RouteNotFound(format!("{} {}", req.method(), req.path()));
            render_error(&err, &res);
        }

        // Releases the per-request context and everything it owns
        req.extensions_mut().clear();

        res.to_http_response()
    }

    async fn run_layers(&self, req: &Request, res: &Response) -> (Option<Error>, bool) {
        let mut pending: Option<Error> = None;

        for (index, layer) in self.layers.iter().enumerate() {
            trace!(layer_index = index, error_pending = pending.is_some(), "Visiting layer");

            let flow = match (layer, pending.take()) {
                (Layer::Handler(handler), None) => run_step(handler, req, res).await,
                (Layer::Router { root, router }, None) => {
                    run_router(root, router, req, res).await
                }
                (Layer::ErrorHandler(handler), Some(err)) => {
                    let next = Next::new();
                    let result = handler
                        .handle(err, req.clone(), res.clone(), next.clone())
                        .await;
                    flow_of(result, &next)
                }
                (_, still_pending) => {
                    pending = still_pending;
                    continue;
                }
            };

            match flow {
                Flow::Continue => {}
                Flow::Fail(err) => pending = Some(err),
                Flow::Done => return (None, true),
            }
        }

        (pending, false)
    }

    /// Start the HTTP server on the specified port
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        info!(%addr, "Server listening");

        let app = Arc::new(self);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let app = app.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: HyperRequest<IncomingBody>| {
                    let app = app.clone();
                    async move { handle_hyper_request(req, app).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = ?err, "Error serving connection");
                }
            });
        }
    }
}

async fn run_step(handler: &BoxedHandler, req: &Request, res: &Response) -> Flow {
    let next = Next::new();
    let result = handler.handle(req.clone(), res.clone(), next.clone()).await;
    flow_of(result, &next)
}

async fn run_router(root: &str, router: &Router, req: &Request, res: &Response) -> Flow {
    let Some(path) = strip_mount(root, req.path()) else {
        return Flow::Continue;
    };

    for (route, params) in router.matches(req.method(), path) {
        trace!(method = %route.method, route = %route.path, "Route matched");
        req.set_params(params);

        for handler in &route.handlers {
            match run_step(handler, req, res).await {
                Flow::Continue => {}
                Flow::Fail(err) => return Flow::Fail(err),
                Flow::Done => return Flow::Done,
            }
        }

        trace!(route = %route.path, "Route chain completed, trying next match");
    }

    Flow::Continue
}

fn flow_of(result: Result<(), Error>, next: &Next) -> Flow {
    if let Err(err) = result {
        return Flow::Fail(err);
    }
    match next.take() {
        Some(Signal::Continue) => Flow::Continue,
        Some(Signal::Fail(err)) => Flow::Fail(err),
        None => Flow::Done,
    }
}

/// Default rendering of an error nobody handled
fn render_error(err: &Error, res: &Response) {
    if res.headers_sent() {
        error!(error = %err, "Unhandled error after the response was sent");
        return;
    }

    let status = err.status_code();
    if status >= 500 {
        error!(error = %err, status, "Unhandled request error");
    } else {
        debug!(error = %err, status, "Request failed");
    }

    let body = serde_json::json!({
        "error": err.to_string(),
        "status": status,
    });
    res.status(status);
    if let Err(send_err) = res.send_json(&body) {
        error!(error = %send_err, "Failed to render error response");
    }
}

/// Handle an incoming hyper request
async fn handle_hyper_request(
    req: HyperRequest<IncomingBody>,
    app: Arc<Application>,
) -> Result<HyperResponse<Full<bytes::Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, path);

    for (name, value) in req.headers() {
        if let Ok(value_str) = value.to_str() {
            request
                .headers
                .insert(name.as_str().to_string(), value_str.to_string());
        }
    }

    let body_bytes = req.collect().await?.to_bytes();
    request.body = body_bytes.to_vec();

    let response = app.handle(request).await;

    let mut builder = HyperResponse::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    let body = Full::new(bytes::Bytes::from(response.body));
    Ok(builder.body(body).unwrap_or_else(|err| {
        error!(error = %err, "Invalid response head, sending 500");
        let mut fallback = HyperResponse::new(Full::new(bytes::Bytes::new()));
        *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    }))
}
