use crate::config::EngineConfig;
use crate::error::EngineError;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::service::service_fn;
use hyper::{body::Bytes, body::Incoming, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use restful::dispatch::{CancelFlag, Dispatcher};
use restful::request::{HttpRequest, RequestBody};
use restful::response::HttpResponse;
use restful::routing::HttpMethod;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

const FALLBACK: &[u8] = b"{\"detail\":\"Internal Server Error\"}";

struct Shared {
    dispatcher: Dispatcher,
    max_body_bytes: usize,
}

/// HTTP/1 and HTTP/2 server that hands every request to a [`Dispatcher`].
///
/// The accept loop runs on its own tokio runtime in a background thread;
/// dispatch itself runs on the runtime's blocking pool.
pub struct HttpEngine {
    config: EngineConfig,
    dispatcher: Dispatcher,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpEngine {
    pub fn new(dispatcher: Dispatcher, config: EngineConfig) -> Self {
        Self {
            config,
            dispatcher,
            shutdown_tx: None,
            handle: None,
            local_addr: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bound address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Binds the configured address and starts serving in the background.
    pub fn serve(&mut self) -> Result<SocketAddr, EngineError> {
        if self.handle.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let addr = self.config.socket_addr()?;
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let runtime = Runtime::new()?;

        let shared = Arc::new(Shared {
            dispatcher: self.dispatcher.clone(),
            max_body_bytes: self.config.max_body_bytes,
        });
        let keep_alive = self.config.keep_alive;
        let (tx, rx) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name("restful-engine".to_string())
            .spawn(move || runtime.block_on(accept_loop(listener, shared, keep_alive, rx)))?;

        log::info!("listening on http://{}", local_addr);
        self.shutdown_tx = Some(tx);
        self.handle = Some(thread);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Stops accepting, drains open connections and joins the server thread.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("server thread panicked");
            }
            log::info!("server stopped");
        }
        self.local_addr = None;
    }
}

impl Drop for HttpEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: std::net::TcpListener,
    shared: Arc<Shared>,
    keep_alive: bool,
    mut rx: oneshot::Receiver<()>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("listener error: {e}");
            return;
        }
    };
    let mut builder = Builder::new(TokioExecutor::new());
    builder.http1().keep_alive(keep_alive);
    let graceful = GracefulShutdown::new();
    let mut join_set: JoinSet<()> = JoinSet::new();
    let mut shutdown_requested = false;

    loop {
        if shutdown_requested {
            break;
        }
        tokio::select! {
            _ = &mut rx => {
                shutdown_requested = true;
            }
            accept = listener.accept(), if !shutdown_requested => {
                let (stream, peer) = match accept {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("accept error: {e}");
                        continue;
                    }
                };
                log::trace!("connection from {peer}");
                let shared = Arc::clone(&shared);
                let http_builder = builder.clone();
                let watcher = graceful.watcher();
                join_set.spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| handle_request(req, Arc::clone(&shared)));
                    let connection = http_builder.serve_connection(io, service).into_owned();
                    if let Err(err) = watcher.watch(connection).await {
                        log::debug!("connection error from {peer}: {err}");
                    }
                });
            }
            Some(res) = join_set.join_next(), if !join_set.is_empty() => {
                log_join_error(res);
            }
        }
    }

    drop(listener);
    graceful.shutdown().await;
    while let Some(res) = join_set.join_next().await {
        log_join_error(res);
    }
}

fn log_join_error(res: Result<(), tokio::task::JoinError>) {
    if let Err(join_err) = res {
        if join_err.is_panic() {
            log::error!("connection task panicked: {join_err}");
        } else {
            log::warn!("connection task error: {join_err}");
        }
    }
}

/// Raises the request's cancel flag if the connection drops mid-dispatch.
struct CancelGuard {
    flag: CancelFlag,
    armed: bool,
}

impl CancelGuard {
    fn new(flag: CancelFlag) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("client went away, cancelling dispatch");
            self.flag.cancel();
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    shared: Arc<Shared>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let bytes = match Limited::new(body, shared.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return Ok(json_response(
                413,
                json!({ "detail": format!("request body exceeds {} bytes", shared.max_body_bytes) }),
            ));
        }
        Err(err) => {
            log::debug!("failed to read request body: {err}");
            return Ok(json_response(400, json!({ "detail": "unreadable request body" })));
        }
    };

    let request = match to_core_request(&parts, bytes) {
        Ok(request) => request,
        Err(response) => return Ok(response),
    };

    let dispatcher = shared.dispatcher.clone();
    let cancel = CancelFlag::new();
    let mut guard = CancelGuard::new(cancel.clone());
    let result =
        tokio::task::spawn_blocking(move || dispatcher.execute(&request, &cancel)).await;
    guard.disarm();

    match result {
        Ok(dispatched) => {
            log::debug!(
                "{} {} -> {} (request {})",
                parts.method,
                parts.uri.path(),
                dispatched.response.status_code,
                dispatched.request_id
            );
            Ok(to_hyper_response(dispatched.response))
        }
        Err(join_err) => {
            log::error!("dispatch task failed: {join_err}");
            Ok(json_response(500, json!({ "detail": "Internal Server Error" })))
        }
    }
}

/// Converts hyper request parts into the dispatcher's request type.
fn to_core_request(parts: &Parts, body: Bytes) -> Result<HttpRequest, Response<Full<Bytes>>> {
    let method: HttpMethod = parts.method.as_str().parse().map_err(|_| {
        json_response(
            501,
            json!({ "detail": format!("method {} is not supported", parts.method) }),
        )
    })?;
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());

    let mut request = HttpRequest::from_uri(method, uri);
    for (name, value) in parts.headers.iter() {
        match value.to_str() {
            Ok(value) => request = request.with_header(name.as_str(), value),
            Err(_) => log::debug!("dropping non-text header {}", name),
        }
    }
    if !body.is_empty() {
        request = request.with_body(RequestBody::Raw(body.to_vec()));
    }
    Ok(request)
}

fn to_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let body = response.body_bytes();
    let mut builder = Response::builder().status(response.status_code);
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => log::warn!("dropping invalid response header {:?}", name),
        }
    }
    builder.body(Full::from(body)).unwrap_or_else(|e| {
        log::error!("failed to build response: {e}");
        fallback_response()
    })
}

fn json_response(status: u16, body: serde_json::Value) -> Response<Full<Bytes>> {
    let encoded = serde_json::to_vec(&body).unwrap_or_else(|_| FALLBACK.to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(Full::from(encoded))
        .unwrap_or_else(|e| {
            log::error!("failed to build JSON response: {e}");
            fallback_response()
        })
}

fn fallback_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(FALLBACK)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
