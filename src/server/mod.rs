//! HTTP Surface
//!
//! Two HTTP/1 listeners: the weather API and a Prometheus scrape endpoint.
//! Both stop accepting connections once their shutdown token is cancelled.

mod api;
mod metrics;

pub use api::{handle, parse_query, route, status_for, Current, Location, WeatherSummary};
pub use metrics::MetricsExporter;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::provider::{DataProvider, WeatherReport};
use crate::service::WeatherService;

/// Response type shared by every handler
pub type HttpResponse = Response<Full<Bytes>>;

/// Build a response without going through the fallible builder
pub(crate) fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Bind a listener, with the address in the error message
pub async fn bind(addr: &str, name: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} server address '{}': {}", name, addr, e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server on {}: {}", name, addr, e)))
}

/// Accept loop; one task per connection
pub async fn serve<H, Fut>(
    listener: TcpListener,
    name: &'static str,
    shutdown: CancellationToken,
    handler: H,
) -> Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<HttpResponse, Infallible>> + Send + 'static,
{
    info!("{} server listening on {}", name, listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("{} server stopped", name);
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("{} server accept error: {}", name, e)))?,
        };

        debug!(%peer, "{} connection accepted", name);
        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handler))
                .await
            {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}

/// Serve the weather API until `shutdown` fires
pub async fn run_api_server<D>(
    listener: TcpListener,
    service: Arc<WeatherService<D>>,
    shutdown: CancellationToken,
) -> Result<()>
where
    D: DataProvider<Payload = WeatherReport>,
{
    serve(listener, "API", shutdown, move |req| {
        handle(Arc::clone(&service), req)
    })
    .await
}

/// Serve `/metrics` until `shutdown` fires
pub async fn run_metrics_server<D>(
    listener: TcpListener,
    service: Arc<WeatherService<D>>,
    shutdown: CancellationToken,
) -> Result<()>
where
    D: DataProvider,
{
    let exporter = Arc::new(MetricsExporter::new()?);

    serve(listener, "Metrics", shutdown, move |req: Request<Incoming>| {
        let exporter = Arc::clone(&exporter);
        let service = Arc::clone(&service);
        async move {
            let response = match req.uri().path() {
                "/metrics" => exporter.scrape(&service.metrics(), service.cache().len()),
                _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
            };
            Ok::<_, Infallible>(response)
        }
    })
    .await
}
