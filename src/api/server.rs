//! HTTP/1 server loop.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::routes::{handle, ApiResponse, ApiState};
use crate::error::{Error, Result};

/// Largest request body accepted
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Bind `addr` and serve until `shutdown` is cancelled
pub async fn serve(addr: &str, state: Arc<ApiState>, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

    let listener = TcpListener::bind(addr).await?;
    info!("Cache server listening on {}", addr);

    serve_listener(listener, state, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<ApiState>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Cache server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| respond(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, "Connection error: {}", e);
            }
        });
    }
}

async fn respond(
    state: Arc<ApiState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            return Ok(plain(StatusCode::BAD_REQUEST, "invalid request body"));
        }
    };

    let response = handle(
        &state,
        &parts.method,
        parts.uri.path(),
        parts.uri.query(),
        &body,
    );
    if response.status.is_server_error() {
        error!(method = %parts.method, path = parts.uri.path(), "Request failed");
    }
    Ok(into_response(response))
}

fn into_response(api: ApiResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(api.body));
    *response.status_mut() = api.status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(api.content_type));
    response
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn roundtrip(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_serves_set_and_get_over_tcp() {
        let cache = Cache::start(CacheConfig::default()).unwrap();
        cache.add_node("node-1");
        let state = Arc::new(ApiState::new(cache).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve_listener(listener, state, shutdown.clone()));

        let body = r#"{"key":"k","value":"v"}"#;
        let set = format!(
            "POST /api/v1/cache HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let response = roundtrip(addr, &set).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

        let get = "GET /api/v1/cache?key=k HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";
        let response = roundtrip(addr, get).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains(r#""value":"v""#));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_listen_address() {
        let cache = Cache::start(CacheConfig::default()).unwrap();
        let state = Arc::new(ApiState::new(cache).unwrap());
        let result = serve("not-an-address", state, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
