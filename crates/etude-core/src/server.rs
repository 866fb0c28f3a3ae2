//! axum transport binding.
//!
//! ```text
//! TcpListener
//!   → axum (TraceLayer, x-request-id)
//!     → fallback: decode body + urlencoded or multipart form into a core Request
//!       → Dispatcher on the blocking pool
//!         → one `Set-Cookie` header per queued directive
//! ```
//!
//! The binding owns no routes of its own; every path falls through to the
//! dispatcher.

use std::future::Future;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use tokio::net::TcpListener;
use tower_http::LatencyUnit;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use crate::dispatch::Dispatcher;
use crate::error::EtudeError;
use crate::http::{FormData, Method, Request, Response};

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    max_body_size: usize,
}

/// Build the axum router that feeds every request to `dispatcher`.
pub fn axum_router(dispatcher: Dispatcher, max_body_size: usize) -> axum::Router {
    let x_request_id = HeaderName::from_static("x-request-id");
    axum::Router::new()
        .fallback(handle)
        .with_state(ServerState {
            dispatcher,
            max_body_size,
        })
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new().level(tracing::Level::DEBUG))
                .on_response(
                    DefaultOnResponse::new()
                        .level(tracing::Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}

/// Serve until `shutdown` resolves.
pub async fn serve_until<F>(
    listener: TcpListener,
    router: axum::Router,
    shutdown: F,
) -> Result<(), EtudeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(dispatcher: Dispatcher, addr: &str, max_body_size: usize) -> Result<(), EtudeError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Etude server running on http://{}", addr);
    serve_until(listener, axum_router(dispatcher, max_body_size), shutdown_signal()).await
}

pub(crate) async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down Etude server..."),
        Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
    }
}

async fn handle(State(state): State<ServerState>, req: axum::extract::Request) -> axum::response::Response {
    let request = match into_core_request(req, state.max_body_size).await {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let dispatched = state.dispatcher.handle_async(request).await;
    into_axum_response(dispatched.response)
}

async fn into_core_request(
    req: axum::extract::Request,
    max_body_size: usize,
) -> Result<Request, axum::response::Response> {
    let (parts, body) = req.into_parts();

    let target = match parts.uri.query() {
        Some(query) => format!("{}?{}", parts.uri.path(), query),
        None => parts.uri.path().to_string(),
    };
    let mut request = Request::new(Method::from_bytes(parts.method.as_str().as_bytes()), target);
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request.headers.push((name.as_str().to_string(), value.to_string())),
            Err(_) => tracing::debug!(header = %name, "Dropping non-ASCII header value"),
        }
    }

    let bytes = axum::body::to_bytes(body, max_body_size).await.map_err(|e| {
        tracing::warn!("Request body rejected: {}", e);
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
    })?;

    if request.is_form_encoded() {
        request.form = FormData::from_urlencoded(&bytes)
            .map_err(|e| into_axum_response(e.to_response()))?;
    } else if request.is_multipart() {
        let rebuilt = axum::extract::Request::from_parts(parts, Body::from(bytes.clone()));
        request.form = multipart_fields(rebuilt).await?;
    }
    request.body = bytes;
    Ok(request)
}

/// Text fields of a `multipart/form-data` body. File parts stay in the raw
/// body for handlers that want them.
async fn multipart_fields(
    req: axum::extract::Request,
) -> Result<FormData, axum::response::Response> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(IntoResponse::into_response)?;
    let malformed = |e: axum::extract::multipart::MultipartError| {
        into_axum_response(
            EtudeError::BadRequest(format!("Malformed multipart body: {}", e)).to_response(),
        )
    };

    let mut form = FormData::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(malformed)?;
        form.append(name, value);
    }
    Ok(form)
}

fn into_axum_response(response: Response) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = axum::response::Response::new(Body::from(response.body));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(response.content_type));
    for (name, value) in response.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value)) {
            // append, not insert: every Set-Cookie stays its own header line
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid response header"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_keeps_every_set_cookie() {
        let response = Response::text("ok")
            .header("Set-Cookie", "a=1; Path=/")
            .header("Set-Cookie", "b=2; Path=/")
            .header("X-Bad\n", "skipped");
        let out = into_axum_response(response);

        assert_eq!(out.status(), StatusCode::OK);
        let cookies: Vec<_> = out
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, vec!["a=1; Path=/", "b=2; Path=/"]);
        assert_eq!(out.headers().len(), 3);
    }

    #[tokio::test]
    async fn converts_form_posts() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/login?next=%2Fhome")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("cookie", "xsrf=abc")
            .body(Body::from("user=ann&xsrf=tok"))
            .unwrap();
        let request = into_core_request(req, 1024).await.unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/login");
        assert_eq!(request.query.as_deref(), Some("next=%2Fhome"));
        assert_eq!(request.form.get_first("user"), Some("ann"));
        assert_eq!(request.cookie("xsrf").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let rejection = into_core_request(req, 16).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
