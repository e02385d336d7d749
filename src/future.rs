use crate::body::CompressionBody;
use crate::codec::Codec;
use compression_core::Level;
use http::{Response, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

pin_project! {
    /// Response future for [`CompressionService`](crate::CompressionService).
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        codec: Option<Codec>,
        level: Level,
        min_size: usize,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, codec: Option<Codec>, level: Level, min_size: usize) -> Self {
        Self {
            inner,
            codec,
            level,
            min_size,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = match this.inner.poll(cx) {
            Poll::Ready(Ok(response)) => response,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        };
        Poll::Ready(Ok(encode_response(
            response,
            *this.codec,
            *this.level,
            *this.min_size,
        )))
    }
}

/// Installs the negotiated codec on the response, rewriting headers, or
/// passes the response through untouched when it must not be transformed.
fn encode_response<B>(
    response: Response<B>,
    codec: Option<Codec>,
    level: Level,
    min_size: usize,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    let codec = codec.filter(|_| eligible(&parts.headers, min_size));
    let Some(codec) = codec else {
        return Response::from_parts(parts, CompressionBody::identity(body));
    };

    let eager_flush = wants_eager_flush(&parts.headers);

    parts.headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static(codec.content_encoding()),
    );
    // The compressed length is only known once the stream finishes.
    parts.headers.remove(header::CONTENT_LENGTH);
    // Byte ranges cannot be served out of a compressed representation.
    parts.headers.remove(header::ACCEPT_RANGES);
    merge_vary(&mut parts.headers);

    debug!(encoding = codec.content_encoding(), "compressing response body");

    Response::from_parts(parts, CompressionBody::encode(body, codec, level, eager_flush))
}

/// Whether this response may be compressed at all.
fn eligible(headers: &header::HeaderMap, min_size: usize) -> bool {
    if headers.contains_key(header::CONTENT_ENCODING)
        || headers.contains_key(header::CONTENT_RANGE)
    {
        return false;
    }
    if known_length_below(headers, min_size) {
        return false;
    }
    match content_type(headers) {
        // Compressed image formats gain nothing; SVG is text.
        Some(ct) if ct.starts_with("image/") => ct.starts_with("image/svg+xml"),
        // Plain gRPC frames its own compression; grpc-web rides plain HTTP.
        Some(ct) if ct.starts_with("application/grpc") => {
            ct.starts_with("application/grpc-web")
        }
        _ => true,
    }
}

fn content_type(headers: &header::HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}

/// Whether a declared `Content-Length` falls under the configured minimum.
fn known_length_below(headers: &header::HeaderMap, min_size: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_some_and(|len| len < min_size)
}

/// Whether the encoder should flush after every chunk instead of letting the
/// compression window delay frames.
fn wants_eager_flush(headers: &header::HeaderMap) -> bool {
    if headers
        .get("x-accel-buffering")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("no"))
    {
        return true;
    }
    content_type(headers).is_some_and(|ct| {
        ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
    })
}

/// Merges `Accept-Encoding` into `Vary`, leaving `Vary: *` and existing
/// mentions alone.
fn merge_vary(headers: &mut header::HeaderMap) {
    let already_listed = headers.get_all(header::VARY).iter().any(|value| {
        value.to_str().is_ok_and(|value| {
            value.split(',').any(|member| {
                let member = member.trim();
                member == "*" || member.eq_ignore_ascii_case("accept-encoding")
            })
        })
    });
    if !already_listed {
        headers.append(
            header::VARY,
            header::HeaderValue::from_static("accept-encoding"),
        );
    }
}
