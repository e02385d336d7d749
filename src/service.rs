use crate::body::CompressionBody;
use crate::codec::Codec;
use crate::future::ResponseFuture;
use crate::negotiate::negotiate;
use crate::predicate::{NeverSkip, SkipPredicate};
use compression_core::Level;
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::trace;

/// Immutable per-middleware configuration, shared read-only by every
/// in-flight request.
#[derive(Debug, Clone)]
pub(crate) struct CompressionConfig<P> {
    pub(crate) encodings: Arc<[Codec]>,
    pub(crate) level: Level,
    pub(crate) min_size: usize,
    pub(crate) skip: P,
}

/// A Tower service that compresses response bodies.
///
/// Built by [`CompressionLayer`](crate::CompressionLayer); wraps an inner
/// service, negotiates an encoding from each request's `Accept-Encoding`
/// header and installs a [`CompressionBody`] around the inner response.
#[derive(Debug, Clone)]
pub struct CompressionService<S, P = NeverSkip> {
    inner: S,
    config: CompressionConfig<P>,
}

impl<S, P> CompressionService<S, P> {
    pub(crate) fn new(inner: S, config: CompressionConfig<P>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, P, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S, P>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    P: SkipPredicate,
{
    type Response = http::Response<CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (parts, body) = req.into_parts();

        // The skip predicate runs exactly once, before negotiation.
        let codec = if self.config.skip.should_skip(&parts) {
            trace!(uri = %parts.uri, "compression skipped by predicate");
            None
        } else {
            let codec = parts
                .headers
                .get(http::header::ACCEPT_ENCODING)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| negotiate(value, &self.config.encodings));
            trace!(
                encoding = codec.map_or("identity", |c| c.content_encoding()),
                "negotiated response encoding"
            );
            codec
        };

        let inner = self.inner.call(Request::from_parts(parts, body));
        ResponseFuture::new(inner, codec, self.config.level, self.config.min_size)
    }
}
