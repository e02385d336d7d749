use crate::codec::Codec;
use crate::predicate::{NeverSkip, SkipPredicate};
use crate::service::{CompressionConfig, CompressionService};
use compression_core::Level;
use std::sync::Arc;
use tower::Layer;

/// Default minimum body size for compression (approximately one MTU).
pub const DEFAULT_MIN_SIZE: usize = 860;

// Priority order when none is configured. Ties in client quality values
// resolve to the earliest entry, so this order is observable behavior and
// must stay stable.
const DEFAULT_ENCODINGS: [Codec; 3] = [Codec::Gzip, Codec::Deflate, Codec::Brotli];

/// A Tower layer that negotiates and applies response compression.
///
/// The layer is built once at startup and is read-only afterwards; every
/// service it produces shares the same configuration.
#[derive(Debug, Clone)]
pub struct CompressionLayer<P = NeverSkip> {
    encodings: Arc<[Codec]>,
    level: Level,
    min_size: usize,
    skip: P,
}

impl CompressionLayer {
    /// Creates a layer with the default configuration: gzip, deflate and
    /// brotli in that priority order, library-default compression level,
    /// a 860-byte minimum size and no skip predicate.
    pub fn new() -> Self {
        Self {
            encodings: Arc::from(DEFAULT_ENCODINGS),
            level: Level::Default,
            min_size: DEFAULT_MIN_SIZE,
            skip: NeverSkip,
        }
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> CompressionLayer<P> {
    /// Sets the compression level for the DEFLATE-family codecs.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the minimum declared `Content-Length` required before
    /// compressing. Responses of unknown length are always eligible.
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Replaces the supported encoding set. The order is the priority order
    /// used to break quality-value ties; an empty set disables compression.
    pub fn encodings(mut self, encodings: impl Into<Arc<[Codec]>>) -> Self {
        self.encodings = encodings.into();
        self
    }

    /// Installs a predicate that bypasses compression for matching requests.
    ///
    /// ```
    /// use tower_content_encoding::CompressionLayer;
    ///
    /// let layer = CompressionLayer::new()
    ///     .skip_when(|head: &http::request::Parts| head.uri.path().starts_with("/raw/"));
    /// ```
    pub fn skip_when<Q>(self, skip: Q) -> CompressionLayer<Q>
    where
        Q: SkipPredicate,
    {
        CompressionLayer {
            encodings: self.encodings,
            level: self.level,
            min_size: self.min_size,
            skip,
        }
    }
}

impl<S, P> Layer<S> for CompressionLayer<P>
where
    P: Clone,
{
    type Service = CompressionService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(
            inner,
            CompressionConfig {
                encodings: Arc::clone(&self.encodings),
                level: self.level,
                min_size: self.min_size,
                skip: self.skip.clone(),
            },
        )
    }
}
