//! Content-Encoding negotiation and streaming response compression for Tower.
//!
//! This crate provides a [`tower::Layer`] that inspects each request's
//! `Accept-Encoding` header, picks the best mutually supported encoding and
//! streams the response body through the matching compressor (gzip, deflate
//! or brotli). Bodies are compressed incrementally with a bounded scratch
//! buffer; the whole payload is never held in memory.
//!
//! # Example
//!
//! ```ignore
//! use tower_content_encoding::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new().min_size(0))
//!     .service(my_service);
//! ```
//!
//! # Negotiation
//!
//! Entries are weighted by their q-values; a missing or malformed q-value
//! counts as 1.0 and `*` stands for any encoding the client did not list.
//! When several encodings share the best quality the tie goes to the first
//! entry of the configured set, **gzip, then deflate, then brotli** by
//! default. This order is part of the observable behavior and is kept
//! stable. A request with no usable `Accept-Encoding` gets its response
//! back untouched.
//!
//! # Pass-through
//!
//! The response body and headers are left alone when:
//! - the skip predicate (see [`CompressionLayer::skip_when`]) matches,
//! - negotiation ends at identity,
//! - the response already carries `Content-Encoding`,
//! - the response is a range response (`Content-Range`),
//! - the content type is compressed media (`image/*` except `image/svg+xml`,
//!   `application/grpc` except grpc-web),
//! - a declared `Content-Length` is below the minimum size (default: 860).
//!
//! # Response modifications
//!
//! When compression is applied:
//! - `Content-Encoding` is set to the negotiated token,
//! - `Content-Length` and `Accept-Ranges` are removed,
//! - `Accept-Encoding` is merged into `Vary`.

#![deny(missing_docs)]

mod body;
mod codec;
mod future;
mod layer;
mod negotiate;
mod predicate;
mod service;

pub use body::CompressionBody;
pub use codec::Codec;
pub use compression_core::Level;
pub use future::ResponseFuture;
pub use layer::{CompressionLayer, DEFAULT_MIN_SIZE};
pub use predicate::{NeverSkip, SkipPredicate};
pub use service::CompressionService;
