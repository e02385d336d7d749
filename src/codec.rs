use compression_codecs::{
    EncodeV2,
    brotli::{BrotliEncoder, params::EncoderParams as BrotliParams},
    deflate::DeflateEncoder,
    gzip::GzipEncoder,
};
use compression_core::Level;

/// Content encodings the middleware can produce.
///
/// The priority order used to break quality-value ties is the order of the
/// configured encoding set (see
/// [`CompressionLayer::encodings`](crate::CompressionLayer::encodings)), not
/// the declaration order of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Gzip (RFC 1952).
    Gzip,
    /// Raw DEFLATE (RFC 1951), the common reading of the `deflate` token.
    Deflate,
    /// Brotli (RFC 7932).
    Brotli,
}

impl Codec {
    /// Token written to the `Content-Encoding` response header.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
            Codec::Brotli => "br",
        }
    }

    /// Whether `token` from an `Accept-Encoding` entry names this codec.
    /// Matching is case-insensitive and accepts the historical aliases
    /// `x-gzip` and `brotli`.
    pub(crate) fn matches_token(&self, token: &str) -> bool {
        match self {
            Codec::Gzip => {
                token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip")
            }
            Codec::Deflate => token.eq_ignore_ascii_case("deflate"),
            Codec::Brotli => {
                token.eq_ignore_ascii_case("br") || token.eq_ignore_ascii_case("brotli")
            }
        }
    }

    /// Builds an incremental encoder for this codec.
    ///
    /// `level` applies to the DEFLATE-family codecs; brotli uses the
    /// library-default encoder parameters.
    pub(crate) fn encoder(&self, level: Level) -> Box<dyn EncodeV2 + Send> {
        match self {
            Codec::Gzip => Box::new(GzipEncoder::new(level.into())),
            Codec::Deflate => Box::new(DeflateEncoder::new(level.into())),
            Codec::Brotli => Box::new(BrotliEncoder::new(BrotliParams::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compression_core::util::{PartialBuffer, WriteBuffer};
    use std::io::Read;

    fn run_encoder(codec: Codec, input: &[u8]) -> Vec<u8> {
        let mut encoder = codec.encoder(Level::Default);
        let mut scratch = vec![0u8; 1024];
        let mut out = Vec::new();

        let mut partial = PartialBuffer::new(input);
        while partial.written_len() < input.len() {
            let mut dst = WriteBuffer::new_initialized(scratch.as_mut_slice());
            encoder.encode(&mut partial, &mut dst).unwrap();
            let produced = dst.written_len();
            out.extend_from_slice(&scratch[..produced]);
        }
        loop {
            let mut dst = WriteBuffer::new_initialized(scratch.as_mut_slice());
            let done = encoder.finish(&mut dst).unwrap();
            let produced = dst.written_len();
            out.extend_from_slice(&scratch[..produced]);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn content_encoding_tokens() {
        assert_eq!(Codec::Gzip.content_encoding(), "gzip");
        assert_eq!(Codec::Deflate.content_encoding(), "deflate");
        assert_eq!(Codec::Brotli.content_encoding(), "br");
    }

    #[test]
    fn token_matching_is_case_insensitive() {
        assert!(Codec::Gzip.matches_token("GZIP"));
        assert!(Codec::Gzip.matches_token("x-gzip"));
        assert!(Codec::Brotli.matches_token("br"));
        assert!(Codec::Brotli.matches_token("Brotli"));
        assert!(!Codec::Deflate.matches_token("gzip"));
    }

    #[test]
    fn gzip_encoder_writes_magic_and_round_trips() {
        let out = run_encoder(Codec::Gzip, b"hello world");
        assert_eq!(&out[..2], &[0x1f, 0x8b]);

        let mut plain = Vec::new();
        flate2::read::GzDecoder::new(out.as_slice())
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn deflate_encoder_round_trips() {
        let out = run_encoder(Codec::Deflate, b"hello world");
        let mut plain = Vec::new();
        flate2::read::DeflateDecoder::new(out.as_slice())
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn brotli_encoder_round_trips() {
        let out = run_encoder(Codec::Brotli, b"hello world");
        let mut plain = Vec::new();
        brotli::Decompressor::new(out.as_slice(), 4096)
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, b"hello world");
    }
}
