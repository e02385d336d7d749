use crate::codec::Codec;
use bytes::{Buf, Bytes, BytesMut};
use compression_codecs::EncodeV2;
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Scratch buffer handed to the encoder on each call. This is the only
/// buffering the wrapper does; total memory use is independent of body size.
const SCRATCH_SIZE: usize = 8 * 1024;

pin_project! {
    /// Response body produced by the middleware.
    ///
    /// Either streams the inner body through an incremental compression
    /// encoder or forwards it untouched, converting data frames to [`Bytes`]
    /// either way.
    #[project = BodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Frames are fed through a compression encoder.
        Encode {
            #[pin]
            inner: B,
            encoder: StreamEncoder,
        },
        /// Frames pass through unmodified.
        Identity {
            #[pin]
            inner: B,
        },
    }
}

/// Incremental encoder state for an actively compressed body.
pub struct StreamEncoder {
    encoder: Box<dyn EncodeV2 + Send>,
    scratch: Vec<u8>,
    eager_flush: bool,
    phase: Phase,
    held_trailers: Option<http::HeaderMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Streaming inner body frames through the encoder.
    Stream,
    /// Inner body finished; draining the encoder and writing the trailer.
    Finish,
    /// Compressed stream complete; a held trailer frame remains.
    Trailers,
    /// Nothing left to emit.
    Done,
}

impl<B> CompressionBody<B> {
    /// Wraps `inner` so its bytes are compressed with `codec`.
    pub(crate) fn encode(inner: B, codec: Codec, level: Level, eager_flush: bool) -> Self {
        Self::Encode {
            inner,
            encoder: StreamEncoder {
                encoder: codec.encoder(level),
                scratch: vec![0u8; SCRATCH_SIZE],
                eager_flush,
                phase: Phase::Stream,
                held_trailers: None,
            },
        }
    }

    /// Wraps `inner` without transforming it.
    pub(crate) fn identity(inner: B) -> Self {
        Self::Identity { inner }
    }

    /// Whether this body forwards the inner body unmodified.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity { .. })
    }

    #[cfg(test)]
    pub(crate) fn eager_flush(&self) -> bool {
        matches!(self, Self::Encode { encoder, .. } if encoder.eager_flush)
    }
}

impl StreamEncoder {
    fn poll_encode<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.phase {
                Phase::Done => return Poll::Ready(None),

                Phase::Trailers => {
                    self.phase = Phase::Done;
                    match self.held_trailers.take() {
                        Some(trailers) => return Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => return Poll::Ready(None),
                    }
                }

                Phase::Finish => match self.drain() {
                    Ok((chunk, done)) => {
                        if done {
                            self.phase = if self.held_trailers.is_some() {
                                Phase::Trailers
                            } else {
                                Phase::Done
                            };
                        }
                        if !chunk.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(chunk.freeze()))));
                        }
                    }
                    Err(e) => return Poll::Ready(Some(Err(e))),
                },

                Phase::Stream => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => self.phase = Phase::Finish,
                    Poll::Ready(Some(Err(e))) => {
                        return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(mut data) => {
                            let chunk = data.copy_to_bytes(data.remaining());
                            match self.consume(&chunk) {
                                // A small chunk can disappear into the encoder
                                // window; keep polling the inner body for more.
                                Ok(out) if out.is_empty() => {}
                                Ok(out) => return Poll::Ready(Some(Ok(Frame::data(out.freeze())))),
                                Err(e) => return Poll::Ready(Some(Err(e))),
                            }
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Trailers must come after the compressed
                                // stream is finalized; hold them until then.
                                self.held_trailers = Some(trailers);
                                self.phase = Phase::Finish;
                            }
                        }
                    },
                },
            }
        }
    }

    /// Feeds one plaintext chunk through the encoder, returning whatever
    /// compressed output it produced.
    fn consume(&mut self, chunk: &[u8]) -> io::Result<BytesMut> {
        let mut input = PartialBuffer::new(chunk);
        let mut out = BytesMut::new();

        while input.written_len() < chunk.len() {
            let consumed = input.written_len();
            let mut dst = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
            self.encoder
                .encode(&mut input, &mut dst)
                .map_err(io::Error::other)?;
            let produced = dst.written_len();
            out.extend_from_slice(&self.scratch[..produced]);
            if produced == 0 && input.written_len() == consumed {
                // Encoder accepted nothing; bail rather than spin.
                break;
            }
        }

        if self.eager_flush {
            loop {
                let mut dst = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
                let done = self
                    .encoder
                    .flush(&mut dst)
                    .map_err(io::Error::other)?;
                let produced = dst.written_len();
                out.extend_from_slice(&self.scratch[..produced]);
                if done {
                    break;
                }
            }
        }

        Ok(out)
    }

    /// Drives `finish`, returning produced bytes and whether the trailer has
    /// been fully written.
    fn drain(&mut self) -> io::Result<(BytesMut, bool)> {
        let mut dst = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
        let done = self
            .encoder
            .finish(&mut dst)
            .map_err(io::Error::other)?;
        let produced = dst.written_len();
        let mut out = BytesMut::new();
        out.extend_from_slice(&self.scratch[..produced]);
        Ok((out, done))
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            BodyProj::Identity { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
            },
            BodyProj::Encode { inner, encoder } => encoder.poll_encode(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Identity { inner } => inner.is_end_stream(),
            CompressionBody::Encode { encoder, .. } => encoder.phase == Phase::Done,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Identity { inner } => inner.size_hint(),
            // Compressed length is unknown until the stream finishes.
            CompressionBody::Encode { .. } => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use std::collections::VecDeque;
    use std::io::Read;

    /// A body that yields a fixed sequence of frames.
    struct SeqBody {
        frames: VecDeque<Frame<Bytes>>,
    }

    impl SeqBody {
        fn new(frames: impl IntoIterator<Item = Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into_iter().collect(),
            }
        }

        fn data(chunks: &[&'static str]) -> Self {
            Self::new(chunks.iter().map(|c| Frame::data(Bytes::from_static(c.as_bytes()))))
        }
    }

    impl Body for SeqBody {
        type Data = Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(self.frames.pop_front().map(Ok))
        }
    }

    fn poll_frame<B: Body + Unpin>(body: &mut B) -> Option<Result<Frame<B::Data>, B::Error>> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(body).poll_frame(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => None,
        }
    }

    /// Drains a body, returning concatenated data bytes and any trailers.
    fn collect<B>(body: &mut B) -> (Vec<u8>, Option<HeaderMap>)
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: std::fmt::Debug,
    {
        let mut data = Vec::new();
        let mut trailers = None;
        while let Some(frame) = poll_frame(body) {
            let frame = frame.unwrap();
            if frame.is_data() {
                assert!(trailers.is_none(), "data frame after trailers");
                data.extend_from_slice(&frame.into_data().unwrap());
            } else {
                trailers = Some(frame.into_trailers().unwrap());
            }
        }
        (data, trailers)
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut plain = Vec::new();
        flate2::read::GzDecoder::new(data)
            .read_to_end(&mut plain)
            .unwrap();
        plain
    }

    #[test]
    fn identity_forwards_data() {
        let mut body = CompressionBody::identity(SeqBody::data(&["hello ", "world"]));
        let (data, trailers) = collect(&mut body);
        assert_eq!(data, b"hello world");
        assert!(trailers.is_none());
    }

    #[test]
    fn identity_forwards_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());
        let inner = SeqBody::new([
            Frame::data(Bytes::from_static(b"data")),
            Frame::trailers(trailers),
        ]);
        let mut body = CompressionBody::identity(inner);

        let (data, trailers) = collect(&mut body);
        assert_eq!(data, b"data");
        assert_eq!(trailers.unwrap().get("x-checksum").unwrap(), "abc123");
    }

    #[test]
    fn gzip_round_trips_byte_for_byte() {
        let chunks = ["the quick brown fox ", "jumps over ", "the lazy dog"];
        let mut body = CompressionBody::encode(
            SeqBody::data(&chunks),
            Codec::Gzip,
            Level::Default,
            false,
        );
        let (data, _) = collect(&mut body);
        assert_eq!(&data[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&data), chunks.concat().as_bytes());
        assert!(body.is_end_stream());
    }

    #[test]
    fn deflate_round_trips() {
        let mut body = CompressionBody::encode(
            SeqBody::data(&["streaming deflate body"]),
            Codec::Deflate,
            Level::Default,
            false,
        );
        let (data, _) = collect(&mut body);
        let mut plain = Vec::new();
        flate2::read::DeflateDecoder::new(data.as_slice())
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, b"streaming deflate body");
    }

    #[test]
    fn brotli_round_trips() {
        let mut body = CompressionBody::encode(
            SeqBody::data(&["streaming brotli body"]),
            Codec::Brotli,
            Level::Default,
            false,
        );
        let (data, _) = collect(&mut body);
        let mut plain = Vec::new();
        brotli::Decompressor::new(data.as_slice(), 4096)
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, b"streaming brotli body");
    }

    #[test]
    fn empty_body_yields_a_valid_empty_stream() {
        let mut body =
            CompressionBody::encode(SeqBody::new([]), Codec::Gzip, Level::Default, false);
        let (data, _) = collect(&mut body);
        // Header and trailer only, still a decodable stream.
        assert!(!data.is_empty());
        assert_eq!(gunzip(&data), b"");
    }

    #[test]
    fn trailers_follow_the_finished_stream() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());
        let inner = SeqBody::new([
            Frame::data(Bytes::from_static(b"hello world")),
            Frame::trailers(trailers),
        ]);
        let mut body = CompressionBody::encode(inner, Codec::Gzip, Level::Default, false);

        // `collect` asserts no data frame arrives after the trailer frame.
        let (data, trailers) = collect(&mut body);
        assert_eq!(gunzip(&data), b"hello world");
        assert_eq!(trailers.unwrap().get("x-checksum").unwrap(), "abc123");
    }

    #[test]
    fn eager_flush_emits_output_per_chunk() {
        let mut body = CompressionBody::encode(
            SeqBody::data(&["a"]),
            Codec::Gzip,
            Level::Default,
            true,
        );
        // The flush forces the window out while the stream is still open.
        let first = poll_frame(&mut body).unwrap().unwrap();
        assert!(first.is_data());
        assert!(!first.data_ref().unwrap().is_empty());
        assert!(!body.is_end_stream());

        let mut data = first.into_data().unwrap().to_vec();
        let (rest, _) = collect(&mut body);
        data.extend_from_slice(&rest);
        assert_eq!(gunzip(&data), b"a");
    }
}
