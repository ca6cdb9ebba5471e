//! HTTP body wrapper used for every request and response in the framework.
//!
//! [`ArborBody`] erases the concrete body implementation behind a boxed
//! stream of byte frames. Besides the usual conversions it offers
//! [`ArborBody::chunked`], which replays a buffered payload as fixed-size
//! frames so large serialized responses go out as a sequence of bounded
//! writes instead of one oversized frame.

use std::{
    fmt::Debug,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt, stream};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Frame, SizeHint};

use crate::types::{BoxBody, BoxError};

/// Size of each frame emitted by [`ArborBody::chunked`].
const CHUNK_SIZE: usize = 8 * 1024;

/// Boxed HTTP body with streaming support.
pub struct ArborBody(BoxBody);

impl ArborBody {
    /// Wraps any [`Body`] implementation, boxing it and mapping its error.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self(body.map_err(|e| e.into()).boxed_unsync())
    }

    /// Creates a body from a stream of byte results.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + Debug + 'static,
    {
        let stream = stream.map_err(Into::into).map_ok(Frame::data);
        Self(StreamBody::new(stream).boxed_unsync())
    }

    /// Creates a body that replays `payload` as 8 KiB frames.
    ///
    /// The final frame carries whatever remains and ends the stream, so the
    /// transport sees `more_body = false` exactly once.
    pub fn chunked(payload: Bytes) -> Self {
        if payload.len() <= CHUNK_SIZE {
            return Self::new(Full::from(payload));
        }

        let chunks = stream::iter(
            ChunkIter { payload, offset: 0 }.map(Ok::<_, std::convert::Infallible>),
        );
        Self::from_stream(chunks)
    }

    /// Creates an empty body.
    pub fn empty() -> Self {
        Self::new(Empty::new())
    }
}

struct ChunkIter {
    payload: Bytes,
    offset: usize,
}

impl Iterator for ChunkIter {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + CHUNK_SIZE).min(self.payload.len());
        let chunk = self.payload.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }
}

impl Default for ArborBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<()> for ArborBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<&str> for ArborBody {
    fn from(buf: &str) -> Self {
        Self::new(Full::from(buf.to_owned()))
    }
}

macro_rules! body_from_impl {
    ($ty:ty) => {
        impl From<$ty> for ArborBody {
            fn from(buf: $ty) -> Self {
                Self::new(Full::from(buf))
            }
        }
    };
}

body_from_impl!(String);
body_from_impl!(Vec<u8>);
body_from_impl!(Bytes);

impl Body for ArborBody {
    type Data = Bytes;
    type Error = BoxError;

    #[inline]
    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.0).poll_frame(cx)
    }

    #[inline]
    fn size_hint(&self) -> SizeHint {
        self.0.size_hint()
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }
}
