use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::BoxError;

/// A request or response body.
///
/// A body built from bytes is *repeatable*: it can be cloned and re-sent
/// when a request is retried or redirected. A streaming body can be read
/// only once.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Reusable(Bytes),
    Streaming(Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Body {
        Body::reusable(Bytes::new())
    }

    /// Wrap a stream of chunks.
    ///
    /// # Note
    ///
    /// Streaming bodies cannot be replayed: a request carrying one is not
    /// retried, and a redirect that must repeat it fails.
    pub fn wrap_stream<S, E>(stream: S) -> Body
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Body {
            inner: Inner::Streaming(Box::pin(stream.map(|chunk| chunk.map_err(Into::into)))),
        }
    }

    pub(crate) fn reusable(chunk: Bytes) -> Body {
        Body {
            inner: Inner::Reusable(chunk),
        }
    }

    /// Returns the full body if it is held in memory.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(bytes.as_ref()),
            Inner::Streaming(..) => None,
        }
    }

    /// Returns true if the body can be sent more than once.
    pub fn is_repeatable(&self) -> bool {
        matches!(self.inner, Inner::Reusable(..))
    }

    /// Returns true if the body is known to be empty.
    pub fn is_empty(&self) -> bool {
        matches!(&self.inner, Inner::Reusable(bytes) if bytes.is_empty())
    }

    /// The exact length, if known.
    pub fn content_length(&self) -> Option<u64> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(bytes.len() as u64),
            Inner::Streaming(..) => None,
        }
    }

    /// A copy of a repeatable body; `None` for streams.
    pub fn try_clone(&self) -> Option<Body> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(Body::reusable(bytes.clone())),
            Inner::Streaming(..) => None,
        }
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> crate::Result<Bytes> {
        match self.inner {
            Inner::Reusable(bytes) => Ok(bytes),
            Inner::Streaming(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk.map_err(crate::error::cast)?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Read and discard the rest of the body.
    ///
    /// For a response body this releases its connection back to the pool.
    pub async fn drain(self) -> crate::Result<()> {
        if let Inner::Streaming(mut stream) = self.inner {
            while let Some(chunk) = stream.next().await {
                chunk.map_err(crate::error::cast)?;
            }
        }
        Ok(())
    }
}

impl Stream for Body {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner {
            Inner::Reusable(ref mut bytes) => {
                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(std::mem::take(bytes))))
                }
            }
            Inner::Streaming(ref mut stream) => stream.as_mut().poll_next(cx),
        }
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl From<Bytes> for Body {
    #[inline]
    fn from(bytes: Bytes) -> Body {
        Body::reusable(bytes)
    }
}

impl From<Vec<u8>> for Body {
    #[inline]
    fn from(vec: Vec<u8>) -> Body {
        Body::reusable(vec.into())
    }
}

impl From<&'static [u8]> for Body {
    #[inline]
    fn from(s: &'static [u8]) -> Body {
        Body::reusable(Bytes::from_static(s))
    }
}

impl From<String> for Body {
    #[inline]
    fn from(s: String) -> Body {
        Body::reusable(s.into())
    }
}

impl From<&'static str> for Body {
    #[inline]
    fn from(s: &'static str) -> Body {
        s.as_bytes().into()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.inner {
            Inner::Reusable(bytes) => f.debug_tuple("Body").field(bytes).finish(),
            Inner::Streaming(..) => f.debug_tuple("Body").field(&"streaming").finish(),
        }
    }
}
