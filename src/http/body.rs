//! Response body types
//!
//! Every response carries a [`ResponseBody`]: either a fully buffered
//! payload, a stream read off an opened resource, or a [`PipeBody`] fed by
//! a producer task. A producer signals failure by pushing an error frame,
//! which makes hyper abort the connection instead of ending the body
//! cleanly.

use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Bytes, Frame};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Boxed body type shared by every handler
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Chunks buffered between a producer and the connection
pub const PIPE_CAPACITY: usize = 8;

/// Buffered body
pub fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Zero-length body
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Stream a reader until EOF
pub fn reader<R>(source: R) -> ResponseBody
where
    R: AsyncRead + Send + 'static,
{
    StreamBody::new(ReaderStream::new(source).map_ok(Frame::data)).boxed_unsync()
}

/// Create a bounded pipe whose read end is a response body
pub fn pipe(capacity: usize) -> (PipeSender, PipeBody) {
    let (tx, rx) = mpsc::channel(capacity);
    (PipeSender { tx }, PipeBody { rx })
}

/// Write end of a [`pipe`]
///
/// Usable from async code through [`send`](Self::send) and from a blocking
/// thread through its [`io::Write`] impl.
#[derive(Debug, Clone)]
pub struct PipeSender {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl PipeSender {
    pub async fn send(&self, chunk: Bytes) -> io::Result<()> {
        self.tx.send(Ok(chunk)).await.map_err(|_| closed())
    }

    /// Push an error frame so the client sees a truncated response
    pub async fn abort(&self, err: io::Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Blocking variant of [`send`](Self::send); must not run on a runtime thread
    pub fn blocking_send(&self, chunk: Bytes) -> io::Result<()> {
        self.tx.blocking_send(Ok(chunk)).map_err(|_| closed())
    }

    /// Blocking variant of [`abort`](Self::abort)
    pub fn blocking_abort(&self, err: io::Error) {
        let _ = self.tx.blocking_send(Err(err));
    }

    /// True once the body has been dropped (client went away)
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl io::Write for PipeSender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.blocking_send(Bytes::copy_from_slice(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped")
}

/// Read end of a [`pipe`]
#[derive(Debug)]
pub struct PipeBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl PipeBody {
    pub fn into_response_body(self) -> ResponseBody {
        self.boxed_unsync()
    }
}

impl Body for PipeBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|res| res.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_pipe_delivers_chunks_in_order() {
        let (tx, body) = pipe(PIPE_CAPACITY);
        tokio::spawn(async move {
            tx.send(Bytes::from_static(b"hello ")).await.unwrap();
            tx.send(Bytes::from_static(b"world")).await.unwrap();
        });
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello world");
    }

    #[tokio::test]
    async fn test_pipe_error_frame_fails_body() {
        let (tx, body) = pipe(PIPE_CAPACITY);
        tokio::spawn(async move {
            tx.send(Bytes::from_static(b"partial")).await.unwrap();
            tx.abort(io::Error::other("boom")).await;
        });
        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_blocking_writer() {
        let (tx, body) = pipe(PIPE_CAPACITY);
        tokio::task::spawn_blocking(move || {
            let mut w = tx;
            w.write_all(b"from a ").unwrap();
            w.write_all(b"thread").unwrap();
        });
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"from a thread");
    }

    #[tokio::test]
    async fn test_send_after_drop_is_broken_pipe() {
        let (tx, body) = pipe(1);
        drop(body);
        assert!(tx.is_closed());
        let err = tx.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
