use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{Response, IntoResponse};
use bytes::{Bytes, BytesMut};
use http_body::{Body, SizeHint, Frame};
use futures::Stream;
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::RangeBody;

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body stream. Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// Yields exactly `length` bytes starting at `start`, at most
/// [`IO_BUFFER_SIZE`] per chunk. Dropping the stream drops the body, which
/// releases any file handle it owns.
#[pin_project]
pub struct RangedStream<B> {
    state: StreamState,
    length: u64,
    #[pin]
    body: B,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64) -> Self {
        RangedStream {
            state: StreamState::Seek { start },
            length,
            body,
        }
    }
}

impl<B> std::fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Done,
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let StreamState::Seek { start } = *this.state {
            let remaining = *this.length;
            if remaining == 0 {
                *this.state = StreamState::Done;
                return Poll::Ready(None);
            }
            match this.body.as_mut().start_seek(start) {
                Err(e) => { return Poll::Ready(Some(Err(fail(this.state, e)))); }
                Ok(()) => {
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match this.body.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(fail(this.state, e)))); }
                Poll::Ready(Ok(())) => {
                    let buffer = allocate_buffer();
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        let (buffer, remaining) = match this.state {
            StreamState::Reading { buffer, remaining } => (buffer, remaining),
            StreamState::Done => return Poll::Ready(None),
            _ => unreachable!("seek states are resolved above"),
        };

        let uninit = buffer.spare_capacity_mut();

        // calculate max number of bytes to read in this iteration, the
        // smaller of the buffer size and the number of bytes remaining
        let nbytes = std::cmp::min(
            uninit.len(),
            usize::try_from(*remaining).unwrap_or(usize::MAX),
        );

        let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

        match this.body.as_mut().poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(fail(this.state, e)))),
            Poll::Ready(Ok(())) => {
                match read_buf.filled().len() {
                    0 => {
                        // the body ended inside the window it promised to serve
                        let missing = *remaining;
                        let e = io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("body ended with {missing} bytes of the range unread"),
                        );
                        Poll::Ready(Some(Err(fail(this.state, e))))
                    }
                    n => {
                        // SAFETY: poll_read has filled the buffer with `n`
                        // additional bytes. `buffer.len` should always be
                        // 0 here, but include it for rigorous correctness
                        unsafe { buffer.set_len(buffer.len() + n); }

                        // this usize->u64 conversion always succeeds, n is
                        // bounded by remaining through the cmp::min above
                        *remaining -= u64::try_from(n).unwrap();

                        let chunk = if *remaining == 0 {
                            let chunk = mem::take(buffer);
                            *this.state = StreamState::Done;
                            chunk
                        } else {
                            mem::replace(buffer, allocate_buffer())
                        };

                        Poll::Ready(Some(Ok(chunk.freeze())))
                    }
                }
            }
        }
    }
}

/// Moves the stream to its terminal state so the error is reported once.
fn fail(state: &mut StreamState, e: io::Error) -> io::Error {
    tracing::warn!(error = %e, "ranged body read failed");
    *state = StreamState::Done;
    e
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}
