//! Read half handed to the receive loop

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf, ReadHalf};
use tokio::sync::watch;

type Teardown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Read half of a connection's transport
///
/// Reads hit end of stream once the owning [`Connection`](super::Connection)
/// is disconnected or dropped, even while the peer keeps writing. The read
/// half is released at that point, so the socket closes without the receive
/// loop having to drop its reader first.
pub struct ConnectionReader<S> {
    inner: Option<ReadHalf<S>>,
    teardown: Teardown,
}

impl<S> ConnectionReader<S> {
    pub(super) fn new(inner: ReadHalf<S>, mut closed: watch::Receiver<bool>) -> Self {
        let teardown = Box::pin(async move {
            loop {
                let is_closed = *closed.borrow_and_update();
                // A dropped sender means the connection itself is gone
                if is_closed || closed.changed().await.is_err() {
                    return;
                }
            }
        });

        Self {
            inner: Some(inner),
            teardown,
        }
    }

    /// Whether teardown has been observed and the read half released
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<S: AsyncRead> AsyncRead for ConnectionReader<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.inner.is_none() {
            return Poll::Ready(Ok(()));
        }

        if this.teardown.as_mut().poll(cx).is_ready() {
            this.inner = None;
            return Poll::Ready(Ok(()));
        }

        match this.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl<S> std::fmt::Debug for ConnectionReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionReader")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
