//! Connection accounting at the accept boundary.
//!
//! Wraps the TLS acceptor so every accepted connection is counted
//! against the per-endpoint limit for its whole lifetime. Over-limit
//! endpoints are refused before the handshake starts, which keeps the
//! rejection cheap; the count drops when the connection closes.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_server::accept::Accept;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::trust::conn_limit::{ConnectionRateLimiter, EndpointConnectionGuard};

/// Acceptor wrapper enforcing the per-endpoint connection limit.
///
/// Endpoints are keyed by peer IP address. A limit of zero or below
/// disables enforcement but connections are still tracked, so raising
/// the limit later takes effect without a restart.
#[derive(Clone)]
pub struct ConnectionLimitAcceptor<A> {
    inner: A,
    limiter: Arc<ConnectionRateLimiter>,
    limit: i64,
}

impl<A> ConnectionLimitAcceptor<A> {
    pub fn new(inner: A, limiter: Arc<ConnectionRateLimiter>, limit: i64) -> Self {
        Self {
            inner,
            limiter,
            limit,
        }
    }
}

impl<A, S> Accept<TcpStream, S> for ConnectionLimitAcceptor<A>
where
    A: Accept<TcpStream, S> + Clone + Send + Sync + 'static,
    A::Future: Send,
    A::Stream: Send,
    A::Service: Send,
    S: Send + 'static,
{
    type Stream = TrackedStream<A::Stream>;
    type Service = A::Service;
    type Future = Pin<Box<dyn Future<Output = io::Result<(Self::Stream, Self::Service)>> + Send>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let limit = self.limit;
        let inner = self.inner.clone();

        Box::pin(async move {
            let endpoint = stream
                .peer_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|_| "unknown".to_string());

            if !limiter.check(&endpoint, limit) {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "endpoint connection limit exceeded",
                ));
            }

            // Counted before the handshake so a slow handshake still
            // occupies its slot.
            let guard = limiter.track(&endpoint);
            let (stream, service) = inner.accept(stream, service).await?;
            Ok((
                TrackedStream {
                    inner: stream,
                    _guard: guard,
                },
                service,
            ))
        })
    }
}

/// Stream that holds its endpoint's connection slot until dropped.
pub struct TrackedStream<S> {
    inner: S,
    _guard: EndpointConnectionGuard,
}

impl<S: AsyncRead + Unpin> AsyncRead for TrackedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TrackedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
