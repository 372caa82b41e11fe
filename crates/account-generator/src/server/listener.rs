//! Listener binding and the connection accept loop.
//!
//! For each accepted TCP connection the loop:
//! 1. Performs the TLS handshake when a posture is configured. The client
//!    certificate verifier runs inside this step.
//! 2. Serves the Axum router over HTTP/1.1 or HTTP/2 (hyper-util auto builder).
//! 3. On cancellation, stops accepting, asks open connections to finish their
//!    in-flight requests, and waits for them.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use axum::{body::Body, extract::Request, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use super::middleware::HANDSHAKE_TIMEOUT;
use crate::tls::ListenerOptions;

/// Pending connection backlog passed to `listen(2)`.
const LISTEN_BACKLOG: u32 = 1024;

/// Bind a listener for `options`. Must be called within a Tokio runtime context.
///
/// # Errors
///
/// Returns an error if the host does not resolve or the socket cannot be bound.
pub fn bind(options: &ListenerOptions) -> io::Result<TcpListener> {
    let addr = resolve(&options.host, options.port)?;
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(options.reuse_address)?;
    #[cfg(unix)]
    socket.set_reuseport(options.reuse_port)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host} did not resolve to any address"),
        )
    })
}

/// Accept loop. Runs until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) {
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept error");
                    continue;
                }
            },
        };
        debug!(%peer, "accepted TCP connection");

        let router = router.clone();
        let tls = tls.clone();
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            match tls {
                Some(acceptor) => {
                    match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                        Ok(Ok(stream)) => serve_connection(stream, router, peer, shutdown).await,
                        Ok(Err(e)) => debug!(%peer, error = %e, "TLS handshake failed"),
                        Err(_) => debug!(%peer, "TLS handshake timed out"),
                    }
                }
                None => serve_connection(stream, router, peer, shutdown).await,
            }
        });
    }

    drop(listener);
    connections.close();
    info!(open_connections = connections.len(), "listener closed; draining connections");
    connections.wait().await;
}

async fn serve_connection<S>(stream: S, router: Router, peer: SocketAddr, shutdown: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(
        router.map_request(|req: Request<Incoming>| req.map(Body::new)),
    );
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_accepts_ip_literals() {
        let addr = resolve("127.0.0.1", 8545).unwrap();
        assert_eq!(addr, "127.0.0.1:8545".parse().unwrap());
    }

    #[test]
    fn resolve_rejects_unparsable_host() {
        assert!(resolve("not a host name", 80).is_err());
    }

    #[tokio::test]
    async fn bind_honours_ephemeral_port() {
        let listener = bind(&ListenerOptions::new("127.0.0.1", 0)).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn second_bind_without_port_reuse_fails() {
        let mut options = ListenerOptions::new("127.0.0.1", 0);
        options.reuse_port = false;
        options.reuse_address = false;
        let first = bind(&options).unwrap();

        options.port = first.local_addr().unwrap().port();
        assert!(bind(&options).is_err());
    }
}
