//! HTTP transport: the router exposed as a coroutine HTTP service.

mod request;
mod response;
mod service;

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use may::coroutine::JoinHandle;
use may_minihttp::HttpServer;
use tracing::info;

pub use request::parse_request;
pub use response::write_response;
pub use service::RouterService;

use crate::router::Router;

/// A running server, tied to the router that backs it.
///
/// Dropping the handle leaves the accept loop running; call
/// [`ServerHandle::shutdown`] to stop serving and run the router's cleanup
/// callbacks, or [`ServerHandle::join`] to serve until the process exits.
pub struct ServerHandle {
    addr: SocketAddr,
    accept: JoinHandle<()>,
    router: Arc<Router>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the listener answers, giving up after `timeout`.
    pub fn wait_ready(&self, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("listener on {} did not come up", self.addr),
                ));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop accepting connections, wait for the accept coroutine to
    /// unwind, then run the router's registered cleanups (rate-limiter
    /// reapers and friends). The router stays usable for in-process
    /// dispatch afterwards.
    pub fn shutdown(self) {
        // Cancellation is the only way to interrupt may's blocking accept
        // loop.
        unsafe {
            self.accept.coroutine().cancel();
        }
        let _ = self.accept.join();
        self.router.shutdown();
        info!(addr = %self.addr, "server stopped");
    }

    /// Wait for the accept loop to exit on its own.
    pub fn join(self) -> std::thread::Result<()> {
        self.accept.join()
    }
}

/// Bind `addr` and serve `router` until the handle is shut down.
pub fn serve<A: ToSocketAddrs>(router: Arc<Router>, addr: A) -> io::Result<ServerHandle> {
    let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no usable socket address")
    })?;
    let accept = HttpServer(RouterService(Arc::clone(&router))).start(addr)?;
    info!(%addr, "listening");
    Ok(ServerHandle {
        addr,
        accept,
        router,
    })
}
