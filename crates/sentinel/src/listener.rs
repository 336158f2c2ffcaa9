//! Supervisor-owned listening sockets handed to child processes.
//!
//! A process group that declares `manage-port` gets one [`ManagedListener`].
//! The supervisor binds it before any replica starts and passes the raw
//! descriptor to each child, which accepts on the pre-bound socket instead of
//! binding its own.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sentinel_config::Config;
use socket2::{Domain, Socket, Type};
use tracing::{debug, info};

use crate::error::SentinelError;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::listener");
const BIND_RETRY: Duration = Duration::from_millis(100);

/// Flag introducing the port argument passed to child processes.
pub const PORT_FLAG: &str = "--port";

/// Socket options applied when a managed listener is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    /// Address to bind.
    pub host: String,
    /// Backlog handed to `listen(2)`.
    pub backlog: i32,
    /// Whether `SO_REUSEADDR` is set before binding.
    pub reuse_address: bool,
    /// How long a failing bind is retried.
    pub timeout: Duration,
}

impl ListenerSettings {
    /// Extracts listener settings from the manager configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.listen_host.clone(),
            backlog: config.backlog,
            reuse_address: config.reuse_address,
            timeout: config.bind_timeout(),
        }
    }
}

/// Pre-bound TCP listener owned by one process group.
#[derive(Debug)]
pub struct ManagedListener {
    group: String,
    port: u16,
    socket: Option<TcpListener>,
}

impl ManagedListener {
    /// Creates a closed listener for `group` on `port`.
    #[must_use]
    pub fn new(group: impl Into<String>, port: u16) -> Self {
        Self {
            group: group.into(),
            port,
            socket: None,
        }
    }

    /// Binds and starts listening. Does nothing when already open.
    ///
    /// A failing bind is retried every 100 ms until `settings.timeout`
    /// elapses, which covers ports still held by a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Listener`] when the address cannot be
    /// resolved or the bind keeps failing past the timeout.
    pub fn open(&mut self, settings: &ListenerSettings) -> Result<(), SentinelError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let address = resolve(&settings.host, self.port).map_err(|source| self.error(source))?;
        let deadline = Instant::now() + settings.timeout;
        loop {
            match bind(address, settings) {
                Ok(socket) => {
                    info!(
                        target: LISTENER_TARGET,
                        group = %self.group,
                        port = self.port,
                        fd = socket.as_raw_fd(),
                        "managed listener opened"
                    );
                    self.socket = Some(socket);
                    return Ok(());
                }
                Err(source) if Instant::now() >= deadline => return Err(self.error(source)),
                Err(error) => {
                    debug!(
                        target: LISTENER_TARGET,
                        group = %self.group,
                        port = self.port,
                        %error,
                        "bind failed; retrying"
                    );
                    thread::sleep(BIND_RETRY);
                }
            }
        }
    }

    /// `true` while the socket is bound.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Raw descriptor of the bound socket.
    #[must_use]
    pub fn descriptor(&self) -> Option<RawFd> {
        self.socket.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Configured port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Address actually bound, if open.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    /// Releases the socket. Safe to call when already closed.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!(
                target: LISTENER_TARGET,
                group = %self.group,
                port = self.port,
                "managed listener closed"
            );
        }
    }

    fn error(&self, source: io::Error) -> SentinelError {
        SentinelError::Listener {
            group: self.group.clone(),
            port: self.port,
            source: Arc::new(source),
        }
    }
}

/// Value of the `--port` argument for a managed listener.
///
/// `<port>:<fd>` tells the child which inherited descriptor to accept on;
/// `<port>:managed` tells it the port is managed but no descriptor is shared.
#[must_use]
pub fn managed_port_value(port: u16, descriptor: Option<RawFd>) -> String {
    descriptor.map_or_else(|| format!("{port}:managed"), |fd| format!("{port}:{fd}"))
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

fn bind(address: SocketAddr, settings: &ListenerSettings) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, None)?;
    if settings.reuse_address {
        socket.set_reuse_address(true)?;
    }
    socket.bind(&address.into())?;
    socket.listen(settings.backlog)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn settings() -> ListenerSettings {
        ListenerSettings {
            host: String::from("127.0.0.1"),
            backlog: 16,
            reuse_address: true,
            timeout: Duration::from_millis(300),
        }
    }

    #[rstest]
    fn open_binds_and_accepts_connections(settings: ListenerSettings) {
        let mut listener = ManagedListener::new("b", 0);
        assert!(!listener.is_open());
        assert_eq!(listener.descriptor(), None);

        listener.open(&settings).expect("open");
        assert!(listener.is_open());
        let fd = listener.descriptor().expect("descriptor");
        assert!(fd > 2, "unexpected descriptor {fd}");

        let address = listener.local_addr().expect("local addr");
        TcpStream::connect(address).expect("connect");
    }

    #[rstest]
    fn open_is_idempotent(settings: ListenerSettings) {
        let mut listener = ManagedListener::new("b", 0);
        listener.open(&settings).expect("open");
        let first = listener.descriptor();
        listener.open(&settings).expect("reopen");
        assert_eq!(listener.descriptor(), first);
    }

    #[rstest]
    fn close_releases_the_port(settings: ListenerSettings) {
        let mut listener = ManagedListener::new("b", 0);
        listener.open(&settings).expect("open");
        let port = listener.local_addr().expect("local addr").port();
        listener.close();
        assert!(!listener.is_open());
        listener.close();

        let mut again = ManagedListener::new("b", port);
        again.open(&settings).expect("rebind released port");
        assert_eq!(again.local_addr().map(|addr| addr.port()), Some(port));
    }

    #[rstest]
    fn busy_port_fails_after_timeout(settings: ListenerSettings) {
        let holder = TcpListener::bind(("127.0.0.1", 0)).expect("bind holder");
        let port = holder.local_addr().expect("holder addr").port();
        let mut listener = ManagedListener::new("b", port);

        let started = Instant::now();
        let error = listener.open(&settings).expect_err("port is busy");
        let elapsed = started.elapsed();

        assert!(
            matches!(error, SentinelError::Listener { port: p, .. } if p == port),
            "unexpected error: {error}"
        );
        assert!(elapsed >= settings.timeout);
        assert!(elapsed < settings.timeout + Duration::from_secs(1));
        assert!(!listener.is_open());
    }

    #[rstest]
    #[case(5001, Some(7), "5001:7")]
    #[case(5002, None, "5002:managed")]
    fn port_value_encodes_descriptor(
        #[case] port: u16,
        #[case] descriptor: Option<RawFd>,
        #[case] expected: &str,
    ) {
        assert_eq!(managed_port_value(port, descriptor), expected);
    }
}
