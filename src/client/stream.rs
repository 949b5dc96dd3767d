//! Transport to the server.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::{Error, Result};
use crate::opts::Opts;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

impl Endpoint {
    /// Resolve the endpoint described by `opts`.
    ///
    /// A socket path naming a directory gets the conventional
    /// `.s.PGSQL.<port>` file name appended.
    pub fn from_opts(opts: &Opts) -> Result<Self> {
        if let Some(socket) = &opts.socket {
            #[cfg(unix)]
            {
                let mut path = std::path::PathBuf::from(socket);
                if path.is_dir() {
                    path.push(format!(".s.PGSQL.{}", opts.port));
                }
                return Ok(Endpoint::Unix(path));
            }
            #[cfg(not(unix))]
            {
                return Err(Error::Unsupported(format!(
                    "Unix socket {} requested on a non-Unix platform",
                    socket
                )));
            }
        }

        if opts.host.is_empty() {
            return Err(Error::InvalidUsage("host is empty".into()));
        }
        Ok(Endpoint::Tcp {
            host: opts.host.clone(),
            port: opts.port,
        })
    }

    /// Open a new connection to the endpoint.
    pub async fn connect(&self) -> Result<Stream> {
        match self {
            Endpoint::Tcp { host, port } => {
                let tcp = TcpStream::connect((host.as_str(), *port)).await?;
                tcp.set_nodelay(true)?;
                Ok(Stream::Tcp(tcp))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Stream::Unix(UnixStream::connect(path).await?)),
        }
    }
}

/// A connected socket.
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_endpoint_from_opts() {
        let opts = Opts {
            host: "db".into(),
            port: 5433,
            ..Opts::default()
        };
        assert_eq!(
            Endpoint::from_opts(&opts).unwrap(),
            Endpoint::Tcp {
                host: "db".into(),
                port: 5433
            }
        );
    }

    #[test]
    fn empty_host_is_invalid() {
        let opts = Opts {
            host: String::new(),
            ..Opts::default()
        };
        assert!(matches!(
            Endpoint::from_opts(&opts),
            Err(Error::InvalidUsage(_))
        ));
    }
}
