//! The duplex byte channel between the client and a server process.

use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{ChildStdin, ChildStdout};

/// Read half of a channel.
pub type ChannelReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
/// Write half of a channel.
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Where a channel is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// The child's standard streams.
    Stdio,
    /// A socket the child dialed back on.
    Tcp { peer: SocketAddr },
}

/// Bidirectional byte stream to a server process.
///
/// The protocol spoken over it is up to the caller.
pub struct DuplexChannel {
    reader: ChannelReader,
    writer: ChannelWriter,
    kind: ChannelKind,
}

impl DuplexChannel {
    pub fn new(reader: ChannelReader, writer: ChannelWriter, kind: ChannelKind) -> Self {
        Self {
            reader,
            writer,
            kind,
        }
    }

    /// Channel over the child's stdout (read) and stdin (write).
    pub fn from_stdio(stdout: ChildStdout, stdin: ChildStdin) -> Self {
        Self::new(Box::new(stdout), Box::new(stdin), ChannelKind::Stdio)
    }

    /// Channel over an accepted socket.
    pub fn from_tcp(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(Box::new(reader), Box::new(writer), ChannelKind::Tcp { peer })
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Split into the read and write halves.
    pub fn into_parts(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexChannel")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
