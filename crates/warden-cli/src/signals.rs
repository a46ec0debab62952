//! Restart requests from the terminal.

/// Stream of SIGHUP deliveries; never fires off Unix.
pub struct Hangups {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Hangups {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            signal: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next SIGHUP.
    pub async fn recv(&mut self) {
        if self.signal.recv().await.is_none() {
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
impl Hangups {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }

    pub async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}
