//! Protocol client that splices the server channel onto our own stdio.
//!
//! Standard input is read by one long-lived pump so a restart does not lose
//! the reader; each attach forwards the pump's chunks to the new server.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use warden_launcher::{DuplexChannel, ProtocolClient};

const READ_BUFFER_SIZE: usize = 8192;

pub struct StdioBridge {
    input: Arc<tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>>,
    input_closed: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioBridge {
    /// Start reading standard input.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(64);
        let input_closed = Arc::new(Notify::new());

        let closed = input_closed.clone();
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read standard input: {}", e);
                        break;
                    }
                }
            }
            debug!("Standard input closed");
            closed.notify_one();
        });

        Self {
            input: Arc::new(tokio::sync::Mutex::new(rx)),
            input_closed,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Resolves once standard input reached end of file.
    pub async fn input_closed(&self) {
        self.input_closed.notified().await
    }

    fn abort_tasks(&self) {
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl ProtocolClient for StdioBridge {
    async fn attach(&self, channel: DuplexChannel) -> warden_core::Result<()> {
        debug!("Bridging {:?} channel to stdio", channel.kind());
        let (mut reader, mut writer) = channel.into_parts();

        let input = self.input.clone();
        let to_server = tokio::spawn(async move {
            let mut input = input.lock().await;
            while let Some(chunk) = input.recv().await {
                let written = async {
                    writer.write_all(&chunk).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    debug!("Server channel closed for writing: {}", e);
                    break;
                }
            }
        });

        let to_client = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            match tokio::io::copy(&mut reader, &mut stdout).await {
                Ok(bytes) => debug!("Server channel closed after {} bytes", bytes),
                Err(e) => debug!("Server channel closed for reading: {}", e),
            }
            let _ = stdout.flush().await;
        });

        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| warden_core::WardenError::Other("bridge task list poisoned".into()))?;
        tasks.push(to_server);
        tasks.push(to_client);
        Ok(())
    }

    async fn detach(&self) {
        self.abort_tasks();
    }
}

impl Drop for StdioBridge {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
