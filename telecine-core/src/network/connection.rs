use std::fmt;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::receiver::ProtocolReceiver;

/// Address of the scanner's frame stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerAddress {
    host: String,
    port: u16,
}

impl ScannerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ScannerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Open the frame stream, giving up after `timeout`.
pub async fn connect(addr: &ScannerAddress, timeout: Duration) -> Result<TcpStream, CaptureError> {
    let target = addr.to_string();
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&target))
        .await
        .map_err(|_| {
            CaptureError::Connection(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connecting to {target} timed out"),
            ))
        })??;
    stream.set_nodelay(true)?;
    info!("connected to scanner at {target}");
    Ok(stream)
}

/// Run `receiver` on `stream` until it ends, then shut the socket down
/// whatever the outcome.
pub async fn receive(
    mut stream: TcpStream,
    receiver: &mut ProtocolReceiver,
) -> Result<(), CaptureError> {
    let result = receiver.run(&mut stream).await;
    if let Err(e) = stream.shutdown().await {
        debug!("socket shutdown: {e}");
    }
    result
}
