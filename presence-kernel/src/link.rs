//! The physical byte channel to the sensor.
//!
//! Anything that reads and writes bytes asynchronously can serve as a link:
//! a serial device node, a TCP serial bridge, or an in-memory duplex in tests.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::LinkConfig;

pub trait SensorLink: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SensorLink for T {}

/// Link shared between the ingestion loop and the command channel.
pub type SharedLink = Arc<tokio::sync::Mutex<Box<dyn SensorLink>>>;

pub fn shared<L: SensorLink + 'static>(link: L) -> SharedLink {
    Arc::new(tokio::sync::Mutex::new(Box::new(link)))
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no sensor link configured (set link.device or link.tcp)")]
    NotConfigured,
    #[error("failed to open {path}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    Tcp {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Opens the link described by the configuration. A TCP bridge wins over a
/// device path when both are set.
///
/// Device nodes are opened as plain files; line settings (baud rate) are
/// expected to be applied by the system, e.g. with `stty`.
pub async fn open(cfg: &LinkConfig) -> Result<SharedLink, LinkError> {
    if let Some(addr) = &cfg.tcp {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(|source| LinkError::Tcp { addr: addr.clone(), source })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "could not disable nagle on sensor link");
        }
        tracing::info!(%addr, "sensor link connected over tcp");
        return Ok(shared(stream));
    }

    if let Some(path) = &cfg.device {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|source| LinkError::Device { path: path.clone(), source })?;
        tracing::info!(path = %path.display(), "sensor link opened");
        return Ok(shared(file));
    }

    Err(LinkError::NotConfigured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_requires_a_target() {
        let err = open(&LinkConfig::default()).await.err().unwrap();
        assert!(matches!(err, LinkError::NotConfigured));
    }

    #[tokio::test]
    async fn open_reports_missing_device() {
        let cfg = LinkConfig {
            device: Some(PathBuf::from("/nonexistent/ttyPRESENCE0")),
            tcp: None,
        };
        let err = open(&cfg).await.err().unwrap();
        assert!(matches!(err, LinkError::Device { .. }));
    }

    #[tokio::test]
    async fn open_connects_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let cfg = LinkConfig { device: None, tcp: Some(addr) };
        assert!(open(&cfg).await.is_ok());
        accept.await.unwrap().unwrap();
    }
}
