use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum DcpError {
    #[error("i/o error on DCP pipe: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer sent a malformed acknowledgement: {0:?}")]
    ProtocolViolation(Vec<u8>),
    #[error("reverse pipe closed (EOF)")]
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Failed,
}

/// One in-progress transport side. Mirrors the original `named_pipe.c`
/// discipline: writes block until a reader is attached, reads see EOF
/// whenever the peer closes its end and must reopen before trying again.
#[async_trait]
pub trait DcpTransport: Send + Sync {
    async fn write_frame(&self, xml: &str) -> Result<(), DcpError>;
    async fn read_ack(&self) -> Result<Ack, DcpError>;
}

/// Named-pipe backed transport: `odcp` is the outbound (write) pipe,
/// `idcp` is the inbound (read) pipe carrying 3-byte acks.
pub struct PipeTransport {
    out_path: PathBuf,
    in_path: PathBuf,
    out_file: Mutex<Option<File>>,
    in_file: Mutex<Option<File>>,
}

impl PipeTransport {
    pub fn new(out_path: impl AsRef<Path>, in_path: impl AsRef<Path>) -> Self {
        PipeTransport {
            out_path: out_path.as_ref().to_path_buf(),
            in_path: in_path.as_ref().to_path_buf(),
            out_file: Mutex::new(None),
            in_file: Mutex::new(None),
        }
    }

    async fn open_out(&self) -> Result<(), DcpError> {
        let mut guard = self.out_file.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new().write(true).open(&self.out_path).await?;
            *guard = Some(file);
        }
        Ok(())
    }

    async fn open_in(&self) -> Result<(), DcpError> {
        let mut guard = self.in_file.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new().read(true).open(&self.in_path).await?;
            *guard = Some(file);
        }
        Ok(())
    }
}

#[async_trait]
impl DcpTransport for PipeTransport {
    async fn write_frame(&self, xml: &str) -> Result<(), DcpError> {
        self.open_out().await?;
        let mut guard = self.out_file.lock().await;
        let file = guard.as_mut().expect("just opened");
        if let Err(e) = file.write_all(xml.as_bytes()).await {
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads exactly 3 bytes (`"OK\n"`/`"FF\n"`). On EOF the pipe is
    /// closed and reopened so the next call attaches a fresh reader,
    /// matching `fifo_reopen()` in the original implementation.
    async fn read_ack(&self) -> Result<Ack, DcpError> {
        self.open_in().await?;
        let mut buf = [0u8; 3];
        let mut filled = 0;
        loop {
            let mut guard = self.in_file.lock().await;
            let file = guard.as_mut().expect("just opened");
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                *guard = None;
                drop(guard);
                tracing::debug!("DCP reverse pipe hit EOF, reopening");
                self.open_in().await?;
                continue;
            }
            filled += n;
            if filled == buf.len() {
                break;
            }
        }
        match &buf {
            b"OK\n" => Ok(Ack::Ok),
            b"FF\n" => Ok(Ack::Failed),
            _ => Err(DcpError::ProtocolViolation(buf.to_vec())),
        }
    }
}
