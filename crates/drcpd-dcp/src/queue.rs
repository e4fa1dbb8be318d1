use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::transport::{Ack, DcpTransport};

const DCP_QUEUE_CAPACITY: usize = 16;
const ACK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Done,
    Failed,
    Timeout,
}

struct QueuedFrame {
    xml: String,
    reply: oneshot::Sender<TransactionOutcome>,
}

/// Outbound display-frame queue (spec §4.8): only one transaction is ever
/// in progress, later frames wait their turn in the mailbox.
pub struct DcpQueue {
    sender: mpsc::Sender<QueuedFrame>,
}

impl DcpQueue {
    pub fn new<T: DcpTransport + 'static>(transport: Arc<T>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(DCP_QUEUE_CAPACITY);
        tokio::spawn(run(rx, transport));
        Arc::new(DcpQueue { sender: tx })
    }

    /// Enqueue a frame and await its transaction outcome. Frames ahead of
    /// this one in the mailbox are transmitted (and timed out, if the
    /// peer never acks) before this one begins.
    pub async fn enqueue(&self, xml: impl Into<String>) -> TransactionOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.sender.send(QueuedFrame { xml: xml.into(), reply: reply_tx }).await.is_err() {
            return TransactionOutcome::Failed;
        }
        reply_rx.await.unwrap_or(TransactionOutcome::Failed)
    }
}

async fn run<T: DcpTransport>(mut frames: mpsc::Receiver<QueuedFrame>, transport: Arc<T>) {
    while let Some(frame) = frames.recv().await {
        let outcome = transmit(&transport, &frame.xml).await;
        let _ = frame.reply.send(outcome);
    }
}

async fn transmit<T: DcpTransport>(transport: &Arc<T>, xml: &str) -> TransactionOutcome {
    if let Err(e) = transport.write_frame(xml).await {
        tracing::warn!(error = %e, "DCP frame write failed");
        return TransactionOutcome::Failed;
    }

    match tokio::time::timeout(ACK_TIMEOUT, transport.read_ack()).await {
        Ok(Ok(Ack::Ok)) => TransactionOutcome::Done,
        Ok(Ok(Ack::Failed)) => TransactionOutcome::Failed,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "DCP ack read failed");
            TransactionOutcome::Failed
        }
        Err(_) => {
            tracing::warn!("DCP transaction timed out waiting for ack");
            TransactionOutcome::Timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DcpError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedTransport {
        acks: AsyncMutex<Vec<Result<Ack, DelayedError>>>,
        written: AsyncMutex<Vec<String>>,
        calls: AtomicUsize,
    }

    enum DelayedError {
        NeverAcks,
    }

    #[async_trait]
    impl DcpTransport for ScriptedTransport {
        async fn write_frame(&self, xml: &str) -> Result<(), DcpError> {
            self.written.lock().await.push(xml.to_string());
            Ok(())
        }

        async fn read_ack(&self) -> Result<Ack, DcpError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut acks = self.acks.lock().await;
            match acks.get_mut(idx) {
                Some(Ok(ack)) => Ok(*ack),
                Some(Err(DelayedError::NeverAcks)) => {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                    unreachable!("timeout should fire first")
                }
                None => Ok(Ack::Ok),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ack_timeout_promotes_to_timeout_and_next_frame_proceeds() {
        let transport = Arc::new(ScriptedTransport {
            acks: AsyncMutex::new(vec![Err(DelayedError::NeverAcks), Ok(Ack::Ok)]),
            written: AsyncMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let queue = DcpQueue::new(transport.clone());

        let first = queue.enqueue("<frame id=\"1\"/>").await;
        assert_eq!(first, TransactionOutcome::Timeout);

        let second = queue.enqueue("<frame id=\"2\"/>").await;
        assert_eq!(second, TransactionOutcome::Done);

        assert_eq!(transport.written.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_ack_reports_failed_outcome() {
        let transport = Arc::new(ScriptedTransport {
            acks: AsyncMutex::new(vec![Ok(Ack::Failed)]),
            written: AsyncMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let queue = DcpQueue::new(transport);
        assert_eq!(queue.enqueue("<frame/>").await, TransactionOutcome::Failed);
    }
}
