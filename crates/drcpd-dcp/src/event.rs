use drcpd_ids::StreamId;
use drcpd_player::SeekUnit;
use tokio::sync::mpsc;

const EVENT_QUEUE_CAPACITY: usize = 32;

/// Inbound commands from the UI bus (spec §6 "Playback" signals, selected).
/// Opaque to the crate that dispatches them — each variant just carries the
/// typed payload the bus advertises.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Start,
    Stop,
    Pause,
    Resume,
    Next,
    Previous,
    SetSpeed(f64),
    Seek(u64, SeekUnit),
    RepeatModeToggle,
    ShuffleModeToggle,
    StreamInfo {
        stream_id: StreamId,
        artist: Option<String>,
        album: Option<String>,
        title: Option<String>,
        alttrack: Option<String>,
        url: Option<String>,
    },
}

/// Single-producer-multi-consumer mailbox of inbound UI events (spec §4.8).
/// `post` is the producer side the bus adapter calls; the receiver half is
/// handed to whatever dispatch loop the binary wires up.
pub struct EventQueue {
    sender: mpsc::Sender<UiEvent>,
}

impl EventQueue {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (std::sync::Arc::new(EventQueue { sender: tx }), rx)
    }

    pub async fn post(&self, event: UiEvent) -> Result<(), mpsc::error::SendError<UiEvent>> {
        self.sender.send(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posted_events_are_received_in_order() {
        let (queue, mut rx) = EventQueue::new();
        queue.post(UiEvent::Start).await.unwrap();
        queue.post(UiEvent::Next).await.unwrap();

        assert!(matches!(rx.recv().await, Some(UiEvent::Start)));
        assert!(matches!(rx.recv().await, Some(UiEvent::Next)));
    }
}
