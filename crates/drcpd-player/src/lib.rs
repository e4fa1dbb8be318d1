//! Player coordinator (C8): sits between the crawler (C6) and the stream
//! player's bounded URL queue. Owns an enqueue worker task that pushes at
//! most one URL at a time, reconciles locally-assigned stream ids (C7)
//! against player notifications, and preserves preloaded metadata across
//! reorderings and skips.

mod worker;

pub use worker::{ClearedQueue, PushOutcome, SeekUnit, StreamPlayer};

use std::sync::Arc;

use drcpd_crawler::{Direction, FindNextOp, RecursiveMode};
use drcpd_ids::{ListId, PlayerPushError, StreamId};
use drcpd_list::{ListBroker, PreloadedMetaData};
use drcpd_streaminfo::StreamInfoRegistry;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use worker::Command;

/// Per-stream assumed state, optimistically advanced on outbound commands
/// and reconciled on inbound player notifications (spec's simplified
/// four-state model; see SPEC_FULL.md for why the richer original state
/// machine was not carried over).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Buffering,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub struct CurrentTrack {
    pub stream_id: StreamId,
    pub list_id: ListId,
    pub line: usize,
    pub meta: Option<PreloadedMetaData>,
    /// Alternate track name and source URL, set only by external stream
    /// notifications (spec §4.6) — preloaded metadata never carries these.
    pub alttrack: Option<String>,
    pub url: Option<String>,
}

const ENQUEUE_MAILBOX_CAPACITY: usize = 8;

/// Owns the enqueue worker task and the coordinator-visible state it keeps
/// up to date: the current track, the assumed per-stream playback state,
/// and the traversal direction used for the next `take()`/reversal.
pub struct PlayerCoordinator<B: ListBroker + 'static, P: StreamPlayer + 'static> {
    cache: Arc<drcpd_list::ListCache<B>>,
    broker: Arc<B>,
    player: Arc<P>,
    streaminfo: Arc<Mutex<StreamInfoRegistry>>,
    direction: Mutex<Direction>,
    mode: RecursiveMode,
    active: Mutex<bool>,
    current: Arc<Mutex<Option<CurrentTrack>>>,
    stream_state: Arc<Mutex<StreamState>>,
    skip_next_pending: Mutex<bool>,
    commands: mpsc::Sender<Command<B>>,
}

impl<B: ListBroker + 'static, P: StreamPlayer + 'static> PlayerCoordinator<B, P> {
    pub fn new(cache: Arc<drcpd_list::ListCache<B>>, broker: Arc<B>, player: Arc<P>, mode: RecursiveMode) -> Arc<Self> {
        let streaminfo = Arc::new(Mutex::new(StreamInfoRegistry::new()));
        let current = Arc::new(Mutex::new(None));
        let stream_state = Arc::new(Mutex::new(StreamState::Stopped));
        let (tx, rx) = mpsc::channel(ENQUEUE_MAILBOX_CAPACITY);

        tokio::spawn(worker::run(
            rx,
            broker.clone(),
            player.clone(),
            streaminfo.clone(),
            current.clone(),
            stream_state.clone(),
        ));

        Arc::new(PlayerCoordinator {
            cache,
            broker,
            player,
            streaminfo,
            direction: Mutex::new(Direction::Forward),
            mode,
            active: Mutex::new(false),
            current,
            stream_state,
            skip_next_pending: Mutex::new(false),
            commands: tx,
        })
    }

    pub fn stream_state(&self) -> StreamState {
        *self.stream_state.lock()
    }

    pub fn current_track(&self) -> Option<CurrentTrack> {
        self.current.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    /// Switch to active mode and start traversing `list` from `line`,
    /// enqueuing as the worker has room.
    pub async fn take(&self, list: ListId, line: usize) {
        *self.active.lock() = true;
        *self.stream_state.lock() = StreamState::Buffering;
        let direction = *self.direction.lock();
        let op = Arc::new(FindNextOp::new(self.cache.clone(), self.broker.clone(), direction, self.mode));
        let _ = self.commands.send(Command::Enqueue { op, root: list, start_line: line, ack: None }).await;
    }

    /// Drain the mailbox, leave active mode, and optionally stop the
    /// player.
    pub async fn release(&self, send_stop: bool, stop_if_active: bool) {
        let was_active = { let mut active = self.active.lock(); let was = *active; *active = false; was };
        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = self.commands.send(Command::Drain(ack_tx)).await;
        let _ = ack_rx.await;

        if send_stop && (!stop_if_active || was_active) {
            self.player.stop().await;
            *self.stream_state.lock() = StreamState::Stopped;
        }
    }

    /// The player announced that `stream_id` started. `try_enqueue` asks
    /// the worker to top up the queue once reconciliation is done.
    pub async fn start_notification(&self, stream_id: StreamId, try_enqueue: bool) {
        if stream_id.is_ours() {
            let known = self.streaminfo.lock().lookup(stream_id).cloned();
            match known {
                Some(item) => {
                    let mut current = self.current.lock();
                    *current = Some(CurrentTrack {
                        stream_id,
                        list_id: item.list_id,
                        line: item.line,
                        meta: Some(item.meta),
                        alttrack: None,
                        url: None,
                    });
                }
                None => {
                    tracing::debug!(%stream_id, "our stream id unknown, dropped by player queue overflow");
                    *self.current.lock() = None;
                }
            }
        } else {
            tracing::debug!(%stream_id, "externally-initiated stream started");
        }
        *self.stream_state.lock() = StreamState::Playing;

        if try_enqueue {
            let _ = self.commands.send(Command::Resume).await;
        }
    }

    pub fn stop_notification(&self) {
        *self.stream_state.lock() = StreamState::Stopped;
    }

    pub fn pause_notification(&self) {
        let mut state = self.stream_state.lock();
        *state = match *state {
            StreamState::Playing => StreamState::Paused,
            StreamState::Paused => StreamState::Playing,
            other => other,
        };
    }

    /// Recorded for completeness; the coordinator does not derive any
    /// state transitions from playback position on its own.
    pub fn track_times_notification(&self, _position_ms: u64, _duration_ms: u64) {}

    pub async fn set_external_stream_meta_data(
        &self,
        stream_id: StreamId,
        artist: Option<String>,
        album: Option<String>,
        title: Option<String>,
        alttrack: Option<String>,
        url: Option<String>,
    ) {
        let mut current = self.current.lock();
        if current.as_ref().map(|t| t.stream_id) == Some(stream_id) {
            if let Some(track) = current.as_mut() {
                track.meta = Some(PreloadedMetaData { artist, album, title });
                track.alttrack = alttrack;
                track.url = url;
            }
        }
    }

    /// Fast path: already buffering the next item, request absorbed. If
    /// the player reports a queued item of our own, skip straight to it;
    /// otherwise mark the pending flag so the worker fulfils it once the
    /// traversal catches up.
    pub async fn skip_to_next(&self) -> Result<(), PlayerPushError> {
        if *self.stream_state.lock() == StreamState::Buffering {
            return Ok(());
        }
        match self.player.next().await {
            Ok((next_id, _is_playing)) if next_id.is_ours() => Ok(()),
            _ => {
                *self.skip_next_pending.lock() = true;
                let _ = self.commands.send(Command::Resume).await;
                Ok(())
            }
        }
    }

    /// `rewind_threshold_ms == 0` disables restart-in-place: any call
    /// always reverses direction and re-enqueues from the previous item.
    pub async fn skip_to_previous(&self, position_ms: u64, rewind_threshold_ms: u64) {
        if rewind_threshold_ms > 0 && position_ms >= rewind_threshold_ms {
            self.player.seek(0, SeekUnit::Milliseconds).await;
            return;
        }

        let Some(current) = self.current.lock().clone() else { return };
        let reversed = { let d = *self.direction.lock(); d.reversed() };
        *self.direction.lock() = reversed;

        let Some(target_line) = (match reversed {
            Direction::Backward => current.line.checked_sub(1),
            _ => current.line.checked_add(1),
        }) else {
            tracing::debug!(line = current.line, "no previous item to skip back to");
            return;
        };

        let cleared = self.player.clear(Some(current.stream_id)).await;
        {
            let mut reg = self.streaminfo.lock();
            for id in cleared.removed {
                reg.forget(id);
            }
        }

        let op = Arc::new(FindNextOp::new(self.cache.clone(), self.broker.clone(), reversed, self.mode));
        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = self
            .commands
            .send(Command::Enqueue { op, root: current.list_id, start_line: target_line, ack: Some(ack_tx) })
            .await;
        let _ = ack_rx.await;

        let _ = self.player.next().await;
    }

    /// Reverse the traversal direction used by future `take()`/skip calls
    /// without touching anything currently enqueued.
    pub fn set_direction(&self, direction: Direction) {
        *self.direction.lock() = direction;
    }

    pub fn direction(&self) -> Direction {
        *self.direction.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drcpd_ids::{ListError, ListId};
    use drcpd_list::{ItemKind, ListBroker, ListCache, ListItem};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct FlatBroker {
        items: Vec<ListItem>,
    }

    #[async_trait::async_trait]
    impl ListBroker for FlatBroker {
        async fn get_list_id(&self, _: ListId, _: usize) -> Result<(ListId, String, bool), ListError> {
            Ok((ListId::INVALID, String::new(), false))
        }

        async fn check_range(&self, _: ListId, _: usize, _: usize) -> Result<(usize, usize), ListError> {
            Ok((0, self.items.len()))
        }

        async fn get_range(&self, _: ListId, first: usize, count: usize) -> Result<(usize, Vec<ListItem>), ListError> {
            let end = (first + count).min(self.items.len());
            Ok((first, self.items[first.min(self.items.len())..end].to_vec()))
        }

        async fn get_uris(&self, _: ListId, item: usize) -> Result<Vec<String>, ListError> {
            Ok(vec![format!("http://example/track{item}")])
        }

        async fn get_parent_link(&self, _: ListId) -> Result<(ListId, usize, String, bool), ListError> {
            Ok((ListId::new(1), 0, "root".into(), false))
        }
    }

    struct RecordingPlayer {
        pushed: AsyncMutex<Vec<StreamId>>,
        overflow_after: usize,
        calls: AtomicUsize,
        next_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StreamPlayer for RecordingPlayer {
        async fn push(&self, stream_id: StreamId, _url: &str, _play_immediate: bool) -> Result<PushOutcome, PlayerPushError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.pushed.lock().await.push(stream_id);
            Ok(PushOutcome { overflow: n + 1 >= self.overflow_after, is_playing: n == 0 })
        }

        async fn next(&self) -> Result<(StreamId, bool), PlayerPushError> {
            self.next_calls.fetch_add(1, Ordering::SeqCst);
            Ok((StreamId::INVALID, false))
        }

        async fn clear(&self, keep: Option<StreamId>) -> ClearedQueue {
            ClearedQueue { current: keep, queued: vec![], removed: vec![] }
        }

        async fn start(&self) {}
        async fn stop(&self) {}
        async fn pause(&self) {}
        async fn seek(&self, _pos: u64, _unit: SeekUnit) {}
    }

    fn flat_items(n: usize) -> Vec<ListItem> {
        (0..n).map(|i| ListItem::new(ItemKind::RegularFile, format!("track{i}"))).collect()
    }

    #[tokio::test]
    async fn take_enqueues_until_overflow() {
        let broker = Arc::new(FlatBroker { items: flat_items(10) });
        let cache = Arc::new(ListCache::new(broker.clone(), 5));
        let player = Arc::new(RecordingPlayer {
            pushed: AsyncMutex::new(Vec::new()),
            overflow_after: 3,
            calls: AtomicUsize::new(0),
            next_calls: AtomicUsize::new(0),
        });
        let coordinator = PlayerCoordinator::new(cache, broker, player.clone(), RecursiveMode::Flat);

        coordinator.take(ListId::new(1), 0).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let pushed = player.pushed.lock().await;
        assert_eq!(pushed.len(), 3);
        assert!(coordinator.current_track().is_some());
    }

    /// Spec §4.6 / scenario 4: skipping back from the middle of a forward
    /// traversal clears the queue, reverses direction, and re-enqueues
    /// starting at the *previous* item — not the one currently playing —
    /// before asking the player to advance to it.
    #[tokio::test]
    async fn skip_to_previous_reenqueues_the_previous_item_and_advances() {
        let broker = Arc::new(FlatBroker { items: flat_items(10) });
        let cache = Arc::new(ListCache::new(broker.clone(), 5));
        let player = Arc::new(RecordingPlayer {
            pushed: AsyncMutex::new(Vec::new()),
            overflow_after: 100,
            calls: AtomicUsize::new(0),
            next_calls: AtomicUsize::new(0),
        });
        let coordinator = PlayerCoordinator::new(cache, broker, player.clone(), RecursiveMode::Flat);

        coordinator.take(ListId::new(1), 0).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let current_stream_id = {
            let pushed = player.pushed.lock().await;
            assert_eq!(pushed.len(), 10, "flat forward traversal should enqueue every item");
            pushed[2]
        };
        coordinator.start_notification(current_stream_id, false).await;
        assert_eq!(coordinator.current_track().unwrap().line, 2);

        coordinator.skip_to_previous(0, 1000).await;

        let pushed_after = player.pushed.lock().await.len();
        assert_eq!(pushed_after, 12, "backward traversal should enqueue line 1 then line 0, not re-enqueue line 2");

        let current = coordinator.current_track().unwrap();
        assert_eq!(current.line, 0, "traversal should have run to the start of the list");
        assert_eq!(player.next_calls.load(Ordering::SeqCst), 1, "previous track must be pushed before URLFIFO.Next() is called");
        assert_eq!(coordinator.direction(), Direction::Backward);
    }
}
