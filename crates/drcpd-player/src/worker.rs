use std::sync::Arc;

use async_trait::async_trait;
use drcpd_crawler::{FindNextOp, FindNextResult};
use drcpd_ids::{ListId, PlayerPushError, StreamId};
use drcpd_list::ListBroker;
use drcpd_streaminfo::StreamInfoRegistry;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{CurrentTrack, StreamState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekUnit {
    Milliseconds,
    Samples,
}

#[derive(Debug, Clone, Copy)]
pub struct PushOutcome {
    pub overflow: bool,
    pub is_playing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClearedQueue {
    pub current: Option<StreamId>,
    pub queued: Vec<StreamId>,
    pub removed: Vec<StreamId>,
}

/// The stream player bus (spec §6): a bounded URL FIFO plus transport
/// verbs. An external collaborator — the coordinator pushes URLs and
/// reconciles its own state against the player's notifications, it never
/// decodes or renders anything itself.
#[async_trait]
pub trait StreamPlayer: Send + Sync {
    async fn push(&self, stream_id: StreamId, url: &str, play_immediate: bool) -> Result<PushOutcome, PlayerPushError>;
    async fn next(&self) -> Result<(StreamId, bool), PlayerPushError>;
    async fn clear(&self, keep: Option<StreamId>) -> ClearedQueue;
    async fn start(&self);
    async fn stop(&self);
    async fn pause(&self);
    async fn seek(&self, pos: u64, unit: SeekUnit);
}

pub(crate) enum Command<B: ListBroker> {
    Enqueue { op: Arc<FindNextOp<B>>, root: ListId, start_line: usize, ack: Option<oneshot::Sender<()>> },
    Resume,
    Drain(oneshot::Sender<()>),
}

/// The enqueue worker: a single task processing one command at a time, so
/// at most one traversal is ever in flight (spec's "keep at most one
/// traversal operation in flight" rule falls directly out of this loop
/// never running two enqueue passes concurrently).
pub(crate) async fn run<B, P>(
    mut commands: mpsc::Receiver<Command<B>>,
    broker: Arc<B>,
    player: Arc<P>,
    streaminfo: Arc<Mutex<StreamInfoRegistry>>,
    current: Arc<Mutex<Option<CurrentTrack>>>,
    stream_state: Arc<Mutex<StreamState>>,
) where
    B: ListBroker + 'static,
    P: StreamPlayer + 'static,
{
    let mut active_op: Option<Arc<FindNextOp<B>>> = None;

    while let Some(cmd) = commands.recv().await {
        match cmd {
            Command::Enqueue { op, root, start_line, ack } => {
                let first = op.start(root, start_line).await;
                active_op = Some(op.clone());
                enqueue_while_room(&op, first, &broker, &player, &streaminfo, &current, &stream_state).await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Command::Resume => {
                if let Some(op) = active_op.clone() {
                    let next = op.find_next().await;
                    enqueue_while_room(&op, next, &broker, &player, &streaminfo, &current, &stream_state).await;
                }
            }
            Command::Drain(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Push items one at a time, re-evaluating after each push whether the
/// queue accepted it, overflowed, or the traversal ran out of items. Stops
/// the moment the player reports `overflow`, leaving `op` parked for the
/// next `Command::Resume`.
async fn enqueue_while_room<B, P>(
    op: &Arc<FindNextOp<B>>,
    mut result: FindNextResult,
    broker: &Arc<B>,
    player: &Arc<P>,
    streaminfo: &Arc<Mutex<StreamInfoRegistry>>,
    current: &Arc<Mutex<Option<CurrentTrack>>>,
    stream_state: &Arc<Mutex<StreamState>>,
) where
    B: ListBroker,
    P: StreamPlayer,
{
    loop {
        let Some(found) = result.found else {
            tracing::debug!(positional_state = ?result.positional_state, "traversal produced no further items");
            return;
        };

        let uris = match broker.get_uris(found.list_id, found.line).await {
            Ok(uris) if !uris.is_empty() => uris,
            Ok(_) => {
                tracing::debug!(list_id = %found.list_id, line = found.line, "item has no URI, skipping");
                result = op.find_next().await;
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "get_uris failed, skipping item");
                result = op.find_next().await;
                continue;
            }
        };

        let meta = found.item.meta.clone().unwrap_or_default();
        let stream_id = {
            let mut reg = streaminfo.lock();
            match reg.insert(meta.clone(), found.list_id, found.line) {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!("stream info registry full, suspending enqueue");
                    return;
                }
            }
        };

        match player.push(stream_id, &uris[0], false).await {
            Ok(outcome) => {
                *current.lock() = Some(CurrentTrack {
                    stream_id,
                    list_id: found.list_id,
                    line: found.line,
                    meta: Some(meta),
                    alttrack: None,
                    url: None,
                });
                *stream_state.lock() = StreamState::Buffering;
                if outcome.overflow {
                    tracing::debug!("player FIFO full, suspending enqueue worker");
                    return;
                }
                result = op.find_next().await;
            }
            Err(e) if e.is_backpressure() => {
                streaminfo.lock().forget(stream_id);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "push failed, reverting enqueue worker");
                streaminfo.lock().forget(stream_id);
                return;
            }
        }
    }
}
