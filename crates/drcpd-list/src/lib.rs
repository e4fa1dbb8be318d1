//! Windowed list cache (C4): a synchronous-looking view over a broker's
//! possibly-unbounded, asynchronously-served enumeration.

mod broker;
mod item;

pub use broker::ListBroker;
pub use item::{ItemKind, ListItem, PreloadedMetaData};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use drcpd_ids::{ListError, ListId, OpResult};
use drcpd_segment::{IntersectKind, Segment};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Why `enter_list` is being called — informs logging and, in the crawler,
/// which direction the cursor should land on after the call resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterListCallerId {
    FirstEntry,
    ResetPosition,
    Descend,
    Ascend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintDirection {
    Forward,
    Backward,
}

const MAX_BUSY_RETRIES: u32 = 5;
const DEFAULT_BUSY_RETRY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Window {
    pub list_id: ListId,
    pub first_line: usize,
    pub items: Vec<Option<ListItem>>,
}

impl Window {
    fn segment(&self) -> Segment {
        Segment::new(self.first_line, self.items.len())
    }

    fn get(&self, line: usize) -> Option<&ListItem> {
        if line < self.first_line {
            return None;
        }
        self.items.get(line - self.first_line).and_then(|slot| slot.as_ref())
    }
}

#[derive(Debug, Clone, Default)]
struct CacheState {
    list_id: ListId,
    /// `None` means "unknown, must be re-queried" — set on construction and
    /// whenever a `ListInvalidate` rebind leaves the size indeterminate.
    list_size: Option<usize>,
    window: Option<Window>,
}

/// One open list's sliding window over a broker (spec §4.2).
///
/// Every broker round trip for this cache happens with `fetch_gate` held,
/// which is exactly the "at most one in-flight range fetch per window"
/// contract: a second caller arriving while a fetch is in progress simply
/// queues on the gate and, once it acquires it, re-checks the (by-then
/// updated) window before deciding whether it still needs to fetch anything.
pub struct ListCache<B: ListBroker> {
    broker: Arc<B>,
    prefetch_size: usize,
    state: Mutex<CacheState>,
    fetch_gate: tokio::sync::Mutex<()>,
    cancel_notify: Notify,
}

impl<B: ListBroker> ListCache<B> {
    pub fn new(broker: Arc<B>, prefetch_size: usize) -> Self {
        ListCache {
            broker,
            prefetch_size,
            state: Mutex::new(CacheState::default()),
            fetch_gate: tokio::sync::Mutex::new(()),
            cancel_notify: Notify::new(),
        }
    }

    pub fn get_list_id(&self) -> ListId {
        self.state.lock().list_id
    }

    pub fn get_number_of_items(&self) -> usize {
        self.state.lock().list_size.unwrap_or(0)
    }

    pub fn empty(&self) -> bool {
        matches!(self.state.lock().list_size, Some(0))
    }

    pub fn current_window(&self) -> Option<Window> {
        self.state.lock().window.clone()
    }

    /// Abandon whatever broker round trip is in flight. Already-settled
    /// state (a window fetched before the cancel arrived) is left alone;
    /// no new broker replies are applied once this fires for the call that
    /// is currently suspended.
    pub fn cancel_all_async_calls(&self) {
        self.cancel_notify.notify_waiters();
    }

    /// Copy list id / size / window from `other` without touching the
    /// broker, so the target can resume iterating immediately.
    pub fn clone_state(&self, other: &Self) {
        let snapshot = other.state.lock().clone();
        *self.state.lock() = snapshot;
    }

    /// Broker announced that `old` is no longer valid. Per the design
    /// decision in SPEC_FULL.md (open question, §9): if `new` is a valid
    /// replacement, rebind and mark the size dirty for re-query; otherwise
    /// discard the window outright.
    pub fn on_list_invalidate(&self, old: ListId, new: Option<ListId>) {
        let mut state = self.state.lock();
        if state.list_id != old {
            return;
        }
        match new {
            Some(new_id) if new_id.is_valid() => {
                tracing::info!(%old, %new_id, "rebinding window after list invalidate");
                state.list_id = new_id;
                if let Some(window) = &mut state.window {
                    window.list_id = new_id;
                }
                state.list_size = None;
            }
            _ => {
                tracing::info!(%old, "list invalidated with no replacement, discarding window");
                state.list_id = ListId::INVALID;
                state.list_size = None;
                state.window = None;
            }
        }
    }

    pub async fn enter_list(
        &self,
        list_id: ListId,
        start_line: usize,
        caller_id: EnterListCallerId,
        title: Option<String>,
    ) -> OpResult {
        {
            let state = self.state.lock();
            if state.list_id == list_id {
                if let Some(window) = &state.window {
                    if window.first_line == start_line || window.get(start_line).is_some() {
                        return OpResult::Succeeded;
                    }
                }
            }
        }

        let _gate = self.fetch_gate.lock().await;
        tracing::debug!(%list_id, start_line, ?caller_id, ?title, "entering list");

        let size = match self.cancelable(self.query_size(list_id)).await {
            Some(Ok(size)) => size,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "check_range failed on enter_list");
                return OpResult::Failed;
            }
            None => return OpResult::Canceled,
        };

        {
            let mut state = self.state.lock();
            state.list_id = list_id;
            state.list_size = Some(size);
            state.window = None;
        }

        if size == 0 || start_line >= size {
            let mut state = self.state.lock();
            state.window = Some(Window {
                list_id,
                first_line: size,
                items: Vec::new(),
            });
            return OpResult::Succeeded;
        }

        match self.cancelable(self.do_full_refill(list_id, start_line)).await {
            Some(result) => result,
            None => OpResult::Canceled,
        }
    }

    pub async fn get_item_async(&self, line: usize) -> (OpResult, Option<ListItem>) {
        let list_id = self.state.lock().list_id;
        if !list_id.is_valid() {
            return (OpResult::Failed, None);
        }

        if self.state.lock().list_size.is_none() {
            let _gate = self.fetch_gate.lock().await;
            if self.state.lock().list_size.is_none() {
                match self.cancelable(self.query_size(list_id)).await {
                    Some(Ok(size)) => self.state.lock().list_size = Some(size),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "re-query after invalidation failed");
                        return (OpResult::Failed, None);
                    }
                    None => return (OpResult::Canceled, None),
                }
            }
        }

        let size = self.state.lock().list_size.unwrap_or(0);
        if line >= size {
            return (OpResult::Succeeded, None);
        }
        if let Some(item) = self.state.lock().window.as_ref().and_then(|w| w.get(line).cloned()) {
            return (OpResult::Succeeded, Some(item));
        }

        let _gate = self.fetch_gate.lock().await;
        if let Some(item) = self.state.lock().window.as_ref().and_then(|w| w.get(line).cloned()) {
            return (OpResult::Succeeded, Some(item));
        }

        let result = match self.refill_kind_for(line) {
            RefillKind::Scroll => self.cancelable(self.do_scroll_fill(list_id, line)).await,
            RefillKind::Full => self.cancelable(self.do_full_refill(list_id, line)).await,
        };
        match result {
            Some(OpResult::Succeeded) => {
                let item = self.state.lock().window.as_ref().and_then(|w| w.get(line).cloned());
                (OpResult::Succeeded, item)
            }
            Some(other) => (other, None),
            None => (OpResult::Canceled, None),
        }
    }

    /// Ensure the item `direction`-adjacent to `from_line` is cached.
    /// Never performs a full refill (spec §4.2).
    pub async fn hint_planned_access(&self, from_line: usize, direction: HintDirection) -> OpResult {
        let target = match direction {
            HintDirection::Forward => from_line.saturating_add(1),
            HintDirection::Backward => match from_line.checked_sub(1) {
                Some(v) => v,
                None => return OpResult::Succeeded,
            },
        };

        let list_id = self.state.lock().list_id;
        let size = self.state.lock().list_size.unwrap_or(0);
        if !list_id.is_valid() || target >= size {
            return OpResult::Succeeded;
        }
        if self.state.lock().window.as_ref().and_then(|w| w.get(target)).is_some() {
            return OpResult::Succeeded;
        }

        let _gate = self.fetch_gate.lock().await;
        if self.state.lock().window.as_ref().and_then(|w| w.get(target)).is_some() {
            return OpResult::Succeeded;
        }

        match self.refill_kind_for(target) {
            RefillKind::Scroll => self
                .cancelable(self.do_scroll_fill(list_id, target))
                .await
                .unwrap_or(OpResult::Canceled),
            RefillKind::Full => OpResult::Succeeded,
        }
    }

    fn refill_kind_for(&self, target: usize) -> RefillKind {
        let seg = self.state.lock().window.as_ref().map(Window::segment);
        let gap = match seg {
            None => return RefillKind::Full,
            Some(seg) if target < seg.line => seg.line - target,
            Some(seg) if target >= seg.end() => target - seg.end() + 1,
            Some(_) => 0,
        };
        if gap <= self.prefetch_size {
            RefillKind::Scroll
        } else {
            RefillKind::Full
        }
    }

    async fn query_size(&self, list_id: ListId) -> Result<usize, ListError> {
        retry_on_busy(|| self.broker.check_range(list_id, 0, 0))
            .await
            .map(|(_, size)| size)
    }

    async fn do_full_refill(&self, list_id: ListId, first_line: usize) -> OpResult {
        let count = self.prefetch_size;
        match retry_on_busy(|| self.broker.get_range(list_id, first_line, count)).await {
            Ok((first_actual, items)) => {
                let truncated = items.len() < count;
                {
                    let mut state = self.state.lock();
                    state.window = Some(Window {
                        list_id,
                        first_line: first_actual,
                        items: items.into_iter().map(Some).collect(),
                    });
                }
                if truncated {
                    if let Ok((_, size)) = retry_on_busy(|| self.broker.check_range(list_id, 0, 0)).await {
                        self.state.lock().list_size = Some(size);
                    }
                }
                OpResult::Succeeded
            }
            Err(ListError::Empty) => {
                self.state.lock().window = Some(Window {
                    list_id,
                    first_line,
                    items: Vec::new(),
                });
                OpResult::Succeeded
            }
            Err(e) => {
                tracing::warn!(error = %e, %list_id, first_line, "full refill failed");
                OpResult::Failed
            }
        }
    }

    async fn do_scroll_fill(&self, list_id: ListId, target_line: usize) -> OpResult {
        let prefetch = self.prefetch_size;
        let old_window = self.state.lock().window.clone();
        let old_seg = old_window.as_ref().map(Window::segment).unwrap_or(Segment::new(0, 0));

        let desired_first = if target_line < old_seg.line {
            target_line
        } else if target_line >= old_seg.end() {
            (target_line + 1).saturating_sub(prefetch)
        } else {
            old_seg.line
        };
        let desired = Segment::new(desired_first, prefetch);
        let missing = self.missing_segment(desired, old_seg);

        let (fetched_first, fetched) = match missing {
            Some(gap) if gap.count > 0 => {
                match retry_on_busy(|| self.broker.get_range(list_id, gap.line, gap.count)).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(error = %e, %list_id, target_line, "scroll-fill failed");
                        return OpResult::Failed;
                    }
                }
            }
            _ => (desired.line, Vec::new()),
        };

        let merged = Self::splice_window(old_window.as_ref(), desired, fetched_first, fetched);
        self.state.lock().window = Some(Window {
            list_id,
            first_line: desired.line,
            items: merged,
        });
        OpResult::Succeeded
    }

    fn missing_segment(&self, desired: Segment, old: Segment) -> Option<Segment> {
        let intersection = desired.intersect(old);
        match intersection.kind {
            IntersectKind::Equal | IntersectKind::IncludedInOther | IntersectKind::CenterRemains => None,
            IntersectKind::BottomRemains => {
                Some(Segment::new(desired.line, old.line.saturating_sub(desired.line)))
            }
            IntersectKind::TopRemains => {
                Some(Segment::new(old.end(), desired.end().saturating_sub(old.end())))
            }
            IntersectKind::Disjoint => Some(desired),
        }
    }

    fn splice_window(
        old: Option<&Window>,
        desired: Segment,
        fetched_first: usize,
        fetched: Vec<ListItem>,
    ) -> Vec<Option<ListItem>> {
        let mut out = Vec::with_capacity(desired.count);
        for offset in 0..desired.count {
            let line = desired.line + offset;
            if line >= fetched_first && line < fetched_first + fetched.len() {
                out.push(fetched.get(line - fetched_first).cloned());
            } else if let Some(window) = old {
                out.push(window.get(line).cloned());
            } else {
                out.push(None);
            }
        }
        out
    }

    async fn cancelable<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        let cancelled = self.cancel_notify.notified();
        tokio::select! {
            biased;
            _ = cancelled => None,
            v = fut => Some(v),
        }
    }
}

enum RefillKind {
    Scroll,
    Full,
}

async fn retry_on_busy<F, Fut, T>(mut f: F) -> Result<T, ListError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ListError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Err(e) if e.is_busy() && attempt < MAX_BUSY_RETRIES => {
                attempt += 1;
                let delay = e.busy_retry_delay_ms().unwrap_or(DEFAULT_BUSY_RETRY_MS);
                tracing::debug!(attempt, delay, "broker busy, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeBroker {
        items: AsyncMutex<Vec<ListItem>>,
        range_calls: AtomicUsize,
    }

    impl FakeBroker {
        fn with_size(n: usize) -> Self {
            let items = (0..n)
                .map(|i| ListItem::new(ItemKind::RegularFile, format!("item{i}")))
                .collect();
            FakeBroker {
                items: AsyncMutex::new(items),
                range_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ListBroker for FakeBroker {
        async fn get_list_id(&self, _: ListId, _: usize) -> Result<(ListId, String, bool), ListError> {
            Ok((ListId::new(2), "child".into(), false))
        }

        async fn check_range(&self, _: ListId, _: usize, _: usize) -> Result<(usize, usize), ListError> {
            Ok((0, self.items.lock().await.len()))
        }

        async fn get_range(&self, _: ListId, first: usize, count: usize) -> Result<(usize, Vec<ListItem>), ListError> {
            self.range_calls.fetch_add(1, Ordering::SeqCst);
            let items = self.items.lock().await;
            if first >= items.len() {
                return Ok((first, Vec::new()));
            }
            let end = (first + count).min(items.len());
            Ok((first, items[first..end].to_vec()))
        }

        async fn get_uris(&self, _: ListId, _: usize) -> Result<Vec<String>, ListError> {
            Ok(vec!["http://example/track".into()])
        }

        async fn get_parent_link(&self, _: ListId) -> Result<(ListId, usize, String, bool), ListError> {
            Ok((ListId::new(1), 0, "root".into(), false))
        }
    }

    #[tokio::test]
    async fn scroll_fill_preserves_cache() {
        let broker = Arc::new(FakeBroker::with_size(100));
        let cache = ListCache::new(broker.clone(), 5);
        let r = cache.enter_list(ListId::new(1), 0, EnterListCallerId::FirstEntry, None).await;
        assert_eq!(r, OpResult::Succeeded);
        assert_eq!(cache.current_window().unwrap().first_line, 0);

        let (op, item) = cache.get_item_async(6).await;
        assert_eq!(op, OpResult::Succeeded);
        assert!(item.is_some());
        let window = cache.current_window().unwrap();
        assert_eq!(window.first_line, 2);
        assert_eq!(window.items.len(), 5);
    }

    #[tokio::test]
    async fn full_refill_on_far_jump() {
        let broker = Arc::new(FakeBroker::with_size(100));
        let cache = ListCache::new(broker.clone(), 5);
        cache.enter_list(ListId::new(1), 0, EnterListCallerId::FirstEntry, None).await;
        let (op, _) = cache.get_item_async(40).await;
        assert_eq!(op, OpResult::Succeeded);
        let window = cache.current_window().unwrap();
        assert_eq!(window.first_line, 40);
    }

    #[tokio::test]
    async fn empty_list_returns_null_item() {
        let broker = Arc::new(FakeBroker::with_size(0));
        let cache = ListCache::new(broker, 5);
        cache.enter_list(ListId::new(1), 0, EnterListCallerId::FirstEntry, None).await;
        assert!(cache.empty());
        let (op, item) = cache.get_item_async(0).await;
        assert_eq!(op, OpResult::Succeeded);
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn list_invalidate_rebinds_and_marks_dirty() {
        let broker = Arc::new(FakeBroker::with_size(10));
        let cache = ListCache::new(broker, 5);
        cache.enter_list(ListId::new(1), 0, EnterListCallerId::FirstEntry, None).await;
        cache.on_list_invalidate(ListId::new(1), Some(ListId::new(9)));
        assert_eq!(cache.get_list_id(), ListId::new(9));
        assert!(self_test_size_is_dirty(&cache));
        let (op, _) = cache.get_item_async(0).await;
        assert_eq!(op, OpResult::Succeeded);
    }

    fn self_test_size_is_dirty<B: ListBroker>(cache: &ListCache<B>) -> bool {
        cache.state.lock().list_size.is_none()
    }
}
