//! Playlist crawler (C6): a depth-first (or flat) traversal over the
//! windowed list cache, feeding selected leaf items to whoever started the
//! traversal while honouring cancellation, depth limits, and partial
//! failure recovery.

use std::sync::Arc;

use drcpd_ids::{ListId, OpResult};
use drcpd_list::{EnterListCallerId, HintDirection, ListBroker, ListCache, ListItem};
use parking_lot::Mutex;

/// `MAX_DIRECTORY_DEPTH` in the original implementation.
pub const MAX_DIRECTORY_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    Forward,
    Backward,
}

impl Direction {
    pub const fn reversed(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
            Direction::None => Direction::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursiveMode {
    Flat,
    DepthFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalState {
    SomewhereInList,
    ReachedStartOfList,
    ReachedEndOfList,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindNextOpState {
    Initial,
    Running,
    WaitingForList,
    WaitingForItem,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundItem {
    pub list_id: ListId,
    pub line: usize,
    pub item: ListItem,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindNextResult {
    pub positional_state: PositionalState,
    pub found: Option<FoundItem>,
}

impl FindNextResult {
    fn cancelled() -> Self {
        FindNextResult { positional_state: PositionalState::Unknown, found: None }
    }

    fn failed() -> Self {
        FindNextResult { positional_state: PositionalState::Unknown, found: None }
    }
}

enum ContinueOutcome {
    Moved(usize),
    EndOfLevel,
}

/// A single forward- or backward-moving traversal operation (GLOSSARY:
/// FindNextOp). Lives from `start()` through its asynchronous continuations
/// until it terminates exactly once, in `Succeeded`, `Failed` or
/// `Cancelled`.
///
/// Every field besides `cache`/`broker`/`direction`/`mode` is interior-
/// mutable so `state()` can be polled from another task while `start()` is
/// suspended awaiting the cache.
pub struct FindNextOp<B: ListBroker> {
    cache: Arc<ListCache<B>>,
    broker: Arc<B>,
    direction: Direction,
    mode: RecursiveMode,
    state: Mutex<FindNextOpState>,
    cursor: Mutex<usize>,
    depth: Mutex<usize>,
    /// True immediately after an ascend, until the next item is
    /// successfully examined. Surfaced mainly for tests and logging — the
    /// traversal loop itself recovers "nothing left at this level" directly
    /// inside `continue_search`, it does not need to branch on this flag.
    has_skipped_first: Mutex<bool>,
    stack: Mutex<Vec<(ListId, usize)>>,
}

impl<B: ListBroker> FindNextOp<B> {
    pub fn new(cache: Arc<ListCache<B>>, broker: Arc<B>, direction: Direction, mode: RecursiveMode) -> Self {
        FindNextOp {
            cache,
            broker,
            direction,
            mode,
            state: Mutex::new(FindNextOpState::Initial),
            cursor: Mutex::new(0),
            depth: Mutex::new(1),
            has_skipped_first: Mutex::new(false),
            stack: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> FindNextOpState {
        *self.state.lock()
    }

    pub fn has_skipped_first(&self) -> bool {
        *self.has_skipped_first.lock()
    }

    pub fn current_depth(&self) -> usize {
        *self.depth.lock()
    }

    /// Synchronous from the caller's perspective: cancels the underlying
    /// cache's in-flight async call and moves the op to `Cancelled`. Any
    /// enter-list/item-hint event already in flight is dropped without
    /// state change once it arrives.
    pub fn cancel(&self) {
        self.cache.cancel_all_async_calls();
        *self.state.lock() = FindNextOpState::Cancelled;
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.state(), FindNextOpState::Cancelled)
    }

    fn natural_first_index(&self, size: usize) -> usize {
        match self.direction {
            Direction::Backward => size.saturating_sub(1),
            _ => 0,
        }
    }

    fn end_positional_state(&self) -> PositionalState {
        match self.direction {
            Direction::Backward => PositionalState::ReachedStartOfList,
            _ => PositionalState::ReachedEndOfList,
        }
    }

    fn hint_direction(&self) -> HintDirection {
        match self.direction {
            Direction::Backward => HintDirection::Backward,
            _ => HintDirection::Forward,
        }
    }

    /// `do_start`: enter the root list at `start_line` and run as far as
    /// possible.
    pub async fn start(&self, root_list: ListId, start_line: usize) -> FindNextResult {
        *self.state.lock() = FindNextOpState::WaitingForList;
        let op = self
            .cache
            .enter_list(root_list, start_line, EnterListCallerId::FirstEntry, None)
            .await;
        if self.is_cancelled() {
            return FindNextResult::cancelled();
        }
        *self.state.lock() = FindNextOpState::Running;
        match op {
            OpResult::Succeeded => {}
            OpResult::Canceled => return FindNextResult::cancelled(),
            _ => {
                *self.state.lock() = FindNextOpState::Failed;
                return FindNextResult::failed();
            }
        }

        if self.cache.empty() {
            *self.state.lock() = FindNextOpState::Succeeded;
            return FindNextResult { positional_state: self.end_positional_state(), found: None };
        }

        let size = self.cache.get_number_of_items();
        *self.cursor.lock() = start_line.min(size.saturating_sub(1));
        self.run_as_far_as_possible().await
    }

    /// Advance to the next matching item after whatever `start()` or a
    /// previous `find_next()` landed on. Reuses the cursor/depth/stack left
    /// behind by that call rather than re-entering from the root — the
    /// caller drives a single long-lived `FindNextOp` forward one item at a
    /// time instead of constructing a fresh one per item.
    pub async fn find_next(&self) -> FindNextResult {
        if self.is_cancelled() {
            return FindNextResult::cancelled();
        }
        match self.continue_search().await {
            Some(result) => result,
            None => self.run_as_far_as_possible().await,
        }
    }

    async fn run_as_far_as_possible(&self) -> FindNextResult {
        loop {
            if self.is_cancelled() {
                return FindNextResult::cancelled();
            }

            let cursor = *self.cursor.lock();

            *self.state.lock() = FindNextOpState::WaitingForItem;
            let _ = self.cache.hint_planned_access(cursor, self.hint_direction()).await;
            if self.is_cancelled() {
                return FindNextResult::cancelled();
            }

            let (op, item) = self.cache.get_item_async(cursor).await;
            if self.is_cancelled() {
                return FindNextResult::cancelled();
            }
            *self.state.lock() = FindNextOpState::Running;

            match op {
                OpResult::Succeeded => {}
                OpResult::Canceled => return FindNextResult::cancelled(),
                _ => {
                    *self.state.lock() = FindNextOpState::Failed;
                    return FindNextResult::failed();
                }
            }

            let Some(item) = item else {
                match self.continue_search().await {
                    Some(result) => return result,
                    None => continue,
                }
            };

            if !item.is_directory() {
                let found = FoundItem { list_id: self.cache.get_list_id(), line: cursor, item };
                *self.state.lock() = FindNextOpState::Succeeded;
                return FindNextResult { positional_state: PositionalState::SomewhereInList, found: Some(found) };
            }

            if matches!(self.mode, RecursiveMode::Flat) {
                match self.continue_search().await {
                    Some(result) => return result,
                    None => continue,
                }
            }

            if *self.depth.lock() >= MAX_DIRECTORY_DEPTH {
                tracing::warn!(depth = MAX_DIRECTORY_DEPTH, "max directory depth reached, skipping");
                match self.continue_search().await {
                    Some(result) => return result,
                    None => continue,
                }
            }

            let parent_list = self.cache.get_list_id();
            match self.broker.get_list_id(parent_list, cursor).await {
                Ok((child_id, _title, _translatable)) if child_id.is_valid() => {
                    self.stack.lock().push((parent_list, cursor));
                    *self.depth.lock() += 1;
                    *self.state.lock() = FindNextOpState::WaitingForList;
                    let op = self
                        .cache
                        .enter_list(child_id, 0, EnterListCallerId::Descend, None)
                        .await;
                    if self.is_cancelled() {
                        return FindNextResult::cancelled();
                    }
                    *self.state.lock() = FindNextOpState::Running;
                    match op {
                        OpResult::Succeeded => {
                            let child_size = self.cache.get_number_of_items();
                            *self.cursor.lock() = self.natural_first_index(child_size);
                            *self.has_skipped_first.lock() = false;
                            continue;
                        }
                        OpResult::Canceled => return FindNextResult::cancelled(),
                        _ => {
                            // failed to open: soft skip, not an op failure
                            self.stack.lock().pop();
                            *self.depth.lock() -= 1;
                            match self.continue_search().await {
                                Some(result) => return result,
                                None => continue,
                            }
                        }
                    }
                }
                Ok(_) => match self.continue_search().await {
                    Some(result) => return result,
                    None => continue,
                },
                Err(e) if e.is_hard() => {
                    *self.state.lock() = FindNextOpState::Failed;
                    return FindNextResult::failed();
                }
                Err(_soft) => match self.continue_search().await {
                    Some(result) => return result,
                    None => continue,
                },
            }
        }
    }

    fn step_cursor(&self) -> ContinueOutcome {
        let size = self.cache.get_number_of_items();
        let cur = *self.cursor.lock();
        let next = match self.direction {
            Direction::Backward => cur.checked_sub(1),
            _ => cur.checked_add(1),
        };
        match next {
            Some(n) if n < size => {
                *self.cursor.lock() = n;
                ContinueOutcome::Moved(n)
            }
            _ => ContinueOutcome::EndOfLevel,
        }
    }

    /// Step the cursor one position in the traversal direction. If that
    /// runs off the current level, ascend to the parent (or terminate if
    /// already at depth 1). Returns `None` when the caller should simply
    /// loop and examine the new cursor position; `Some(result)` when the
    /// traversal has reached a terminal outcome.
    async fn continue_search(&self) -> Option<FindNextResult> {
        loop {
            match self.step_cursor() {
                ContinueOutcome::Moved(_) => return None,
                ContinueOutcome::EndOfLevel => {
                    if *self.depth.lock() <= 1 {
                        *self.state.lock() = FindNextOpState::Succeeded;
                        return Some(FindNextResult { positional_state: self.end_positional_state(), found: None });
                    }

                    let (parent_list, child_cursor) =
                        self.stack.lock().pop().expect("depth > 1 implies a stack frame");
                    *self.state.lock() = FindNextOpState::WaitingForList;
                    let op = self
                        .cache
                        .enter_list(parent_list, child_cursor, EnterListCallerId::Ascend, None)
                        .await;
                    if self.is_cancelled() {
                        return Some(FindNextResult::cancelled());
                    }
                    *self.state.lock() = FindNextOpState::Running;

                    match op {
                        OpResult::Succeeded => {
                            *self.depth.lock() -= 1;
                            *self.has_skipped_first.lock() = true;
                            let size = self.cache.get_number_of_items();
                            let next = match self.direction {
                                Direction::Backward => child_cursor.checked_sub(1),
                                _ => child_cursor.checked_add(1),
                            };
                            match next {
                                Some(n) if n < size => {
                                    *self.cursor.lock() = n;
                                    return None;
                                }
                                _ => {
                                    *self.cursor.lock() = match self.direction {
                                        Direction::Backward => 0,
                                        _ => size,
                                    };
                                    continue;
                                }
                            }
                        }
                        OpResult::Canceled => return Some(FindNextResult::cancelled()),
                        _ => {
                            *self.state.lock() = FindNextOpState::Failed;
                            return Some(FindNextResult::failed());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drcpd_ids::{ListError, ListId};
    use drcpd_list::{ItemKind, ListItem};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Clone)]
    enum Entry {
        File(&'static str),
        Dir(&'static str, ListId),
    }

    struct TreeBroker {
        lists: AsyncMutex<std::collections::HashMap<u32, Vec<Entry>>>,
    }

    impl TreeBroker {
        fn scenario_3() -> Self {
            // root: [fileA, dirEmpty, dirWithFile, fileC]
            let mut lists = std::collections::HashMap::new();
            lists.insert(
                1,
                vec![
                    Entry::File("fileA"),
                    Entry::Dir("dirEmpty", ListId::new(2)),
                    Entry::Dir("dirWithFile", ListId::new(3)),
                    Entry::File("fileC"),
                ],
            );
            lists.insert(2, vec![]);
            lists.insert(3, vec![Entry::File("fileB")]);
            TreeBroker { lists: AsyncMutex::new(lists) }
        }
    }

    #[async_trait::async_trait]
    impl ListBroker for TreeBroker {
        async fn get_list_id(&self, parent_list: ListId, item: usize) -> Result<(ListId, String, bool), ListError> {
            let lists = self.lists.lock().await;
            let entries = lists.get(&parent_list.raw()).ok_or(ListError::InvalidId)?;
            match entries.get(item) {
                Some(Entry::Dir(name, id)) => Ok((*id, name.to_string(), false)),
                _ => Ok((ListId::INVALID, String::new(), false)),
            }
        }

        async fn check_range(&self, list: ListId, _first: usize, _count: usize) -> Result<(usize, usize), ListError> {
            let lists = self.lists.lock().await;
            let entries = lists.get(&list.raw()).ok_or(ListError::InvalidId)?;
            Ok((0, entries.len()))
        }

        async fn get_range(&self, list: ListId, first: usize, count: usize) -> Result<(usize, Vec<ListItem>), ListError> {
            let lists = self.lists.lock().await;
            let entries = lists.get(&list.raw()).ok_or(ListError::InvalidId)?;
            let end = (first + count).min(entries.len());
            let items = entries[first.min(entries.len())..end]
                .iter()
                .map(|e| match e {
                    Entry::File(name) => ListItem::new(ItemKind::RegularFile, *name),
                    Entry::Dir(name, _) => ListItem::new(ItemKind::Directory, *name),
                })
                .collect();
            Ok((first, items))
        }

        async fn get_uris(&self, _list: ListId, _item: usize) -> Result<Vec<String>, ListError> {
            Ok(vec![])
        }

        async fn get_parent_link(&self, _list: ListId) -> Result<(ListId, usize, String, bool), ListError> {
            Ok((ListId::new(1), 0, "root".into(), false))
        }
    }

    #[tokio::test]
    async fn crawler_skips_empty_directories() {
        let broker = Arc::new(TreeBroker::scenario_3());
        let cache = Arc::new(ListCache::new(broker.clone(), 10));
        let op = FindNextOp::new(cache, broker, Direction::Forward, RecursiveMode::DepthFirst);

        let first = op.start(ListId::new(1), 0).await;
        let mut names = vec![first.found.expect("fileA").item.text];

        loop {
            let result = op.find_next().await;
            match result.found {
                Some(found) => names.push(found.item.text),
                None => {
                    assert_eq!(result.positional_state, PositionalState::ReachedEndOfList);
                    break;
                }
            }
        }

        assert_eq!(names, vec!["fileA", "fileB", "fileC"]);
        assert_eq!(op.state(), FindNextOpState::Succeeded);
    }

    #[tokio::test]
    async fn reached_end_of_list_is_stable_under_repeated_find_next() {
        let broker = Arc::new(TreeBroker::scenario_3());
        let cache = Arc::new(ListCache::new(broker.clone(), 10));
        let op = FindNextOp::new(cache, broker, Direction::Forward, RecursiveMode::DepthFirst);

        op.start(ListId::new(1), 0).await;
        while op.find_next().await.found.is_some() {}

        let again = op.find_next().await;
        assert!(again.found.is_none());
        assert_eq!(again.positional_state, PositionalState::ReachedEndOfList);
    }
}
