use async_trait::async_trait;
use drcpd_ids::{ListError, ListId};

use crate::item::ListItem;

/// What a list broker (§6, "List-broker bus") exposes to the cache.
///
/// `get_list_id`, `check_range` and `get_parent_link` are modelled as
/// synchronous in the spec (short, local-bus calls); `get_range`/`get_uris`
/// are the ones that may hit a slow upstream and are genuinely `async` here
/// — the call itself *is* the envelope (C2): `.await`ing it is exactly
/// "suspend until `DataAvailable`/`DataError`, then transition to
/// `fetched`".
#[async_trait]
pub trait ListBroker: Send + Sync {
    async fn get_list_id(
        &self,
        parent_list: ListId,
        item: usize,
    ) -> Result<(ListId, String, bool), ListError>;

    /// `(list, 0, 0)` is the size query used by `enter_list`. Returns
    /// `(first_actual, size)`.
    async fn check_range(&self, list: ListId, first: usize, count: usize) -> Result<(usize, usize), ListError>;

    /// Returns `(first_actual, items)`; `items.len()` may be less than
    /// `count` if the broker truncates near the end of the list.
    async fn get_range(
        &self,
        list: ListId,
        first: usize,
        count: usize,
    ) -> Result<(usize, Vec<ListItem>), ListError>;

    async fn get_uris(&self, list: ListId, item: usize) -> Result<Vec<String>, ListError>;

    async fn get_parent_link(&self, list: ListId) -> Result<(ListId, usize, String, bool), ListError>;
}
