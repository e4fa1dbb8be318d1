//! Stream info registry (C7): fixed-capacity map from *our* stream id to
//! preloaded metadata and originating list coordinates.

use std::collections::HashMap;

use drcpd_ids::{ListId, OurStreamIdGenerator, StreamId};
use drcpd_list::PreloadedMetaData;

/// `StreamInfo::MAX_ENTRIES` in the original implementation.
pub const MAX_ENTRIES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfoItem {
    pub meta: PreloadedMetaData,
    pub list_id: ListId,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamInfoError {
    #[error("registry is at capacity ({MAX_ENTRIES} entries)")]
    Full,
}

pub struct StreamInfoRegistry {
    entries: HashMap<StreamId, StreamInfoItem>,
    referenced_lists: HashMap<ListId, usize>,
    generator: OurStreamIdGenerator,
    capacity: usize,
}

impl Default for StreamInfoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamInfoRegistry {
    pub fn new() -> Self {
        StreamInfoRegistry {
            entries: HashMap::new(),
            referenced_lists: HashMap::new(),
            generator: OurStreamIdGenerator::new(),
            capacity: MAX_ENTRIES,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocates the next free *our* stream id and records `meta` against
    /// the list coordinates it was found at. Fails once at capacity — the
    /// caller must `forget()` an id first.
    pub fn insert(&mut self, meta: PreloadedMetaData, list_id: ListId, line: usize) -> Result<StreamId, StreamInfoError> {
        if self.entries.len() >= self.capacity {
            return Err(StreamInfoError::Full);
        }
        let id = loop {
            let candidate = self.generator.next_id();
            if candidate.is_valid() && !self.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        tracing::debug!(%id, %list_id, line, "registered stream info");
        self.entries.insert(id, StreamInfoItem { meta, list_id, line });
        *self.referenced_lists.entry(list_id).or_insert(0) += 1;
        Ok(id)
    }

    /// Removes `id`, decrementing the originating list's reference count
    /// and dropping it from the referenced set once it hits zero.
    pub fn forget(&mut self, id: StreamId) -> Option<StreamInfoItem> {
        let item = self.entries.remove(&id)?;
        if let Some(count) = self.referenced_lists.get_mut(&item.list_id) {
            *count -= 1;
            if *count == 0 {
                self.referenced_lists.remove(&item.list_id);
            }
        }
        tracing::debug!(%id, "forgot stream info");
        Some(item)
    }

    pub fn lookup(&self, id: StreamId) -> Option<&StreamInfoItem> {
        self.entries.get(&id)
    }

    pub fn lookup_for_update(&mut self, id: StreamId) -> Option<&mut StreamInfoItem> {
        self.entries.get_mut(&id)
    }

    pub fn is_list_referenced(&self, list_id: ListId) -> bool {
        self.referenced_lists.contains_key(&list_id)
    }

    pub fn get_referenced_lists(&self) -> impl Iterator<Item = ListId> + '_ {
        self.referenced_lists.keys().copied()
    }
}
