/// The kinds a list item can take (spec §3's variant-over-kinds model,
/// replacing the original's deep list/tree/text item inheritance with a
/// single tagged enum — capability predicates below are pure functions over
/// it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Opaque,
    RegularFile,
    Directory,
    PlaylistFile,
    PlaylistDirectory,
    Server,
    StorageDevice,
    SearchForm,
    LogoutLink,
    Locked,
}

impl ItemKind {
    /// Containers the crawler may descend into.
    pub const fn is_container(self) -> bool {
        matches!(
            self,
            ItemKind::Directory
                | ItemKind::PlaylistDirectory
                | ItemKind::Server
                | ItemKind::StorageDevice
        )
    }

    pub const fn is_selectable(self) -> bool {
        !matches!(self, ItemKind::Locked)
    }
}

/// Metadata obtained from the item at enumeration time, used as a fallback
/// before the player emits live tag data (GLOSSARY: preloaded metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadedMetaData {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub kind: ItemKind,
    pub text: String,
    pub translatable: bool,
    pub meta: Option<PreloadedMetaData>,
}

impl ListItem {
    pub fn new(kind: ItemKind, text: impl Into<String>) -> Self {
        ListItem {
            kind,
            text: text.into(),
            translatable: false,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: PreloadedMetaData) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_container()
    }
}
