use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drcpd_ids::ConfigInsertError;
use parking_lot::Mutex;

use crate::ini;
use crate::keys::Key;
use crate::value::ConfigValue;

const ENV_PREFIX: &str = "DRCPD_CONFIG__";

/// Read-mostly configuration store (spec §5, "Shared resources"). Loaded
/// once at startup, mutated through short-lived `UpdateScope` guards so a
/// burst of `set()` calls only persists to disk and notifies listeners
/// once.
pub struct ConfigStore {
    path: Option<PathBuf>,
    values: Mutex<HashMap<Key, ConfigValue>>,
    on_change: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl ConfigStore {
    pub fn new() -> Arc<Self> {
        Arc::new(ConfigStore { path: None, values: Mutex::new(HashMap::new()), on_change: Mutex::new(Vec::new()) })
    }

    /// Load from an INI file at `path`, falling back to an empty store if
    /// the file does not exist yet (first run). Environment variables of
    /// the form `DRCPD_CONFIG__<SECTION>__<NAME>` override whatever the
    /// file contains, the same override convention `pmoconfig` applies
    /// with its own `PMOMUSIC_CONFIG__` prefix.
    pub fn load_from_file(path: impl AsRef<Path>) -> Arc<Self> {
        let path = path.as_ref().to_path_buf();
        let mut values = HashMap::new();

        if let Ok(text) = fs::read_to_string(&path) {
            let doc = ini::parse(&text);
            for key in [Key::MaximumStreamBitRate, Key::LanguageCode, Key::CountryCode] {
                if let Some(raw) = doc.get(key.section()).and_then(|s| s.get(key.name())) {
                    let value = ConfigValue::from_wire(raw);
                    match key.validate(&value) {
                        Ok(()) => {
                            values.insert(key, value);
                        }
                        Err(e) => tracing::warn!(%key, raw = %raw, error = %e, "ignoring invalid value from config file"),
                    }
                }
            }
        }

        for key in [Key::MaximumStreamBitRate, Key::LanguageCode, Key::CountryCode] {
            let env_name = format!("{ENV_PREFIX}{}__{}", key.section().to_ascii_uppercase(), key.name().to_ascii_uppercase());
            if let Ok(raw) = std::env::var(&env_name) {
                let value = ConfigValue::from_wire(&raw);
                match key.validate(&value) {
                    Ok(()) => {
                        values.insert(key, value);
                    }
                    Err(e) => {
                        tracing::warn!(%key, raw = %raw, env = %env_name, error = %e, "ignoring invalid value from environment override")
                    }
                }
            }
        }

        Arc::new(ConfigStore { path: Some(path), values: Mutex::new(values), on_change: Mutex::new(Vec::new()) })
    }

    pub fn get(&self, key: Key) -> Option<ConfigValue> {
        self.values.lock().get(&key).cloned()
    }

    /// Register a callback fired once per `UpdateScope` commit that
    /// actually changed something.
    pub fn on_change(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_change.lock().push(Box::new(callback));
    }

    /// Set a single key outside of an explicit scope; equivalent to a
    /// one-entry `UpdateScope`.
    pub fn set(&self, key: Key, value: ConfigValue) -> ConfigInsertError {
        let mut scope = self.begin_update();
        let outcome = scope.set(key, value);
        drop(scope);
        outcome
    }

    /// Set by a wire-format `section:name` (or bare `name`) key, the form
    /// a remote caller addresses a key by. Unrecognised names are rejected
    /// with `KeyUnknown` rather than silently ignored, matching the
    /// runtime `set` error taxonomy (spec §7); this is distinct from
    /// `load_from_file`, where unknown keys are dropped silently.
    pub fn set_by_name(&self, qualified: &str, value: ConfigValue) -> ConfigInsertError {
        let mut scope = self.begin_update();
        let outcome = scope.set_by_name(qualified, value);
        drop(scope);
        outcome
    }

    pub fn begin_update(&self) -> UpdateScope<'_> {
        UpdateScope { store: self, dirty: false }
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        let values = self.values.lock();
        let mut doc = ini::IniDocument::new();
        for (key, value) in values.iter() {
            doc.entry(key.section().to_string()).or_default().insert(key.name().to_string(), value.to_wire());
        }
        if let Err(e) = fs::write(path, ini::write(&doc)) {
            tracing::warn!(error = %e, path = %path.display(), "failed to persist configuration");
        }
    }

    fn notify(&self) {
        for callback in self.on_change.lock().iter() {
            callback();
        }
    }
}

/// Batches a run of `set()` calls into a single persist-and-notify on
/// drop, mirroring the spec's "update-scope objects that batch writes and
/// emit a change-notification on scope exit".
pub struct UpdateScope<'a> {
    store: &'a ConfigStore,
    dirty: bool,
}

impl<'a> UpdateScope<'a> {
    pub fn set(&mut self, key: Key, value: ConfigValue) -> ConfigInsertError {
        if let Err(e) = key.validate(&value) {
            return e;
        }

        let mut values = self.store.values.lock();
        match values.get(&key) {
            Some(existing) if *existing == value => ConfigInsertError::Unchanged,
            _ => {
                values.insert(key, value);
                self.dirty = true;
                ConfigInsertError::Updated
            }
        }
    }

    pub fn set_by_name(&mut self, qualified: &str, value: ConfigValue) -> ConfigInsertError {
        match Key::from_qualified_name(qualified) {
            Some(key) => self.set(key, value),
            None => ConfigInsertError::KeyUnknown,
        }
    }
}

impl<'a> Drop for UpdateScope<'a> {
    fn drop(&mut self) {
        if self.dirty {
            self.store.persist();
            self.store.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn scenario_set_maximum_stream_bit_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drcpd.conf");
        let store = ConfigStore::load_from_file(&path);

        assert_eq!(store.set(Key::MaximumStreamBitRate, ConfigValue::Str("unlimited".into())), ConfigInsertError::Updated);
        assert_eq!(store.get(Key::MaximumStreamBitRate), Some(ConfigValue::Str("unlimited".into())));

        assert_eq!(store.set(Key::MaximumStreamBitRate, ConfigValue::Int(0)), ConfigInsertError::ValueInvalid);
        assert_eq!(store.get(Key::MaximumStreamBitRate), Some(ConfigValue::Str("unlimited".into())));

        assert_eq!(store.set(Key::MaximumStreamBitRate, ConfigValue::Int(256_000)), ConfigInsertError::Updated);
        assert_eq!(store.get(Key::MaximumStreamBitRate), Some(ConfigValue::Int(256_000)));
    }

    #[test]
    fn update_scope_notifies_once_for_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drcpd.conf");
        let store = ConfigStore::load_from_file(&path);

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        store.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        {
            let mut scope = store.begin_update();
            scope.set(Key::LanguageCode, ConfigValue::Str("en".into()));
            scope.set(Key::CountryCode, ConfigValue::Str("us".into()));
        }

        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert!(fs::read_to_string(&path).unwrap().contains("language_code = en"));
    }

    #[test]
    fn set_by_name_matches_scenario_six() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drcpd.conf");
        let store = ConfigStore::load_from_file(&path);

        assert_eq!(
            store.set_by_name("drcpd:maximum_stream_bit_rate", ConfigValue::Str("unlimited".into())),
            ConfigInsertError::Updated
        );
        assert_eq!(store.get(Key::MaximumStreamBitRate), Some(ConfigValue::Str("unlimited".into())));

        assert_eq!(store.set_by_name("drcpd:maximum_stream_bit_rate", ConfigValue::Int(0)), ConfigInsertError::ValueInvalid);

        assert_eq!(
            store.set_by_name("drcpd:maximum_stream_bit_rate", ConfigValue::Int(256_000)),
            ConfigInsertError::Updated
        );
        assert_eq!(store.get(Key::MaximumStreamBitRate), Some(ConfigValue::Int(256_000)));
    }

    #[test]
    fn set_by_name_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drcpd.conf");
        let store = ConfigStore::load_from_file(&path);

        assert_eq!(store.set_by_name("drcpd:not_a_real_key", ConfigValue::Int(1)), ConfigInsertError::KeyUnknown);
    }

    #[test]
    fn set_distinguishes_wrong_type_from_wrong_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drcpd.conf");
        let store = ConfigStore::load_from_file(&path);

        assert_eq!(store.set(Key::LanguageCode, ConfigValue::Int(1)), ConfigInsertError::ValueTypeInvalid);
        assert_eq!(store.set(Key::LanguageCode, ConfigValue::Str("eng".into())), ConfigInsertError::ValueInvalid);
        assert_eq!(store.get(Key::LanguageCode), None);
    }

    #[test]
    fn unchanged_set_does_not_persist_or_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drcpd.conf");
        let store = ConfigStore::load_from_file(&path);
        store.set(Key::LanguageCode, ConfigValue::Str("en".into()));

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        store.on_change(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(store.set(Key::LanguageCode, ConfigValue::Str("en".into())), ConfigInsertError::Unchanged);
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
    }
}
