//! Persisted configuration store: an INI-style `[drcpd]`/`[i18n]` file,
//! a typed key table, and RAII update scopes that batch writes into a
//! single persist-and-notify on scope exit.

mod ini;
mod keys;
mod store;
mod value;

pub use keys::Key;
pub use store::{ConfigStore, UpdateScope};
pub use value::ConfigValue;

pub use drcpd_ids::ConfigInsertError;
