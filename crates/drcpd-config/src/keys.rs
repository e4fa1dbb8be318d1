use std::fmt;

use drcpd_ids::ConfigInsertError;

use crate::value::ConfigValue;

/// Recognised configuration keys (spec §6, "Persisted state"). Unknown
/// keys read from a config file or set at runtime are rejected with
/// `KeyUnknown` rather than silently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    MaximumStreamBitRate,
    LanguageCode,
    CountryCode,
}

pub struct KeyDescriptor {
    pub key: Key,
    pub section: &'static str,
    pub name: &'static str,
    pub validate: fn(&ConfigValue) -> Result<(), ConfigInsertError>,
}

const KEY_TABLE: &[KeyDescriptor] = &[
    KeyDescriptor { key: Key::MaximumStreamBitRate, section: "drcpd", name: "maximum_stream_bit_rate", validate: validate_bit_rate },
    KeyDescriptor { key: Key::LanguageCode, section: "i18n", name: "language_code", validate: validate_locale_code },
    KeyDescriptor { key: Key::CountryCode, section: "i18n", name: "country_code", validate: validate_locale_code },
];

/// Both `Str` and `Int` are admissible shapes for this key (the literal
/// `"unlimited"` or a positive byte rate), so a type mismatch can't occur
/// here — only a same-typed bad value can.
fn validate_bit_rate(value: &ConfigValue) -> Result<(), ConfigInsertError> {
    match value {
        ConfigValue::Str(s) if s.eq_ignore_ascii_case("unlimited") => Ok(()),
        ConfigValue::Str(_) => Err(ConfigInsertError::ValueInvalid),
        ConfigValue::Int(n) if *n > 0 => Ok(()),
        ConfigValue::Int(_) => Err(ConfigInsertError::ValueInvalid),
    }
}

/// Locale codes are string-only; an `Int` is a type mismatch, while a
/// wrong-shaped string is a value mismatch.
fn validate_locale_code(value: &ConfigValue) -> Result<(), ConfigInsertError> {
    match value {
        ConfigValue::Str(s) if s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()) => Ok(()),
        ConfigValue::Str(_) => Err(ConfigInsertError::ValueInvalid),
        ConfigValue::Int(_) => Err(ConfigInsertError::ValueTypeInvalid),
    }
}

impl Key {
    pub fn descriptor(self) -> &'static KeyDescriptor {
        KEY_TABLE.iter().find(|d| d.key == self).expect("every Key variant has a descriptor")
    }

    pub fn section(self) -> &'static str {
        self.descriptor().section
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn validate(self, value: &ConfigValue) -> Result<(), ConfigInsertError> {
        (self.descriptor().validate)(value)
    }

    /// Look up a key by its `section:name` (or bare `name`, defaulting to
    /// `drcpd`) form, the way scenario 6 addresses
    /// `"drcpd:maximum_stream_bit_rate"`.
    pub fn from_qualified_name(qualified: &str) -> Option<Key> {
        let (section, name) = match qualified.split_once(':') {
            Some((section, name)) => (section, name),
            None => ("drcpd", qualified),
        };
        KEY_TABLE.iter().find(|d| d.section == section && d.name == name).map(|d| d.key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.section(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_qualified_and_bare_names() {
        assert_eq!(Key::from_qualified_name("drcpd:maximum_stream_bit_rate"), Some(Key::MaximumStreamBitRate));
        assert_eq!(Key::from_qualified_name("maximum_stream_bit_rate"), Some(Key::MaximumStreamBitRate));
        assert_eq!(Key::from_qualified_name("i18n:language_code"), Some(Key::LanguageCode));
        assert_eq!(Key::from_qualified_name("nonsense"), None);
    }

    #[test]
    fn bit_rate_accepts_unlimited_and_positive_integers_only() {
        assert_eq!(Key::MaximumStreamBitRate.validate(&ConfigValue::Str("unlimited".into())), Ok(()));
        assert_eq!(Key::MaximumStreamBitRate.validate(&ConfigValue::Int(256_000)), Ok(()));
        assert_eq!(Key::MaximumStreamBitRate.validate(&ConfigValue::Int(0)), Err(ConfigInsertError::ValueInvalid));
    }

    #[test]
    fn locale_code_rejects_wrong_type_distinctly_from_wrong_value() {
        assert_eq!(Key::LanguageCode.validate(&ConfigValue::Str("en".into())), Ok(()));
        assert_eq!(Key::LanguageCode.validate(&ConfigValue::Int(1)), Err(ConfigInsertError::ValueTypeInvalid));
        assert_eq!(Key::LanguageCode.validate(&ConfigValue::Str("eng".into())), Err(ConfigInsertError::ValueInvalid));
    }
}
