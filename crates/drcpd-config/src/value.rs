use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            ConfigValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(n) => Some(*n),
            ConfigValue::Str(_) => None,
        }
    }

    pub(crate) fn to_wire(&self) -> String {
        match self {
            ConfigValue::Str(s) => s.clone(),
            ConfigValue::Int(n) => n.to_string(),
        }
    }

    /// Parse a raw INI value against the shape of an existing value,
    /// preferring an integer reading when one parses cleanly.
    pub(crate) fn from_wire(raw: &str) -> ConfigValue {
        match raw.parse::<i64>() {
            Ok(n) => ConfigValue::Int(n),
            Err(_) => ConfigValue::Str(raw.to_string()),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Str(s) => write!(f, "{s}"),
            ConfigValue::Int(n) => write!(f, "{n}"),
        }
    }
}
