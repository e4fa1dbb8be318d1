use std::collections::BTreeMap;

/// Minimal line-oriented INI reader/writer: `[section]` headers, `key =
/// value` pairs, `#`/`;` comment lines. No nesting, no quoting rules
/// beyond trimming whitespace around `=`.
pub type IniDocument = BTreeMap<String, BTreeMap<String, String>>;

pub fn parse(text: &str) -> IniDocument {
    let mut doc = IniDocument::new();
    let mut section = String::new();
    doc.entry(section.clone()).or_default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = stripped.trim().to_string();
            doc.entry(section.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            doc.entry(section.clone()).or_default().insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    doc
}

pub fn write(doc: &IniDocument) -> String {
    let mut out = String::new();
    for (section, entries) in doc {
        if section.is_empty() {
            continue;
        }
        out.push('[');
        out.push_str(section);
        out.push_str("]\n");
        for (key, value) in entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sections_and_comments() {
        let text = "; top comment\n[drcpd]\nmaximum_stream_bit_rate = unlimited\n\n[i18n]\nlanguage_code = en\n";
        let doc = parse(text);
        assert_eq!(doc.get("drcpd").unwrap().get("maximum_stream_bit_rate").unwrap(), "unlimited");
        assert_eq!(doc.get("i18n").unwrap().get("language_code").unwrap(), "en");

        let reparsed = parse(&write(&doc));
        assert_eq!(reparsed, doc);
    }
}
