//! Parameter extraction from matched lines
//!
//! Extraction is best-effort: a bad pattern, a missing group or invalid JSON
//! produce fewer entries, never an error. The caller merges the result into
//! the variable store.

use serde_json::Value;

use super::matcher::compile;
use super::variables::{Variable, Variables};
use crate::model::{ParseConfig, ParseType};

/// Extract variables from `line` according to `config`
pub fn extract_parameters(line: &str, config: &ParseConfig) -> Variables {
    match config.parse_type {
        ParseType::Regex => extract_regex(line, config),
        ParseType::Split => extract_split(line, config),
        ParseType::Json => extract_json(line, config),
    }
}

/// Numeric keys, optionally written as `group2` / `index2`
fn key_index(key: &str) -> Option<usize> {
    let digits = key
        .strip_prefix("group")
        .or_else(|| key.strip_prefix("index"))
        .unwrap_or(key);
    digits.parse().ok()
}

fn extract_regex(line: &str, config: &ParseConfig) -> Variables {
    let mut out = Variables::new();
    let Some(re) = compile(&config.parse_pattern) else {
        return out;
    };
    let Some(caps) = re.captures(line) else {
        return out;
    };

    for (key, var_name) in &config.parameter_map {
        let group = match key_index(key) {
            Some(index) => caps.get(index),
            None => caps.name(key),
        };
        if let Some(m) = group {
            out.insert(var_name.clone(), Variable::now(m.as_str()));
        }
    }
    out
}

fn extract_split(line: &str, config: &ParseConfig) -> Variables {
    let mut out = Variables::new();
    if config.parse_pattern.is_empty() {
        return out;
    }
    let parts: Vec<&str> = line.split(config.parse_pattern.as_str()).collect();

    for (key, var_name) in &config.parameter_map {
        if let Some(part) = key_index(key).and_then(|i| parts.get(i)) {
            out.insert(var_name.clone(), Variable::now(part.trim()));
        }
    }
    out
}

/// Parse the line, or the first `{...}` object embedded in it
fn parse_json(line: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(line.trim()) {
        return Some(value);
    }
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&line[start..=end]).ok()
}

fn extract_json(line: &str, config: &ParseConfig) -> Variables {
    let mut out = Variables::new();
    let Some(root) = parse_json(line) else {
        return out;
    };

    for (key, var_name) in &config.parameter_map {
        let pointer = format!("/{}", key.replace('.', "/"));
        let value = match root.pointer(&pointer) {
            Some(Value::Null) | None => continue,
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        out.insert(var_name.clone(), Variable::now(value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(parse_type: ParseType, pattern: &str, map: &[(&str, &str)]) -> ParseConfig {
        ParseConfig {
            parse_type,
            parse_pattern: pattern.to_string(),
            parameter_map: map
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn values(vars: &Variables) -> BTreeMap<&str, &str> {
        vars.iter()
            .map(|(k, v)| (k.as_str(), v.value.as_str()))
            .collect()
    }

    #[test]
    fn test_creg_named_groups() {
        let cfg = config(
            ParseType::Regex,
            r#"+CREG: (?<stat>\d),"(?<lac>[^"]+)""#,
            &[("stat", "regStat"), ("lac", "lac")],
        );
        let vars = extract_parameters(r#"+CREG: 1,"1A2B","4D5E6F",7"#, &cfg);
        assert_eq!(
            values(&vars),
            BTreeMap::from([("regStat", "1"), ("lac", "1A2B")])
        );
    }

    #[test]
    fn test_numeric_groups_and_missing_groups() {
        let cfg = config(
            ParseType::Regex,
            r"\+CSQ: (\d+),(\d+)(,(\d+))?",
            &[("1", "rssi"), ("group2", "ber"), ("4", "extra"), ("nope", "x")],
        );
        let vars = extract_parameters("+CSQ: 23,99", &cfg);
        assert_eq!(values(&vars), BTreeMap::from([("rssi", "23"), ("ber", "99")]));
    }

    #[test]
    fn test_regex_without_match_is_empty() {
        let cfg = config(ParseType::Regex, r"\+CGATT: (\d)", &[("1", "attached")]);
        assert!(extract_parameters("+CSQ: 23,99", &cfg).is_empty());

        let bad = config(ParseType::Regex, "(", &[("1", "x")]);
        assert!(extract_parameters("anything", &bad).is_empty());
    }

    #[test]
    fn test_split_trims_and_skips_out_of_range() {
        let cfg = config(
            ParseType::Split,
            ",",
            &[("0", "head"), ("index2", "cell"), ("9", "missing")],
        );
        let vars = extract_parameters(r#"+CREG: 1, "1A2B" , "4D5E6F",7"#, &cfg);
        assert_eq!(
            values(&vars),
            BTreeMap::from([("head", "+CREG: 1"), ("cell", "\"4D5E6F\"")])
        );
    }

    #[test]
    fn test_json_embedded_object() {
        let cfg = config(
            ParseType::Json,
            "",
            &[("temp", "temperature"), ("meta.ids.1", "second"), ("none", "n")],
        );
        let vars = extract_parameters(
            r#"+MQTTRECV: 0,"dev/up",{"temp":21.5,"meta":{"ids":["a","b"]}}"#,
            &cfg,
        );
        assert_eq!(
            values(&vars),
            BTreeMap::from([("temperature", "21.5"), ("second", "b")])
        );
    }

    #[test]
    fn test_json_invalid_is_empty() {
        let cfg = config(ParseType::Json, "", &[("a", "a")]);
        assert!(extract_parameters("+URC: {not json}", &cfg).is_empty());
    }
}
