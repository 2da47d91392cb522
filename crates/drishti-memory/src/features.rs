use std::collections::BTreeSet;

use serde_json::Value;

/// Planet attributes emitted as `<prefix>::<planet>::<value>` tokens.
const PLANET_TEXT_RULES: &[(&str, &str)] = &[
    ("sign", "sign"),
    ("dignity", "dignity"),
    ("nakshatra", "nak"),
];

/// Planet boolean flags emitted as `<prefix>::<planet>` tokens.
const PLANET_FLAG_RULES: &[(&str, &str)] = &[("isCombust", "combust"), ("retrograde", "retro")];

/// Build a normalized feature signature for a Lagna chart packet.
///
/// Tokens are lower-case, sorted, and deduplicated. The walk tolerates
/// missing keys and unexpected shapes: malformed input degrades to a partial
/// or empty set, never an error.
pub fn build_feature_set(chart: &Value) -> Vec<String> {
    let mut features: BTreeSet<String> = BTreeSet::new();
    let Some(root) = chart.as_object() else {
        return Vec::new();
    };

    if let Some(asc) = string_field(chart, &["ascendantSign", "ascendant_sign"]) {
        features.insert(format!("asc::{}", normalize(&asc)));
    }

    for planet in iter_entries(root.get("planets")) {
        let Some(name) = string_field(&planet, &["name", "planet"]) else {
            continue;
        };
        let name = normalize(&name);
        if name.is_empty() {
            continue;
        }
        if let Some(house) = scalar_field(&planet, "house") {
            features.insert(format!("house::{}::{}", name, normalize(&house)));
        }
        for &(key, prefix) in PLANET_TEXT_RULES {
            if let Some(value) = string_field(&planet, &[key]) {
                features.insert(format!("{}::{}::{}", prefix, name, normalize(&value)));
            }
        }
        for &(key, prefix) in PLANET_FLAG_RULES {
            if planet.get(key).and_then(Value::as_bool).unwrap_or(false) {
                features.insert(format!("{}::{}", prefix, name));
            }
        }
    }

    let yogas = root.get("yogas").or_else(|| root.get("yogaList"));
    if let Some(Value::Array(yogas)) = yogas {
        for yoga in yogas {
            let label = match yoga {
                Value::Object(map) => map
                    .get("name")
                    .or_else(|| map.get("code"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
            if let Some(label) = label {
                let label = normalize(&label);
                if !label.is_empty() {
                    features.insert(format!("yoga::{}", label));
                }
            }
        }
    }

    features.into_iter().collect()
}

/// Iterate planet entries whether the payload is an array or a name-keyed map.
fn iter_entries(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, details)| match details {
                Value::Object(inner) => {
                    let mut entry = inner.clone();
                    entry
                        .entry("name".to_string())
                        .or_insert_with(|| Value::String(name.clone()));
                    Value::Object(entry)
                }
                other => serde_json::json!({ "name": name, "value": other }),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = value.get(*key).and_then(Value::as_str) {
            if !s.trim().is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Render a scalar (string, number, bool) field as text; ignores containers.
fn scalar_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_chart_signature() {
        let chart = json!({
            "ascendantSign": "Aries",
            "planets": [
                {
                    "name": "Mars",
                    "house": 10,
                    "sign": "Capricorn",
                    "dignity": "Exalted",
                    "nakshatra": "Shravana",
                    "retrograde": false,
                    "isCombust": true
                },
                { "name": "Moon", "house": "4" }
            ],
            "yogas": [{ "name": "Gajakesari" }, "Raja Yoga"]
        });

        let features = build_feature_set(&chart);
        assert!(features.contains(&"asc::aries".to_string()));
        assert!(features.contains(&"house::mars::10".to_string()));
        assert!(features.contains(&"sign::mars::capricorn".to_string()));
        assert!(features.contains(&"dignity::mars::exalted".to_string()));
        assert!(features.contains(&"nak::mars::shravana".to_string()));
        assert!(features.contains(&"combust::mars".to_string()));
        assert!(!features.iter().any(|f| f.starts_with("retro::")));
        assert!(features.contains(&"house::moon::4".to_string()));
        assert!(features.contains(&"yoga::gajakesari".to_string()));
        assert!(features.contains(&"yoga::raja yoga".to_string()));
        // Sorted output
        let mut sorted = features.clone();
        sorted.sort();
        assert_eq!(features, sorted);
    }

    #[test]
    fn test_planets_as_map() {
        let chart = json!({
            "planets": {
                "Venus": { "house": 7, "sign": "Libra" }
            }
        });
        let features = build_feature_set(&chart);
        assert!(features.contains(&"house::venus::7".to_string()));
        assert!(features.contains(&"sign::venus::libra".to_string()));
    }

    #[test]
    fn test_malformed_input_degrades() {
        assert!(build_feature_set(&json!("not a chart")).is_empty());
        assert!(build_feature_set(&json!(null)).is_empty());
        assert!(build_feature_set(&json!({ "planets": 42 })).is_empty());

        // Nameless planets are skipped, the rest survives
        let chart = json!({
            "ascendantSign": "Leo",
            "planets": [{ "house": 3 }]
        });
        assert_eq!(build_feature_set(&chart), vec!["asc::leo".to_string()]);
    }
}
