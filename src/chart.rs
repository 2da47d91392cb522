//! Chart payload preparation: birth-data discovery, summarisation of the
//! Lagna and D10 trees, focus-hint extraction, and Dasha period selection.
//!
//! Chart payloads arrive as arbitrarily nested JSON from upstream
//! calculators; every walk here tolerates missing or oddly-shaped fields.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

const BIRTH_KEYS: &[&str] = &[
    "birth_datetime",
    "birth_datetime_utc",
    "birthdate",
    "birth_date",
    "dob",
    "date_of_birth",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%d-%m-%Y %H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d"];

/// Best-effort datetime parsing across the formats seen in case payloads.
pub fn try_parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Depth-first search for a parseable birth datetime under any known key.
pub fn find_birth_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if BIRTH_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                    if let Some(raw) = val.as_str() {
                        if let Some(parsed) = try_parse_datetime(raw) {
                            return Some(parsed);
                        }
                    }
                }
                if let Some(found) = find_birth_datetime(val) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_birth_datetime),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubjectContext {
    pub birth_datetime: Option<NaiveDateTime>,
    pub age_years: Option<f64>,
    pub birth_year: Option<i32>,
}

/// Derive subject age from whatever birth field the metadata carries.
pub fn subject_context(meta: &Value, now: DateTime<Utc>) -> SubjectContext {
    let Some(birth) = find_birth_datetime(meta) else {
        return SubjectContext::default();
    };
    let age_days = (now.naive_utc() - birth).num_days() as f64;
    SubjectContext {
        birth_datetime: Some(birth),
        age_years: Some((age_days / 365.25 * 100.0).round() / 100.0),
        birth_year: Some(birth.year()),
    }
}

fn format_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Locate an explicit Lagna summary configuration in context/meta sources,
/// also checking each source's `options` block.
pub fn pick_lagna_summary_config<'a>(sources: &[&'a Value]) -> Option<&'a Value> {
    const KEYS: &[&str] = &["lagna_summary", "lagnaSummary"];
    for source in sources {
        let Value::Object(map) = source else {
            continue;
        };
        for key in KEYS {
            if let Some(found) = map.get(*key) {
                return Some(found);
            }
        }
        if let Some(Value::Object(options)) = map.get("options") {
            for key in KEYS {
                if let Some(found) = options.get(*key) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Resolve the Lagna summary text: explicit override, embedded summary, or
/// structural summarisation, in that order.
pub fn resolve_lagna_summary(lagna: &Value, config: Option<&Value>) -> String {
    let mut enabled = true;
    let mut explicit: Option<&Value> = None;

    match config {
        Some(Value::Bool(flag)) => enabled = *flag,
        Some(Value::String(_)) => explicit = config,
        Some(Value::Object(map)) => {
            if let Some(flag) = map.get("enabled").and_then(Value::as_bool) {
                enabled = flag;
            }
            if let Some(flag) = map.get("disabled").and_then(Value::as_bool) {
                enabled = !flag;
            }
            for key in ["summary", "text", "content", "override"] {
                if let Some(value) = map.get(key).filter(|v| !v.is_null()) {
                    explicit = Some(value);
                    break;
                }
            }
        }
        _ => {}
    }

    if let Some(value) = explicit {
        return format_payload(value);
    }

    if !enabled {
        if let Value::Object(map) = lagna {
            for key in ["summary", "text", "content", "rawSummary"] {
                if let Some(value) = map.get(key).filter(|v| !v.is_null()) {
                    return format_payload(value);
                }
            }
        }
        return format_payload(lagna);
    }

    if let Value::Object(map) = lagna {
        for key in ["summary", "aiSummary", "summaryText", "textSummary"] {
            if let Some(text) = map.get(key).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
    }

    summarize_lagna(lagna)
}

fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Iterate array entries, or a name-keyed map with the key folded in as
/// `name`.
fn iter_entries(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(name, details)| {
                let mut entry = match details {
                    Value::Object(inner) => inner.clone(),
                    other => {
                        let mut single = serde_json::Map::new();
                        single.insert("value".to_string(), other.clone());
                        single
                    }
                };
                entry
                    .entry("name".to_string())
                    .or_insert_with(|| Value::String(name.clone()));
                Value::Object(entry)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn ascendant_sign(chart: &Value) -> Option<String> {
    chart
        .get("ascendantSign")
        .or_else(|| chart.get("ascendant_sign"))
        .and_then(string_of)
        .or_else(|| {
            let ascendant = chart.get("ascendant")?;
            ascendant
                .get("sign")
                .or_else(|| ascendant.get("name"))
                .and_then(string_of)
        })
}

/// Condense a structural Lagna tree into the bullet summary the analysis
/// prompts consume.
pub fn summarize_lagna(lagna: &Value) -> String {
    if let Value::String(s) = lagna {
        return s.clone();
    }
    if !lagna.is_object() {
        return format_payload(lagna);
    }

    let mut houses = Vec::new();
    for house in iter_entries(lagna.get("houses").unwrap_or(&Value::Null)) {
        // House items are usually plain strings, occasionally objects.
        let items: Vec<String> = iter_entries(house.get("items").unwrap_or(&Value::Null))
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => map
                    .get("name")
                    .and_then(string_of)
                    .or_else(|| map.get("value").and_then(string_of)),
                other => string_of(other),
            })
            .collect();
        if items.is_empty() {
            continue;
        }
        let index = house
            .get("index")
            .or_else(|| house.get("number"))
            .or_else(|| house.get("house"))
            .and_then(string_of);
        let label = match index {
            Some(n) => format!("House {}", n),
            None => "House".to_string(),
        };
        let mut summary = format!("{}: {}", label, items.join(", "));
        if let Some(sign_number) = house
            .get("signNumber")
            .or_else(|| house.get("sign_number"))
            .and_then(string_of)
        {
            summary.push_str(&format!(" (sign #{})", sign_number));
        }
        houses.push(summary);
    }

    let mut planets = Vec::new();
    for planet in iter_entries(lagna.get("planets").unwrap_or(&Value::Null)) {
        let Some(name) = planet
            .get("name")
            .or_else(|| planet.get("planet"))
            .and_then(string_of)
        else {
            continue;
        };
        let mut parts = Vec::new();
        if let Some(degree) = planet
            .get("longitudeDMS")
            .or_else(|| planet.get("longitude_dms"))
            .and_then(string_of)
        {
            parts.push(format!("deg={}", degree));
        }
        for (key, label) in [("house", "house"), ("sign", "sign"), ("dignity", "dignity"), ("nakshatra", "nakshatra")] {
            if let Some(value) = planet.get(key).and_then(string_of) {
                parts.push(format!("{}={}", label, value));
            }
        }
        if let Some(pada) = planet.get("nakshatraPada").and_then(string_of) {
            parts.push(format!("p{}", pada));
        }
        let karaka = planet
            .get("charaKaraka")
            .or_else(|| planet.get("karaka"))
            .and_then(string_of);
        if let Some(karaka) = &karaka {
            parts.push(format!("karaka={}", karaka));
        }
        if let Some(notes) = planet.get("notes").and_then(string_of) {
            if Some(&notes) != karaka.as_ref() {
                parts.push(notes);
            }
        }
        if planet.get("isCombust").and_then(Value::as_bool) == Some(true) {
            parts.push("CMB".to_string());
        }
        if planet.get("retrograde").and_then(Value::as_bool) == Some(true) {
            parts.push("R".to_string());
        }
        planets.push(format!("{} {}", name, parts.join(" ")).trim_end().to_string());
    }

    let mut lines = vec![match ascendant_sign(lagna) {
        Some(sign) => format!("Ascendant: {}", sign),
        None => "Ascendant: -".to_string(),
    }];
    if !houses.is_empty() {
        lines.push(format!("Key house occupancies:\n- {}", houses.join("\n- ")));
    }
    if !planets.is_empty() {
        lines.push(format!("Planets:\n- {}", planets.join("\n- ")));
    }
    lines.join("\n")
}

/// Highlight summary of the D10 (career) divisional chart.
pub fn summarize_d10(d10: &Value) -> String {
    let asc = ascendant_sign(d10).unwrap_or_else(|| "-".to_string());
    let mut highlights = vec![format!("D10 Ascendant: {}", asc)];
    for planet in iter_entries(d10.get("planets").unwrap_or(&Value::Null)) {
        let field = |key: &str| {
            planet
                .get(key)
                .and_then(string_of)
                .unwrap_or_else(|| "-".to_string())
        };
        let karaka = planet
            .get("charaKaraka")
            .and_then(string_of)
            .unwrap_or_else(|| "-".to_string());
        highlights.push(format!(
            "{} deg={} house={} sign={} dignity={} nakshatra={} p{} karaka={}",
            field("name"),
            field("longitudeDMS"),
            field("house"),
            field("sign"),
            field("dignity"),
            field("nakshatra"),
            field("nakshatraPada"),
            karaka,
        ));
    }
    highlights.join("\n")
}

/// Time-frame hints extracted from the user's question.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FocusHints {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub years: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<(i32, i32)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ages: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_years: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ages_to_years: Vec<i32>,
}

impl FocusHints {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
            && self.year_range.is_none()
            && self.ages.is_empty()
            && self.next_years.is_none()
            && self.ages_to_years.is_empty()
    }

    /// Convert age hints into calendar years once the birth year is known.
    pub fn apply_birth_year(&mut self, birth_year: Option<i32>) {
        if let Some(birth_year) = birth_year {
            let mut years: Vec<i32> = self.ages.iter().map(|&age| birth_year + age as i32).collect();
            years.sort_unstable();
            years.dedup();
            self.ages_to_years = years;
        }
    }
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:19|20)\d{2}").unwrap())
}

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"((?:19|20)\d{2})\s*[-to]+\s*((?:19|20)\d{2})").unwrap())
}

fn age_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:age|aged|at)\s*(\d{1,3})").unwrap())
}

fn next_years_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)next\s*(\d+)\s*years").unwrap())
}

/// Scan the question for explicit years, ranges, ages and "next N years".
pub fn extract_focus(question: &str) -> FocusHints {
    let mut focus = FocusHints::default();

    let mut years: Vec<i32> = year_regex()
        .find_iter(question)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    years.sort_unstable();
    years.dedup();
    focus.years = years;

    if let Some(captures) = range_regex().captures(question) {
        let bounds: Option<(i32, i32)> = captures
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .zip(captures.get(2).and_then(|m| m.as_str().parse().ok()));
        if let Some((a, b)) = bounds {
            focus.year_range = Some((a.min(b), a.max(b)));
        }
    }

    let mut ages: Vec<u32> = age_regex()
        .captures_iter(question)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    ages.sort_unstable();
    ages.dedup();
    focus.ages = ages;

    focus.next_years = next_years_regex()
        .captures(question)
        .and_then(|c| c.get(1)?.as_str().parse().ok());

    focus
}

#[derive(Debug, Clone)]
pub struct DashaPeriod {
    pub start: NaiveDateTime,
    pub dasha_lord: Option<String>,
    pub bhukti_lord: Option<String>,
    pub notes: Option<String>,
}

const FALLBACK_PERIOD_COUNT: usize = 10;

/// Pick the timeline periods relevant to the question's focus; with no
/// focused match, fall back to the current and upcoming periods.
pub fn select_dasha_periods(dasha: &Value, focus: &FocusHints, now: NaiveDateTime) -> Vec<DashaPeriod> {
    let mut periods = Vec::new();
    for entry in iter_entries(dasha.get("periods").unwrap_or(&Value::Null)) {
        let Some(start) = entry
            .get("start")
            .and_then(Value::as_str)
            .and_then(try_parse_datetime)
        else {
            continue;
        };
        periods.push(DashaPeriod {
            start,
            dasha_lord: entry
                .get("dhasaLord")
                .or_else(|| entry.get("mahadasaLord"))
                .and_then(string_of),
            bhukti_lord: entry.get("bhuktiLord").and_then(string_of),
            notes: entry.get("notes").and_then(string_of),
        });
    }
    if periods.is_empty() {
        return Vec::new();
    }

    let mut target_years: Vec<i32> = focus.years.clone();
    if let Some((start, end)) = focus.year_range {
        target_years.extend(start..=end);
    }
    target_years.extend(&focus.ages_to_years);
    if let Some(span) = focus.next_years {
        target_years.extend((0..=span as i32).map(|offset| now.year() + offset));
    }
    target_years.sort_unstable();
    target_years.dedup();

    let selected: Vec<DashaPeriod> = if target_years.is_empty() {
        Vec::new()
    } else {
        periods
            .iter()
            .filter(|p| target_years.binary_search(&p.start.year()).is_ok())
            .cloned()
            .collect()
    };
    if !selected.is_empty() {
        return selected;
    }

    let upcoming: Vec<DashaPeriod> = periods.iter().filter(|p| p.start >= now).cloned().collect();
    let pool = if upcoming.is_empty() { periods } else { upcoming };
    pool.into_iter().take(FALLBACK_PERIOD_COUNT).collect()
}

pub fn format_period_list(periods: &[DashaPeriod]) -> String {
    periods
        .iter()
        .map(|entry| {
            format!(
                "- Start: {} | Mahadasha: {} | Antar: {}",
                entry.start.format("%Y-%m-%d %H:%M"),
                entry.dasha_lord.as_deref().unwrap_or("--"),
                entry.bhukti_lord.as_deref().unwrap_or("--"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_datetime_formats() {
        assert!(try_parse_datetime("1990-04-12T05:30:00Z").is_some());
        assert!(try_parse_datetime("1990-04-12 05:30:00").is_some());
        assert!(try_parse_datetime("12-04-1990").is_some());
        assert!(try_parse_datetime("1990/04/12").is_some());
        assert!(try_parse_datetime("not a date").is_none());
        assert!(try_parse_datetime("  ").is_none());
    }

    #[test]
    fn test_find_birth_datetime_nested() {
        let meta = json!({
            "subject": {"profile": {"dob": "1990-04-12"}},
            "other": [1, 2]
        });
        let found = find_birth_datetime(&meta).unwrap();
        assert_eq!(found.year(), 1990);
        assert!(find_birth_datetime(&json!({"name": "x"})).is_none());
    }

    #[test]
    fn test_subject_context_age() {
        let meta = json!({"birth_datetime": "2000-01-01T00:00:00Z"});
        let now = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let context = subject_context(&meta, now);
        assert_eq!(context.birth_year, Some(2000));
        let age = context.age_years.unwrap();
        assert!((age - 25.0).abs() < 0.1);
    }

    #[test]
    fn test_summarize_lagna_structural() {
        let lagna = json!({
            "ascendantSign": "Aries",
            "houses": [
                {"index": 10, "items": ["Mars", "Sun"], "signNumber": 10},
                {"index": 4, "items": []}
            ],
            "planets": [
                {"name": "Mars", "house": 10, "sign": "Capricorn", "dignity": "Exalted", "retrograde": true},
                {"name": "Sun", "isCombust": true}
            ]
        });
        let summary = summarize_lagna(&lagna);
        assert!(summary.starts_with("Ascendant: Aries"));
        assert!(summary.contains("House 10: Mars, Sun (sign #10)"));
        assert!(!summary.contains("House 4"));
        assert!(summary.contains("Mars house=10 sign=Capricorn dignity=Exalted R"));
        assert!(summary.contains("Sun CMB"));
    }

    #[test]
    fn test_resolve_lagna_summary_precedence() {
        let lagna = json!({"ascendantSign": "Leo", "aiSummary": "embedded summary"});

        let explicit = json!({"summary": "explicit override"});
        assert_eq!(
            resolve_lagna_summary(&lagna, Some(&explicit)),
            "explicit override"
        );

        assert_eq!(resolve_lagna_summary(&lagna, None), "embedded summary");

        let plain = json!({"ascendantSign": "Leo"});
        assert!(resolve_lagna_summary(&plain, None).starts_with("Ascendant: Leo"));
    }

    #[test]
    fn test_pick_lagna_summary_config_checks_options() {
        let context = json!({"options": {"lagna_summary": false}});
        let meta = json!({"lagnaSummary": "from meta"});
        let picked = pick_lagna_summary_config(&[&context, &meta]).unwrap();
        assert_eq!(picked, &json!(false));
    }

    #[test]
    fn test_extract_focus_hints() {
        let focus = extract_focus("how is career from 2024 to 2026, at age 30, next 2 years?");
        assert_eq!(focus.years, vec![2024, 2026]);
        assert_eq!(focus.year_range, Some((2024, 2026)));
        assert_eq!(focus.ages, vec![30]);
        assert_eq!(focus.next_years, Some(2));

        assert!(extract_focus("tell me about my marriage").is_empty());
    }

    #[test]
    fn test_ages_to_years() {
        let mut focus = extract_focus("what happened at age 25 and at age 30");
        focus.apply_birth_year(Some(1990));
        assert_eq!(focus.ages_to_years, vec![2015, 2020]);
    }

    fn sample_dasha() -> Value {
        json!({
            "periods": [
                {"start": "2015-06-01", "dhasaLord": "Venus", "bhuktiLord": "Sun"},
                {"start": "2024-02-10", "dhasaLord": "Venus", "bhuktiLord": "Moon"},
                {"start": "2026-09-01", "mahadasaLord": "Sun"},
                {"start": "garbage"}
            ]
        })
    }

    #[test]
    fn test_select_periods_by_focus_year() {
        let focus = extract_focus("career in 2024");
        let now = try_parse_datetime("2025-01-01 00:00:00").unwrap();
        let selected = select_dasha_periods(&sample_dasha(), &focus, now);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].bhukti_lord.as_deref(), Some("Moon"));
    }

    #[test]
    fn test_select_periods_fallback_upcoming() {
        let focus = FocusHints::default();
        let now = try_parse_datetime("2025-01-01 00:00:00").unwrap();
        let selected = select_dasha_periods(&sample_dasha(), &focus, now);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].start.year(), 2026);
    }

    #[test]
    fn test_format_period_list() {
        let focus = extract_focus("2015");
        let now = try_parse_datetime("2025-01-01 00:00:00").unwrap();
        let selected = select_dasha_periods(&sample_dasha(), &focus, now);
        let listing = format_period_list(&selected);
        assert_eq!(listing, "- Start: 2015-06-01 00:00 | Mahadasha: Venus | Antar: Sun");
    }
}
