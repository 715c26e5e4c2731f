//! Shape normalization for upstream catalog responses.
//!
//! The catalog API has shipped at least four distinct JSON layouts over its
//! lifetime: flat lists, lists wrapped under `data`/`results`/`items`/`titles`,
//! lists of lists, and entries that wrap a release under a `release` key.
//! Everything here is a total function over `serde_json::Value`; malformed or
//! unexpected entries contribute nothing instead of raising.

use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const CANDIDATE_KEYS: &[&str] = &["data", "results", "items", "titles"];
const TITLE_KEYS: &[&str] = &["title", "name", "names"];
const ENCLOSURE_KEYS: &[&str] = &["url", "magnet", "link", "download"];
const FALLBACK_TITLE: &str = "Unknown title";

// Observed nesting tops out at 2-3 levels; the cap only guards against
// pathological payloads.
const MAX_NESTING: usize = 8;

/// One catalog entry (a title/series), reduced to the fields the feed
/// mapper consumes.
#[derive(Debug, Clone)]
pub struct ReleaseRecord {
    pub id: String,
    pub title: String,
    pub published_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub poster: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub site_url: Option<String>,
    pub episodes_total: Option<u64>,
    pub torrents: Vec<TorrentRecord>,
}

/// One downloadable artifact attached to a release.
#[derive(Debug, Clone)]
pub struct TorrentRecord {
    pub id: String,
    pub download: Option<String>,
    pub size_bytes: u64,
    pub seeders: Option<u32>,
    pub leechers: Option<u32>,
    pub quality: Option<String>,
    pub info_hash: Option<String>,
    pub updated_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

/// Reduces an arbitrarily shaped catalog payload to a flat sequence of
/// release records.
pub fn normalize_releases(payload: &Value) -> Vec<ReleaseRecord> {
    let mut maps = Vec::new();

    match payload {
        Value::Array(entries) => collect_release_entries(entries, &mut maps, 0),
        // A top-level object that is itself a release wins over the
        // wrapper interpretation, even when it carries list-typed fields
        // (inline torrents, episode lists).
        Value::Object(map) if looks_like_release(map) => maps.push(map),
        Value::Object(_) => {
            if let Some(list) = embedded_list(payload) {
                collect_release_entries(list, &mut maps, 0);
            } else {
                collect_release_entry(payload, &mut maps, 0);
            }
        }
        _ => {}
    }

    maps.into_iter()
        .filter_map(ReleaseRecord::from_map)
        .collect()
}

/// Reduces a torrents payload (list, wrapped list, or single object) to a
/// flat sequence of torrent records.
pub fn normalize_torrents(payload: &Value) -> Vec<TorrentRecord> {
    let mut maps = Vec::new();

    match payload {
        Value::Array(entries) => collect_torrent_entries(entries, &mut maps, 0),
        // Same precedence as releases: an object with its own id is a
        // single record, not a wrapper.
        Value::Object(map) if map.contains_key("id") => maps.push(map),
        Value::Object(map) => {
            if let Some(list) = embedded_list(payload) {
                collect_torrent_entries(list, &mut maps, 0);
            } else {
                maps.push(map);
            }
        }
        _ => {}
    }

    maps.into_iter()
        .filter_map(TorrentRecord::from_map)
        .collect()
}

/// Locates the list of candidate entries inside an object payload:
/// conventional wrapper keys first, then any list-typed value.
fn embedded_list(payload: &Value) -> Option<&Vec<Value>> {
    let map = payload.as_object()?;

    for key in CANDIDATE_KEYS {
        if let Some(Value::Array(list)) = map.get(*key) {
            return Some(list);
        }
    }

    map.values().find_map(Value::as_array)
}

fn collect_release_entries<'a>(
    entries: &'a [Value],
    out: &mut Vec<&'a Map<String, Value>>,
    depth: usize,
) {
    for entry in entries {
        collect_release_entry(entry, out, depth);
    }
}

fn collect_release_entry<'a>(
    entry: &'a Value,
    out: &mut Vec<&'a Map<String, Value>>,
    depth: usize,
) {
    if depth > MAX_NESTING {
        return;
    }

    match entry {
        Value::Array(inner) => collect_release_entries(inner, out, depth + 1),
        Value::Object(map) => {
            if looks_like_release(map) {
                out.push(map);
            } else if let Some(inner @ Value::Object(_)) = map.get("release") {
                collect_release_entry(inner, out, depth + 1);
            }
        }
        _ => {}
    }
}

fn collect_torrent_entries<'a>(
    entries: &'a [Value],
    out: &mut Vec<&'a Map<String, Value>>,
    depth: usize,
) {
    if depth > MAX_NESTING {
        return;
    }

    for entry in entries {
        match entry {
            Value::Array(inner) => collect_torrent_entries(inner, out, depth + 1),
            Value::Object(map) => out.push(map),
            _ => {}
        }
    }
}

/// A mapping is a release candidate when it carries both an identifier and
/// some title-like field. Descent stops here; anything below belongs to the
/// record itself.
fn looks_like_release(map: &Map<String, Value>) -> bool {
    map.contains_key("id") && TITLE_KEYS.iter().any(|key| map.contains_key(*key))
}

impl ReleaseRecord {
    fn from_map(map: &Map<String, Value>) -> Option<Self> {
        let id = text_value(map.get("id")?)?;

        let title = TITLE_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .map(resolve_title)
            .unwrap_or_else(|| FALLBACK_TITLE.to_string());

        Some(ReleaseRecord {
            id,
            title,
            published_at: first_timestamp(map, &["published_at", "published"]),
            updated_at: first_timestamp(map, &["updated_at", "updated", "fresh_at"]),
            poster: map.get("poster").and_then(resolve_poster),
            description: map.get("description").and_then(text_value),
            genre: first_text(map, &["genre", "type"]),
            site_url: map.get("site_url").and_then(text_value),
            episodes_total: first_integer(map, &["episodes_total", "episodes"])
                .filter(|count| *count > 0),
            torrents: map
                .get("torrents")
                .map(normalize_torrents)
                .unwrap_or_default(),
        })
    }
}

impl TorrentRecord {
    fn from_map(map: &Map<String, Value>) -> Option<Self> {
        let id = text_value(map.get("id")?)?;

        let download = ENCLOSURE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(text_value));

        Some(TorrentRecord {
            id,
            download,
            size_bytes: first_integer(map, &["size", "total_size"]).unwrap_or(0),
            seeders: first_count(map, &["seeders"]),
            leechers: first_count(map, &["leechers"]),
            quality: map.get("quality").and_then(resolve_quality),
            info_hash: first_text(map, &["info_hash", "hash"]),
            updated_at: first_timestamp(map, &["updated_at", "updated", "uploaded_timestamp"]),
            description: map.get("description").and_then(text_value),
        })
    }
}

/// Title fields are either plain strings or objects carrying language
/// variants. Preference: `english`, then `main`, then the first string
/// value, then the placeholder.
fn resolve_title(value: &Value) -> String {
    match value {
        Value::String(_) | Value::Number(_) => {
            text_value(value).unwrap_or_else(|| FALLBACK_TITLE.to_string())
        }
        Value::Object(map) => map
            .get("english")
            .and_then(text_value)
            .or_else(|| map.get("main").and_then(text_value))
            .or_else(|| map.values().find_map(text_value))
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
        _ => FALLBACK_TITLE.to_string(),
    }
}

/// Posters arrive as a direct URL string or an object with `src`/`preview`/
/// `thumbnail` variants.
fn resolve_poster(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => text_value(value),
        Value::Object(map) => ["src", "preview", "thumbnail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(text_value)),
        _ => None,
    }
}

/// Quality is a plain string or an object; the human-readable `description`
/// wins over a raw `value` code.
fn resolve_quality(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => text_value(value),
        Value::Object(map) => map
            .get("description")
            .and_then(text_value)
            .or_else(|| map.get("value").and_then(text_value)),
        _ => None,
    }
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| map.get(*key).and_then(text_value))
}

fn first_integer(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(integer_value))
}

fn first_count(map: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    first_integer(map, keys).map(|value| value.min(u64::from(u32::MAX)) as u32)
}

fn first_timestamp(map: &Map<String, Value>, keys: &[&str]) -> Option<OffsetDateTime> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(parse_timestamp_value))
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn integer_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timestamp_value(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => number
            .as_i64()
            .and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok()),
        _ => None,
    }
}

/// Accepts RFC 3339, a trailing `Z`, a space date/time separator, and bare
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC).
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(parsed);
    }

    let mut normalized = trimmed.replace(' ', "T");
    let has_offset = normalized
        .get(11..)
        .is_some_and(|tail| tail.contains('+') || tail.contains('-'));
    if !normalized.ends_with('Z') && !has_offset {
        normalized.push('Z');
    }

    OffsetDateTime::parse(&normalized, &Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn release(id: u64, name: &str) -> Value {
        json!({ "id": id, "name": { "main": name } })
    }

    #[test]
    fn flat_list_yields_one_record_per_entry() {
        let payload = json!([release(1, "A"), release(2, "B"), release(3, "C")]);
        let records = normalize_releases(&payload);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[0].title, "A");
    }

    #[test]
    fn nested_list_yields_same_records_as_flat_list() {
        let flat = json!([release(1, "A"), release(2, "B")]);
        let nested = json!([[release(1, "A"), release(2, "B")]]);
        let deeper = json!([[[release(1, "A")], [release(2, "B")]]]);

        let from_flat = normalize_releases(&flat);
        let from_nested = normalize_releases(&nested);
        let from_deeper = normalize_releases(&deeper);

        assert_eq!(from_flat.len(), 2);
        assert_eq!(from_nested.len(), 2);
        assert_eq!(from_deeper.len(), 2);
        assert_eq!(from_flat[0].id, from_nested[0].id);
        assert_eq!(from_flat[1].id, from_deeper[1].id);
    }

    #[test]
    fn wrapper_keys_are_checked_in_priority_order() {
        let payload = json!({
            "titles": [release(9, "Wrong")],
            "data": [release(1, "Right")],
        });
        let records = normalize_releases(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Right");
    }

    #[test]
    fn unconventional_wrapper_key_falls_back_to_first_list_value() {
        let payload = json!({ "page": 1, "entries": [release(4, "Found")] });
        let records = normalize_releases(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "4");
    }

    #[test]
    fn single_object_payload_is_a_one_element_sequence() {
        let payload = release(7, "Solo");
        let records = normalize_releases(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "7");
    }

    #[test]
    fn release_wrapper_objects_are_unwrapped() {
        let payload = json!([{ "release": release(5, "Wrapped") }]);
        let records = normalize_releases(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Wrapped");
    }

    #[test]
    fn non_release_entries_contribute_nothing() {
        let payload = json!([
            42,
            "stray",
            null,
            { "unrelated": true },
            { "id": 1 },
            { "name": "no id" },
            release(2, "Kept"),
        ]);
        let records = normalize_releases(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Kept");
    }

    #[test]
    fn title_prefers_english_then_main_then_first_value() {
        let english = json!({ "id": 1, "name": { "main": "M", "english": "E" } });
        let main = json!({ "id": 1, "name": { "main": "M", "alternative": "A" } });
        let first = json!({ "id": 1, "name": { "romaji": "R" } });
        let empty = json!({ "id": 1, "name": {} });

        assert_eq!(normalize_releases(&english)[0].title, "E");
        assert_eq!(normalize_releases(&main)[0].title, "M");
        assert_eq!(normalize_releases(&first)[0].title, "R");
        assert_eq!(normalize_releases(&empty)[0].title, "Unknown title");
    }

    #[test]
    fn plain_string_title_passes_through() {
        let payload = json!({ "id": 1, "title": "Plain" });
        assert_eq!(normalize_releases(&payload)[0].title, "Plain");
    }

    #[test]
    fn inline_torrents_are_extracted() {
        let payload = json!({
            "id": 1,
            "title": "Show",
            "torrents": [{ "id": 10, "url": "http://x/10.torrent", "size": 12345 }],
        });
        let records = normalize_releases(&payload);
        assert_eq!(records[0].torrents.len(), 1);
        let torrent = &records[0].torrents[0];
        assert_eq!(torrent.id, "10");
        assert_eq!(torrent.download.as_deref(), Some("http://x/10.torrent"));
        assert_eq!(torrent.size_bytes, 12345);
    }

    #[test]
    fn wrapped_torrent_list_is_unwrapped() {
        let payload = json!({ "list": [{ "id": 1, "url": "http://x/1" }] });
        let torrents = normalize_torrents(&payload);
        assert_eq!(torrents.len(), 1);
        assert_eq!(torrents[0].id, "1");
    }

    #[test]
    fn enclosure_source_follows_priority_order() {
        let magnet = json!({ "id": 1, "url": "", "magnet": "magnet:?xt=abc" });
        let link = json!({ "id": 1, "link": "http://x/l" });
        let download = json!({ "id": 1, "download": "http://x/d" });
        let none = json!({ "id": 1, "size": 5 });

        assert_eq!(
            normalize_torrents(&magnet)[0].download.as_deref(),
            Some("magnet:?xt=abc")
        );
        assert_eq!(normalize_torrents(&link)[0].download.as_deref(), Some("http://x/l"));
        assert_eq!(
            normalize_torrents(&download)[0].download.as_deref(),
            Some("http://x/d")
        );
        assert_eq!(normalize_torrents(&none)[0].download, None);
    }

    #[test]
    fn torrent_fields_use_fallback_keys() {
        let payload = json!({
            "id": 2,
            "url": "http://x/2",
            "hash": "cafebabe",
            "total_size": 999,
            "seeders": 5,
            "leechers": 3,
            "quality": { "value": "hd1080", "description": "BDRip 1080p" },
            "uploaded_timestamp": 1700000000,
        });
        let torrent = &normalize_torrents(&payload)[0];
        assert_eq!(torrent.info_hash.as_deref(), Some("cafebabe"));
        assert_eq!(torrent.size_bytes, 999);
        assert_eq!(torrent.seeders, Some(5));
        assert_eq!(torrent.leechers, Some(3));
        assert_eq!(torrent.quality.as_deref(), Some("BDRip 1080p"));
        assert_eq!(torrent.updated_at.map(|t| t.unix_timestamp()), Some(1700000000));
    }

    #[test]
    fn episodes_total_accepts_both_keys_and_rejects_zero() {
        let total = json!({ "id": 1, "title": "S", "episodes_total": 24 });
        let plain = json!({ "id": 1, "title": "S", "episodes": 12 });
        let zero = json!({ "id": 1, "title": "S", "episodes_total": 0 });

        assert_eq!(normalize_releases(&total)[0].episodes_total, Some(24));
        assert_eq!(normalize_releases(&plain)[0].episodes_total, Some(12));
        assert_eq!(normalize_releases(&zero)[0].episodes_total, None);
    }

    #[test]
    fn poster_variants_resolve() {
        let direct = json!({ "id": 1, "title": "S", "poster": "/storage/p.jpg" });
        let object = json!({ "id": 1, "title": "S", "poster": { "preview": "/p2.jpg" } });

        assert_eq!(
            normalize_releases(&direct)[0].poster.as_deref(),
            Some("/storage/p.jpg")
        );
        assert_eq!(
            normalize_releases(&object)[0].poster.as_deref(),
            Some("/p2.jpg")
        );
    }

    #[test]
    fn timestamp_parsing_accepts_loose_iso8601() {
        let zulu = parse_timestamp("2024-01-02T03:04:05Z").unwrap();
        let bare = parse_timestamp("2024-01-02T03:04:05").unwrap();
        let spaced = parse_timestamp("2024-01-02 03:04:05").unwrap();
        let offset = parse_timestamp("2024-01-02T06:04:05+03:00").unwrap();

        assert_eq!(zulu, bare);
        assert_eq!(zulu, spaced);
        assert_eq!(zulu.unix_timestamp(), offset.unix_timestamp());
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
