//! Maps (release, torrent) pairs onto torznab feed items.
//!
//! The one rule that matters downstream: an item without a resolvable
//! enclosure URL is never emitted. Automation clients disable the whole
//! indexer over a single broken item, so dropping is strictly better.

use time::OffsetDateTime;
use url::Url;

use crate::normalize::{ReleaseRecord, TorrentRecord};
use crate::torznab::TorznabItem;

pub const GUID_PREFIX: &str = "anilibria-torrent-";

const UNKNOWN_QUALITY: &str = "unknown";

// Labels the upstream sticks into torrent descriptions that carry no
// episode information: movie/special/OVA markers and the word for
// "episode(s)".
const NOISE_TOKENS: &[&str] = &[
    "фильм",
    "спецвыпуск",
    "спешл",
    "ova",
    "ова",
    "ona",
    "она",
    "серия",
    "серии",
];

/// Builds one feed item from a release/torrent pairing, or `None` when the
/// torrent resolves no enclosure URL.
pub fn map_to_item(
    release: &ReleaseRecord,
    torrent: &TorrentRecord,
    site: &Url,
) -> Option<TorznabItem> {
    let enclosure_url = torrent
        .download
        .as_deref()
        .and_then(|raw| resolve_url(raw, site))?;

    let link = release
        .site_url
        .as_deref()
        .and_then(|raw| resolve_url(raw, site))
        .or_else(|| {
            site.join(&format!("releases/{}", release.id))
                .ok()
                .map(Into::into)
        })
        .unwrap_or_else(|| site.to_string());

    let published = torrent
        .updated_at
        .or(release.updated_at)
        .or(release.published_at)
        .unwrap_or_else(OffsetDateTime::now_utc);

    Some(TorznabItem {
        title: build_title(release, torrent),
        guid: format!("{GUID_PREFIX}{}", torrent.id),
        link,
        enclosure_url,
        published,
        size_bytes: torrent.size_bytes,
        description: release.description.clone().or_else(|| release.genre.clone()),
        poster: release
            .poster
            .as_deref()
            .and_then(|raw| resolve_url(raw, site)),
        info_hash: torrent.info_hash.clone(),
        seeders: torrent.seeders,
        leechers: torrent.leechers,
    })
}

/// Synthetic entry for empty-query probes when the upstream yields nothing.
/// Clients that probe with an empty query reject indexers returning zero
/// items, so the probe still carries a valid enclosure and publish date.
pub fn probe_item(application_title: &str, site: &Url) -> TorznabItem {
    let enclosure_url = site
        .join("probe.torrent")
        .map(Into::into)
        .unwrap_or_else(|_| site.to_string());

    TorznabItem {
        title: format!("{application_title} connectivity check"),
        guid: "anilibria-probe".to_string(),
        link: site.to_string(),
        enclosure_url,
        published: OffsetDateTime::now_utc(),
        size_bytes: 0,
        description: Some("Indexer reachable; no recent releases available".to_string()),
        poster: None,
        info_hash: None,
        seeders: None,
        leechers: None,
    }
}

/// Release title plus an episode label and a quality label.
fn build_title(release: &ReleaseRecord, torrent: &TorrentRecord) -> String {
    let mut title = release.title.clone();

    let label = torrent
        .description
        .as_deref()
        .map(clean_episode_label)
        .filter(|label| !label.is_empty())
        .or_else(|| release.episodes_total.map(|total| format!("1-{total}")));

    if let Some(label) = label {
        title.push_str(&episode_suffix(&label));
    }

    if let Some(quality) = torrent
        .quality
        .as_deref()
        .filter(|quality| !quality.eq_ignore_ascii_case(UNKNOWN_QUALITY))
    {
        title.push_str(&format!(" [{quality}]"));
    }

    title
}

/// Strips noise tokens word-by-word and trims stray separators.
fn clean_episode_label(raw: &str) -> String {
    let kept: Vec<&str> = raw
        .split_whitespace()
        .filter(|word| {
            let bare = word
                .trim_matches(is_separator)
                .to_lowercase();
            !bare.is_empty() && !NOISE_TOKENS.contains(&bare.as_str())
        })
        .collect();

    kept.join(" ")
        .trim_matches(is_separator)
        .to_string()
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            '-' | '–' | '—' | '+' | '.' | ':' | ';' | ',' | '(' | ')' | '[' | ']' | '«' | '»'
        )
}

/// Pure number → zero-padded episode marker; range → unbracketed pack
/// label; anything else → bracketed free text.
fn episode_suffix(label: &str) -> String {
    if let Ok(number) = label.parse::<u32>() {
        return format!(" - {number:02}");
    }

    if label.contains('-') || label.contains(',') {
        return format!(" {label}");
    }

    format!(" [{label}]")
}

fn resolve_url(raw: &str, site: &Url) -> Option<String> {
    if raw.starts_with('/') {
        return site.join(raw).ok().map(Into::into);
    }

    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_releases, normalize_torrents};
    use serde_json::json;

    fn site() -> Url {
        Url::parse("https://anilibria.top/").unwrap()
    }

    fn one_release(payload: serde_json::Value) -> ReleaseRecord {
        normalize_releases(&payload).into_iter().next().unwrap()
    }

    fn one_torrent(payload: serde_json::Value) -> TorrentRecord {
        normalize_torrents(&payload).into_iter().next().unwrap()
    }

    #[test]
    fn torrent_without_enclosure_source_maps_to_none() {
        let release = one_release(json!({ "id": 1, "title": "Show" }));
        let torrent = one_torrent(json!({ "id": 10, "size": 5 }));
        assert!(map_to_item(&release, &torrent, &site()).is_none());
    }

    #[test]
    fn inline_torrent_maps_to_full_item() {
        let release = one_release(json!({
            "id": 1,
            "name": { "main": "Test Show" },
            "torrents": [{ "id": 10, "url": "http://x/10.torrent", "size": 12345 }],
        }));
        let item = map_to_item(&release, &release.torrents[0], &site()).unwrap();

        assert_eq!(item.title, "Test Show");
        assert_eq!(item.guid, "anilibria-torrent-10");
        assert_eq!(item.enclosure_url, "http://x/10.torrent");
        assert_eq!(item.size_bytes, 12345);
        assert_eq!(item.link, "https://anilibria.top/releases/1");
    }

    #[test]
    fn numeric_label_renders_zero_padded() {
        let release = one_release(json!({ "id": 1, "title": "Show" }));
        let torrent = one_torrent(json!({ "id": 1, "url": "http://x/1", "description": "7" }));
        let item = map_to_item(&release, &torrent, &site()).unwrap();
        assert_eq!(item.title, "Show - 07");
    }

    #[test]
    fn range_label_renders_as_pack() {
        let release = one_release(json!({ "id": 1, "title": "Show" }));
        let torrent = one_torrent(json!({
            "id": 1,
            "url": "http://x/1",
            "description": "Серии 1-12",
        }));
        let item = map_to_item(&release, &torrent, &site()).unwrap();
        assert_eq!(item.title, "Show 1-12");
    }

    #[test]
    fn noise_only_label_falls_back_to_episodes_total() {
        let release = one_release(json!({ "id": 1, "title": "Show", "episodes_total": 24 }));
        let torrent = one_torrent(json!({
            "id": 1,
            "url": "http://x/1",
            "description": "Фильм + OVA",
        }));
        let item = map_to_item(&release, &torrent, &site()).unwrap();
        assert_eq!(item.title, "Show 1-24");
    }

    #[test]
    fn free_text_label_renders_bracketed() {
        let release = one_release(json!({ "id": 1, "title": "Show" }));
        let torrent = one_torrent(json!({
            "id": 1,
            "url": "http://x/1",
            "description": "полнометражка",
        }));
        let item = map_to_item(&release, &torrent, &site()).unwrap();
        assert_eq!(item.title, "Show [полнометражка]");
    }

    #[test]
    fn quality_label_is_appended_unless_unknown() {
        let release = one_release(json!({ "id": 1, "title": "Show" }));
        let quality = one_torrent(json!({
            "id": 1,
            "url": "http://x/1",
            "quality": { "description": "BDRip 1080p" },
        }));
        let unknown = one_torrent(json!({
            "id": 1,
            "url": "http://x/1",
            "quality": "Unknown",
        }));

        assert_eq!(
            map_to_item(&release, &quality, &site()).unwrap().title,
            "Show [BDRip 1080p]"
        );
        assert_eq!(map_to_item(&release, &unknown, &site()).unwrap().title, "Show");
    }

    #[test]
    fn root_relative_urls_resolve_against_site_origin() {
        let release = one_release(json!({
            "id": 1,
            "title": "Show",
            "poster": "/storage/posters/p.jpg",
        }));
        let torrent = one_torrent(json!({ "id": 1, "url": "/public/torrent/1.torrent" }));
        let item = map_to_item(&release, &torrent, &site()).unwrap();

        assert_eq!(
            item.enclosure_url,
            "https://anilibria.top/public/torrent/1.torrent"
        );
        assert_eq!(
            item.poster.as_deref(),
            Some("https://anilibria.top/storage/posters/p.jpg")
        );
    }

    #[test]
    fn publish_date_prefers_torrent_over_release() {
        let release = one_release(json!({
            "id": 1,
            "title": "Show",
            "published_at": "2023-01-01T00:00:00Z",
            "updated_at": "2023-06-01T00:00:00Z",
        }));
        let torrent = one_torrent(json!({
            "id": 1,
            "url": "http://x/1",
            "updated_at": "2024-02-03T04:05:06Z",
        }));
        let item = map_to_item(&release, &torrent, &site()).unwrap();
        assert_eq!(item.published.unix_timestamp(), 1706933106);

        let bare = one_torrent(json!({ "id": 1, "url": "http://x/1" }));
        let fallback = map_to_item(&release, &bare, &site()).unwrap();
        assert_eq!(
            fallback.published,
            crate::normalize::parse_timestamp("2023-06-01T00:00:00Z").unwrap()
        );
    }

    #[test]
    fn probe_item_carries_enclosure_and_date() {
        let item = probe_item("AniLibria Bridge", &site());
        assert!(!item.enclosure_url.is_empty());
        assert_eq!(item.enclosure_url, "https://anilibria.top/probe.torrent");
        assert!(item.title.contains("AniLibria Bridge"));
    }
}
