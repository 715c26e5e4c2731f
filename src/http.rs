use std::borrow::Cow;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::anilibria::SearchHints;
use crate::feed;
use crate::normalize::ReleaseRecord;
use crate::torznab::{self, ChannelMetadata, TorznabItem};
use crate::{AppState, SharedAppState};

pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/torznab", get(torznab_handler))
        .route("/api", get(torznab_handler))
        .route("/capabilities", get(caps_handler))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct TorznabQuery {
    #[serde(rename = "t")]
    operation: Option<String>,
    #[serde(rename = "q")]
    query: Option<String>,
    cat: Option<String>,
    season: Option<String>,
    ep: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl TorznabQuery {
    fn operation(&self) -> TorznabOperation<'_> {
        match self.operation.as_deref().unwrap_or("caps") {
            "caps" => TorznabOperation::Caps,
            "search" | "tvsearch" | "tv-search" | "movie" | "movie-search" | "moviesearch"
            | "rss" => TorznabOperation::Search,
            "music" | "music-search" | "musicsearch" | "book" | "book-search" | "booksearch" => {
                TorznabOperation::Unavailable
            }
            other => TorznabOperation::Unrecognized(other),
        }
    }

    fn trimmed_query(&self) -> &str {
        self.query.as_deref().map(str::trim).unwrap_or("")
    }
}

enum TorznabOperation<'a> {
    Caps,
    Search,
    /// Recognized search family without coverage here (music, books):
    /// answered with an empty feed rather than an error.
    Unavailable,
    Unrecognized(&'a str),
}

async fn torznab_handler(
    State(state): State<SharedAppState>,
    Query(query): Query<TorznabQuery>,
) -> Result<Response, HttpError> {
    info!(
        operation = query.operation.as_deref().unwrap_or("caps"),
        q = query.query.as_deref(),
        cat = query.cat.as_deref(),
        limit = query.limit,
        offset = query.offset,
        "torznab request received"
    );

    match query.operation() {
        TorznabOperation::Caps => respond_caps(&state),
        TorznabOperation::Search => respond_search(&state, &query).await,
        TorznabOperation::Unavailable => {
            debug!("search mode unavailable; returning empty feed");
            respond_feed(&state, Vec::new())
        }
        TorznabOperation::Unrecognized(name) => {
            Err(HttpError::UnrecognizedOperation(name.to_string()))
        }
    }
}

async fn caps_handler(State(state): State<SharedAppState>) -> Result<Response, HttpError> {
    respond_caps(&state)
}

fn respond_caps(state: &AppState) -> Result<Response, HttpError> {
    let metadata = channel_metadata(state);
    let xml = torznab::render_caps(&metadata, state.config.default_limit, state.config.max_limit)?;
    Ok((
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        xml,
    )
        .into_response())
}

async fn respond_search(state: &AppState, query: &TorznabQuery) -> Result<Response, HttpError> {
    let limit = query
        .limit
        .unwrap_or(state.config.default_limit)
        .clamp(1, state.config.max_limit);
    let offset = query.offset.unwrap_or(0);
    let needle = query.trimmed_query();

    let releases = if needle.is_empty() {
        state.anilibria.latest_releases(limit).await
    } else {
        let hints = SearchHints {
            category: upstream_category_hint(&query.cat),
            season: query.season.clone(),
            episode: query.ep.clone(),
        };
        state.anilibria.search_releases(needle, limit, &hints).await
    };

    let wanted = offset.saturating_add(limit);
    let mut items: Vec<TorznabItem> = Vec::new();

    for release in &releases {
        if items.len() >= wanted {
            break;
        }
        collect_release_items(state, release, &mut items).await;
    }

    let mut items: Vec<TorznabItem> = items.into_iter().skip(offset).take(limit).collect();

    if needle.is_empty() && items.is_empty() && state.config.empty_query_probe {
        // Automation clients probe with an empty query and disable
        // indexers that answer with zero items.
        items.push(feed::probe_item(
            &state.config.application_title,
            &state.config.site_url,
        ));
    }

    debug!(
        matches = releases.len(),
        emitted = items.len(),
        offset,
        "prepared torznab feed items"
    );

    respond_feed(state, items)
}

/// Pairs a release with its torrents, fetching them when the catalog's
/// search response carried none inline: first the per-release torrents
/// endpoint, then the release detail as a fallback torrent source.
async fn collect_release_items(
    state: &AppState,
    release: &ReleaseRecord,
    items: &mut Vec<TorznabItem>,
) {
    let fetched;
    let torrents = if release.torrents.is_empty() {
        let mut torrents = state.anilibria.fetch_torrents_for_release(&release.id).await;
        if torrents.is_empty()
            && let Some(detail) = state.anilibria.fetch_release_detail(&release.id).await
        {
            torrents = detail.torrents;
        }
        fetched = torrents;
        &fetched
    } else {
        &release.torrents
    };

    for torrent in torrents {
        // Pairings without a resolvable enclosure are dropped silently.
        if let Some(item) = feed::map_to_item(release, torrent, &state.config.site_url) {
            items.push(item);
        }
    }
}

fn respond_feed(state: &AppState, items: Vec<TorznabItem>) -> Result<Response, HttpError> {
    let metadata = channel_metadata(state);
    let xml = torznab::render_feed(&metadata, &items)?;
    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response())
}

fn channel_metadata(state: &AppState) -> ChannelMetadata {
    ChannelMetadata {
        title: state.config.application_title.clone(),
        description: state.config.application_description.clone(),
        site_link: state.config.site_url.to_string(),
    }
}

/// Maps the first recognized torznab category id to its upstream label;
/// unrecognized values are passed through raw.
fn upstream_category_hint(cat_param: &Option<String>) -> Option<String> {
    let value = cat_param.as_deref()?.trim();
    if value.is_empty() {
        return None;
    }

    for part in value.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Ok(id) = trimmed.parse::<u32>()
            && let Some(category) = torznab::CATEGORIES.iter().find(|c| c.id == id)
        {
            return Some(category.upstream_hint.to_string());
        }
    }

    Some(value.to_string())
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("unrecognized torznab operation `{0}`")]
    UnrecognizedOperation(String),
    #[error(transparent)]
    Torznab(#[from] torznab::TorznabBuildError),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, Cow<'static, str>) = match &self {
            HttpError::UnrecognizedOperation(_) => {
                (StatusCode::BAD_REQUEST, Cow::from(self.to_string()))
            }
            HttpError::Torznab(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Cow::from("Failed to render torznab payload"),
            ),
        };

        tracing::error!("torznab handler error: {self}");

        (status, message).into_response()
    }
}
