use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::normalize::{self, ReleaseRecord, TorrentRecord};

/// Client for the upstream release catalog. Endpoint paths are
/// configuration because the catalog's path layout has changed across API
/// revisions; `{id}` is substituted for the per-release endpoints.
///
/// Every public method swallows upstream failures (network, timeout,
/// non-2xx, bad JSON) and returns an empty result: the caller cannot and
/// should not distinguish "upstream down" from "zero matches".
#[derive(Debug, Clone)]
pub struct AnilibriaClient {
    http: Client,
    base_url: Url,
    search_path: String,
    latest_path: String,
    detail_path: String,
    torrents_path: String,
    query_param: String,
}

/// Optional upstream hints carried over from the torznab query.
#[derive(Debug, Clone, Default)]
pub struct SearchHints {
    pub category: Option<String>,
    pub season: Option<String>,
    pub episode: Option<String>,
}

impl AnilibriaClient {
    pub fn new(upstream: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(upstream.timeout)
            .user_agent(upstream.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url: upstream.base_url.clone(),
            search_path: upstream.search_path.clone(),
            latest_path: upstream.latest_path.clone(),
            detail_path: upstream.detail_path.clone(),
            torrents_path: upstream.torrents_path.clone(),
            query_param: upstream.query_param.clone(),
        })
    }

    pub async fn search_releases(
        &self,
        query: &str,
        limit: usize,
        hints: &SearchHints,
    ) -> Vec<ReleaseRecord> {
        match self.try_search(query, limit, hints).await {
            Ok(releases) => releases,
            Err(err) => {
                warn!(query, error = %err, "upstream search failed; returning empty result set");
                Vec::new()
            }
        }
    }

    pub async fn latest_releases(&self, limit: usize) -> Vec<ReleaseRecord> {
        match self.try_latest(limit).await {
            Ok(releases) => releases,
            Err(err) => {
                warn!(error = %err, "upstream latest listing failed; returning empty result set");
                Vec::new()
            }
        }
    }

    pub async fn fetch_torrents_for_release(&self, release_id: &str) -> Vec<TorrentRecord> {
        match self.try_torrents(release_id).await {
            Ok(torrents) => torrents,
            Err(err) => {
                warn!(release_id, error = %err, "upstream torrents fetch failed");
                Vec::new()
            }
        }
    }

    pub async fn fetch_release_detail(&self, release_id: &str) -> Option<ReleaseRecord> {
        match self.try_detail(release_id).await {
            Ok(release) => release,
            Err(err) => {
                warn!(release_id, error = %err, "upstream detail fetch failed");
                None
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        limit: usize,
        hints: &SearchHints,
    ) -> Result<Vec<ReleaseRecord>, AnilibriaError> {
        let mut url = self.endpoint(&self.search_path, None)?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(&self.query_param, query);
            pairs.append_pair("limit", &limit.to_string());
            if let Some(category) = &hints.category {
                pairs.append_pair("category", category);
            }
            if let Some(season) = &hints.season {
                pairs.append_pair("season", season);
            }
            if let Some(episode) = &hints.episode {
                pairs.append_pair("episode", episode);
            }
        }

        let payload = self.fetch_json(url).await?;
        let releases = normalize::normalize_releases(&payload);
        debug!(query, limit, matches = releases.len(), "upstream search response normalized");
        Ok(releases)
    }

    async fn try_latest(&self, limit: usize) -> Result<Vec<ReleaseRecord>, AnilibriaError> {
        let mut url = self.endpoint(&self.latest_path, None)?;

        {
            let mut pairs = url.query_pairs_mut();
            // When no dedicated latest endpoint is configured this is the
            // search endpoint queried with an empty string.
            if self.latest_path == self.search_path {
                pairs.append_pair(&self.query_param, "");
            }
            pairs.append_pair("limit", &limit.to_string());
        }

        let payload = self.fetch_json(url).await?;
        let releases = normalize::normalize_releases(&payload);
        debug!(limit, matches = releases.len(), "upstream latest response normalized");
        Ok(releases)
    }

    async fn try_torrents(&self, release_id: &str) -> Result<Vec<TorrentRecord>, AnilibriaError> {
        let url = self.endpoint(&self.torrents_path, Some(release_id))?;
        let payload = self.fetch_json(url).await?;
        let torrents = normalize::normalize_torrents(&payload);
        debug!(release_id, count = torrents.len(), "upstream torrents response normalized");
        Ok(torrents)
    }

    async fn try_detail(&self, release_id: &str) -> Result<Option<ReleaseRecord>, AnilibriaError> {
        let url = self.endpoint(&self.detail_path, Some(release_id))?;
        let payload = self.fetch_json(url).await?;
        Ok(normalize::normalize_releases(&payload).into_iter().next())
    }

    async fn fetch_json(&self, url: Url) -> Result<Value, AnilibriaError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    fn endpoint(&self, template: &str, id: Option<&str>) -> Result<Url, AnilibriaError> {
        let path = match id {
            Some(id) => template.replace("{id}", id),
            None => template.to_string(),
        };

        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

#[derive(Debug, Error)]
pub enum AnilibriaError {
    #[error("failed to build upstream request url")]
    Url(#[from] url::ParseError),
    #[error("HTTP error when querying the upstream catalog")]
    Http(#[from] reqwest::Error),
}
