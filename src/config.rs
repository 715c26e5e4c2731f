use std::{env, net::SocketAddr, time::Duration};

use anyhow::{Context, Result, ensure};
use reqwest::Url;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub upstream: UpstreamConfig,
    pub site_url: Url,
    pub application_title: String,
    pub application_description: String,
    pub default_limit: usize,
    pub max_limit: usize,
    pub empty_query_probe: bool,
}

/// Upstream endpoint layout. Paths are configuration rather than constants
/// because the catalog API has moved them between revisions.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub base_url: Url,
    pub search_path: String,
    pub latest_path: String,
    pub detail_path: String,
    pub torrents_path: String,
    pub query_param: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("ANILIBRARR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("ANILIBRARR_PORT").unwrap_or_else(|_| "8020".to_string());
        let port = port
            .parse::<u16>()
            .context("ANILIBRARR_PORT must be a valid u16 integer")?;
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .context("failed to parse socket address from ANILIBRARR_HOST and ANILIBRARR_PORT")?;

        let raw_base_url = env::var("ANILIBRARR_BASE_URL")
            .unwrap_or_else(|_| "https://anilibria.top/api/".to_string());
        let base_url = parse_root_url(&raw_base_url, "ANILIBRARR_BASE_URL")?;

        let raw_site_url = env::var("ANILIBRARR_SITE_URL")
            .unwrap_or_else(|_| "https://anilibria.top/".to_string());
        let site_url = parse_root_url(&raw_site_url, "ANILIBRARR_SITE_URL")?;

        let search_path = env::var("ANILIBRARR_SEARCH_PATH")
            .unwrap_or_else(|_| "v1/titles".to_string());
        let latest_path =
            env::var("ANILIBRARR_LATEST_PATH").unwrap_or_else(|_| search_path.clone());
        let detail_path = env::var("ANILIBRARR_DETAIL_PATH")
            .unwrap_or_else(|_| "v1/titles/{id}".to_string());
        let torrents_path = env::var("ANILIBRARR_TORRENTS_PATH")
            .unwrap_or_else(|_| "v1/titles/{id}/torrents".to_string());

        ensure!(
            detail_path.contains("{id}"),
            "ANILIBRARR_DETAIL_PATH must contain an {{id}} placeholder"
        );
        ensure!(
            torrents_path.contains("{id}"),
            "ANILIBRARR_TORRENTS_PATH must contain an {{id}} placeholder"
        );

        let query_param =
            env::var("ANILIBRARR_QUERY_PARAM").unwrap_or_else(|_| "query".to_string());

        let user_agent = env::var("ANILIBRARR_USER_AGENT")
            .unwrap_or_else(|_| format!("anilibrarr/{}", env!("CARGO_PKG_VERSION")));

        let timeout_secs = env::var("ANILIBRARR_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(15);
        let timeout = Duration::from_secs(timeout_secs);

        let application_title =
            env::var("ANILIBRARR_TITLE").unwrap_or_else(|_| "AniLibria Bridge".to_string());
        let application_description = env::var("ANILIBRARR_DESCRIPTION")
            .unwrap_or_else(|_| "Torznab bridge for the AniLibria catalog".to_string());

        let max_limit = env::var("ANILIBRARR_MAX_LIMIT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(100);

        let default_limit = env::var("ANILIBRARR_DEFAULT_LIMIT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(50)
            .min(max_limit);

        let empty_query_probe = env::var("ANILIBRARR_EMPTY_QUERY_PROBE")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);

        Ok(Self {
            listen_addr,
            upstream: UpstreamConfig {
                base_url,
                search_path,
                latest_path,
                detail_path,
                torrents_path,
                query_param,
                user_agent,
                timeout,
            },
            site_url,
            application_title,
            application_description,
            default_limit,
            max_limit,
            empty_query_probe,
        })
    }
}

fn parse_root_url(value: &str, label: &str) -> Result<Url> {
    let mut normalized = value.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).with_context(|| format!("{label} must be a valid URL"))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
