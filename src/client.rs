//! Client for the public Clash of Clans API.
//!
//! Every call is a single GET with a 10 second timeout. Failures come back as [`ApiError`]
//! values and are never retried here; callers decide whether to try again later.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Legend League, the only league with a season history.
const LEGEND_LEAGUE_ID: &str = "29000022";

const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited (remaining: {remaining:?}, reset: {reset:?})")]
    RateLimited {
        remaining: Option<u64>,
        reset: Option<String>,
    },

    #[error("request failed: {0}")]
    RequestFailed(#[from] RequestFailure),
}

#[derive(Debug, Error)]
pub enum RequestFailure {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("cannot build request URL from {0}")]
    Url(String),
}

/// Quota information from the most recent response that carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub reset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exp_level: u32,
    #[serde(default)]
    pub town_hall_level: Option<u32>,
    #[serde(default)]
    pub trophies: u32,
    #[serde(default)]
    pub clan: Option<PlayerClan>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub troops: Vec<Unit>,
    #[serde(default)]
    pub heroes: Vec<Unit>,
    #[serde(default)]
    pub spells: Vec<Unit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerClan {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub clan_level: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub name: String,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub target: i64,
}

/// A troop, hero or spell.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub max_level: u32,
    #[serde(default)]
    pub village: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clan {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub clan_level: u32,
    #[serde(default)]
    pub members: u32,
    #[serde(default)]
    pub clan_points: u32,
    #[serde(default)]
    pub war_frequency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMember {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub exp_level: u32,
    #[serde(default)]
    pub trophies: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub is_country: bool,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueSeason {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

/// Filters for `GET /clans`. Unset fields are left out of the query string.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanSearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub war_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_members: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_members: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_clan_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_clan_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Default for ClanSearch {
    fn default() -> Self {
        Self {
            name: None,
            war_frequency: None,
            min_members: None,
            max_members: None,
            min_clan_points: None,
            min_clan_level: None,
            limit: Some(20),
        }
    }
}

/// Prefix `#` unless the tag already has it.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    if tag.starts_with('#') {
        tag.to_string()
    } else {
        format!("#{tag}")
    }
}

/// Account lookups the invitation loop depends on.
#[allow(async_fn_in_trait)]
pub trait AccountSource {
    async fn fetch_account(&self, tag: &str) -> Result<Player, ApiError>;
}

pub struct ClashClient {
    http: reqwest::Client,
    base_url: Url,
    rate_limit: Mutex<RateLimitState>,
}

impl ClashClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context(format!("invalid API base URL {base_url}"))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("API token contains characters not allowed in a header")?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            rate_limit: Mutex::new(RateLimitState::default()),
        })
    }

    pub async fn fetch_account(&self, tag: &str) -> Result<Player, ApiError> {
        let tag = normalize_tag(tag);
        self.send(self.http.get(self.url(&["players", tag.as_str()])?)).await
    }

    pub async fn fetch_clan(&self, tag: &str) -> Result<Clan, ApiError> {
        let tag = normalize_tag(tag);
        self.send(self.http.get(self.url(&["clans", tag.as_str()])?)).await
    }

    pub async fn fetch_clan_members(&self, tag: &str) -> Result<Vec<ClanMember>, ApiError> {
        let tag = normalize_tag(tag);
        let page: Items<ClanMember> = self
            .send(self.http.get(self.url(&["clans", tag.as_str(), "members"])?))
            .await?;
        Ok(page.items)
    }

    pub async fn search_clans(&self, criteria: &ClanSearch) -> Result<Vec<Clan>, ApiError> {
        let request = self.http.get(self.url(&["clans"])?).query(criteria);
        let page: Items<Clan> = self.send(request).await?;
        Ok(page.items)
    }

    pub async fn locations(&self) -> Result<Vec<Location>, ApiError> {
        let page: Items<Location> = self.send(self.http.get(self.url(&["locations"])?)).await?;
        Ok(page.items)
    }

    pub async fn league_seasons(&self) -> Result<Vec<LeagueSeason>, ApiError> {
        let url = self.url(&["leagues", LEGEND_LEAGUE_ID, "seasons"])?;
        let page: Items<LeagueSeason> = self.send(self.http.get(url)).await?;
        Ok(page.items)
    }

    /// Liveness probe against the cheapest endpoint.
    pub async fn test_connectivity(&self) -> bool {
        match self.locations().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("API connectivity check failed: {e}");
                false
            }
        }
    }

    pub fn rate_limit(&self) -> RateLimitState {
        self.rate_limit
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    /// Append path segments to the base URL. Segments are percent-encoded, so a leading
    /// `#` in a tag becomes `%23`.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RequestFailure::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| {
            let failure = transport_failure(&e);
            tracing::warn!("API request failed: {failure}");
            failure
        })?;

        let (remaining, reset) = quota(response.headers());
        self.observe(remaining, reset.clone());
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("API rate limit exceeded (reset: {reset:?})");
            return Err(ApiError::RateLimited { remaining, reset });
        }

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("API request failed: {status} - {body}");
            return Err(RequestFailure::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| transport_failure(&e))?;
        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("API response could not be decoded: {e}");
            RequestFailure::Decode(e.to_string()).into()
        })
    }

    fn observe(&self, remaining: Option<u64>, reset: Option<String>) {
        if remaining.is_none() && reset.is_none() {
            return;
        }

        if let Ok(mut state) = self.rate_limit.lock() {
            if remaining.is_some() {
                state.remaining = remaining;
            }
            if reset.is_some() {
                state.reset = reset;
            }
            tracing::debug!("rate limit: remaining={:?} reset={:?}", state.remaining, state.reset);
        }
    }
}

impl AccountSource for ClashClient {
    async fn fetch_account(&self, tag: &str) -> Result<Player, ApiError> {
        ClashClient::fetch_account(self, tag).await
    }
}

/// Quota headers carried by a single response.
fn quota(headers: &HeaderMap) -> (Option<u64>, Option<String>) {
    let remaining = headers
        .get(HEADER_REMAINING)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let reset = headers
        .get(HEADER_RESET)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (remaining, reset)
}

fn transport_failure(e: &reqwest::Error) -> RequestFailure {
    if e.is_timeout() {
        RequestFailure::Timeout(REQUEST_TIMEOUT)
    } else {
        RequestFailure::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const TOKEN: &str = "test-token";

    fn client_for(server: &MockServer) -> ClashClient {
        ClashClient::new(&server.url("/v1"), TOKEN).unwrap()
    }

    fn player_body() -> serde_json::Value {
        json!({
            "tag": "#2PP",
            "name": "Chief",
            "expLevel": 80,
            "townHallLevel": 9,
            "trophies": 1500,
            "clan": { "tag": "#CLAN", "name": "X", "clanLevel": 3 },
            "heroes": [{ "name": "Barbarian King", "level": 10, "maxLevel": 30, "village": "home" }]
        })
    }

    #[test]
    fn test_normalize_tag_adds_single_marker() {
        assert_eq!(normalize_tag("2PP"), "#2PP");
        assert_eq!(normalize_tag("#2PP"), "#2PP");
        assert_eq!(normalize_tag(" 2PP\n"), "#2PP");
    }

    #[test]
    fn test_normalize_tag_idempotent() {
        for tag in ["2PP", "#2PP", "##2PP", "", "#"] {
            let once = normalize_tag(tag);
            assert_eq!(normalize_tag(&once), once, "tag {tag:?}");
        }
    }

    #[test]
    fn test_url_encodes_tag_marker() {
        let client = ClashClient::new("https://api.clashofclans.com/v1", TOKEN).unwrap();
        let url = client.url(&["players", "#2PP"]).unwrap();
        assert_eq!(url.as_str(), "https://api.clashofclans.com/v1/players/%232PP");

        let trailing = ClashClient::new("https://api.clashofclans.com/v1/", TOKEN).unwrap();
        let url = trailing.url(&["clans", "#ABC", "members"]).unwrap();
        assert_eq!(url.as_str(), "https://api.clashofclans.com/v1/clans/%23ABC/members");
    }

    #[test]
    fn test_clan_search_omits_unset_fields() {
        let search = ClanSearch {
            name: Some("raiders".into()),
            min_members: Some(10),
            ..ClanSearch::default()
        };
        let request = reqwest::Client::new()
            .get("https://example.com/v1/clans")
            .query(&search)
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("name=raiders&minMembers=10&limit=20"));
    }

    #[tokio::test]
    async fn test_fetch_account_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("/v1/players/")
                    .path_contains("2PP")
                    .header("authorization", "Bearer test-token");
                then.status(200)
                    .header("content-type", "application/json")
                    .header("x-ratelimit-remaining", "41")
                    .json_body(player_body());
            })
            .await;

        let client = client_for(&server);
        let player = client.fetch_account("2PP").await.unwrap();

        mock.assert_async().await;
        assert_eq!(player.tag, "#2PP");
        assert_eq!(player.exp_level, 80);
        assert_eq!(player.town_hall_level, Some(9));
        assert_eq!(player.clan.unwrap().name, "X");
        assert_eq!(player.heroes.len(), 1);
        assert!(player.achievements.is_empty());
        assert_eq!(client.rate_limit().remaining, Some(41));
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/v1/players/");
                then.status(429)
                    .header("x-ratelimit-remaining", "0")
                    .header("x-ratelimit-reset", "30")
                    .body("{\"reason\":\"requestThrottled\"}");
            })
            .await;

        let client = client_for(&server);
        let err = client.fetch_account("#2PP").await.unwrap_err();

        mock.assert_hits_async(1).await;
        assert!(matches!(
            err,
            ApiError::RateLimited { remaining: Some(0), reset: Some(ref r) } if r == "30"
        ));
        assert_eq!(
            client.rate_limit(),
            RateLimitState {
                remaining: Some(0),
                reset: Some("30".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limited_reports_only_its_own_headers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/locations");
                then.status(200)
                    .header("x-ratelimit-remaining", "41")
                    .json_body(json!({ "items": [] }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/v1/players/");
                then.status(429);
            })
            .await;

        let client = client_for(&server);
        client.locations().await.unwrap();
        let err = client.fetch_account("#2PP").await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::RateLimited { remaining: None, reset: None }
        ));
        assert_eq!(client.rate_limit().remaining, Some(41));
    }

    #[tokio::test]
    async fn test_error_status_updates_rate_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/v1/clans/");
                then.status(404)
                    .header("x-ratelimit-remaining", "12")
                    .body("{\"reason\":\"notFound\"}");
            })
            .await;

        let client = client_for(&server);
        let err = client.fetch_clan("NOPE").await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::RequestFailed(RequestFailure::Status { status: 404, .. })
        ));
        assert_eq!(client.rate_limit().remaining, Some(12));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_request_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/v1/players/");
                then.status(200).body("<html>maintenance</html>");
            })
            .await;

        let err = client_for(&server).fetch_account("2PP").await.unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed(RequestFailure::Decode(_))));
    }

    #[tokio::test]
    async fn test_connection_error_is_request_failure() {
        let client = ClashClient::new("http://127.0.0.1:1/v1", TOKEN).unwrap();
        let err = client.fetch_account("2PP").await.unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed(_)));
        assert_eq!(client.rate_limit(), RateLimitState::default());
    }

    #[tokio::test]
    async fn test_clan_members_and_search() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/members");
                then.status(200).json_body(json!({
                    "items": [
                        { "tag": "#A", "name": "one", "role": "leader", "expLevel": 200 },
                        { "tag": "#B", "name": "two", "role": "member" }
                    ]
                }));
            })
            .await;
        let search_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/clans")
                    .query_param("name", "raiders")
                    .query_param("limit", "20");
                then.status(200).json_body(json!({
                    "items": [{ "tag": "#C", "name": "Raiders", "members": 42, "warFrequency": "always" }]
                }));
            })
            .await;

        let client = client_for(&server);
        let members = client.fetch_clan_members("ABC").await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role.as_deref(), Some("leader"));

        let clans = client
            .search_clans(&ClanSearch {
                name: Some("raiders".into()),
                ..ClanSearch::default()
            })
            .await
            .unwrap();
        search_mock.assert_async().await;
        assert_eq!(clans[0].members, 42);
        assert_eq!(clans[0].war_frequency.as_deref(), Some("always"));
    }

    #[tokio::test]
    async fn test_connectivity_check() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/locations");
                then.status(200).json_body(json!({
                    "items": [{ "id": 32000000, "name": "Europe", "isCountry": false }]
                }));
            })
            .await;
        assert!(client_for(&server).test_connectivity().await);

        let down = MockServer::start_async().await;
        down.mock_async(|when, then| {
            when.method(GET).path("/v1/locations");
            then.status(503);
        })
        .await;
        assert!(!client_for(&down).test_connectivity().await);
    }

    #[tokio::test]
    async fn test_league_seasons_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/leagues/29000022/seasons");
                then.status(200)
                    .json_body(json!({ "items": [{ "id": "2024-01" }, { "id": "2024-02" }] }));
            })
            .await;

        let seasons = client_for(&server).league_seasons().await.unwrap();
        mock.assert_async().await;
        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[1].id, "2024-02");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ClashClient::new("not a url", TOKEN).is_err());
    }
}
