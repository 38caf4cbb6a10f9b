use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{HarvestError, ProviderError, Result};
use crate::normalization::{CardDescriptor, RawBattle, RawParticipant};
use crate::providers::{BattleHistoryProvider, CardCatalogProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.clashroyale.com/v1";

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Client for the official Clash Royale statistics API.
///
/// Endpoints used:
/// - GET /players/{tag}/battlelog - recent battles of one player
/// - GET /cards - full card catalog
/// - GET /clans/{tag}/members - clan roster
///
/// Auth is a bearer token issued by the developer portal.
#[derive(Debug, Clone)]
pub struct RoyaleApiClient {
    base_url: String,
    http: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    name: String,
    #[serde(default, rename = "iconUrls")]
    icon_urls: ApiIconUrls,
}

#[derive(Debug, Default, Deserialize)]
struct ApiIconUrls {
    #[serde(default)]
    medium: Option<String>,
    #[serde(default, rename = "evolutionMedium")]
    evolution_medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiParticipant {
    tag: String,
    #[serde(default)]
    crowns: u32,
    #[serde(default)]
    cards: Vec<ApiCard>,
}

#[derive(Debug, Deserialize)]
struct ApiBattle {
    #[serde(default)]
    team: Vec<ApiParticipant>,
    #[serde(default)]
    opponent: Vec<ApiParticipant>,
}

#[derive(Debug, Deserialize)]
struct ApiItems<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiClanMember {
    tag: String,
}

impl From<ApiParticipant> for RawParticipant {
    fn from(p: ApiParticipant) -> Self {
        RawParticipant {
            tag: p.tag,
            deck_cards: p.cards.into_iter().map(|c| c.name).collect(),
            crowns: p.crowns,
        }
    }
}

impl From<ApiBattle> for RawBattle {
    fn from(b: ApiBattle) -> Self {
        RawBattle {
            team: b.team.into_iter().map(Into::into).collect(),
            opponent: b.opponent.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ApiCard> for CardDescriptor {
    fn from(c: ApiCard) -> Self {
        let has_evolution = c.icon_urls.evolution_medium.is_some();
        CardDescriptor {
            name: c.name,
            icon_url: c.icon_urls.medium.unwrap_or_default(),
            has_evolution,
            evolution_icon_url: c.icon_urls.evolution_medium,
        }
    }
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized {
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => ProviderError::NotFound(truncate_for_log(body, 200)),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        other => ProviderError::Status {
            status: other.as_u16(),
            body: truncate_for_log(body, 2000),
        },
    }
}

impl RoyaleApiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>, timeout_secs: Option<u64>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(HarvestError::config("API key is empty"));
        }
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&base_url)
            .map_err(|e| HarvestError::config(format!("invalid API base url {base_url}: {e}")))?;

        let http = Client::builder()
            .user_agent("battle-harvest/0.1")
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(30)))
            .build()
            .map_err(|e| HarvestError::config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for seg in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(seg));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, ProviderError> {
        debug!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    /// Member identifiers of one clan, in roster order.
    pub async fn clan_member_tags(&self, clan_tag: &str) -> std::result::Result<Vec<String>, ProviderError> {
        let url = self.endpoint(&["clans", clan_tag, "members"]);
        let body: ApiItems<ApiClanMember> = self.get_json(&url).await?;
        Ok(body.items.into_iter().map(|m| m.tag).collect())
    }
}

#[async_trait]
impl BattleHistoryProvider for RoyaleApiClient {
    fn name(&self) -> &'static str {
        "clashroyale"
    }

    async fn fetch_battles(&self, identifier: &str) -> std::result::Result<Vec<RawBattle>, ProviderError> {
        let url = self.endpoint(&["players", identifier, "battlelog"]);
        let battles: Vec<ApiBattle> = self.get_json(&url).await?;
        Ok(battles.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl CardCatalogProvider for RoyaleApiClient {
    async fn fetch_cards(&self) -> Result<Vec<CardDescriptor>> {
        let url = self.endpoint(&["cards"]);
        let body: ApiItems<ApiCard> = self.get_json(&url).await?;
        Ok(body.items.into_iter().map(Into::into).collect())
    }
}
