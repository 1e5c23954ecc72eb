//! Top headlines lookup against NewsAPI.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::LookupError;

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org";
const SERVICE: &str = "News";
const USER_AGENT: &str = concat!("voice-agent-gateway/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source: String,
}

/// Spoken summary of a headline list.
pub fn summarize(headlines: &[Headline]) -> String {
    let mut out = String::from("Here are the top headlines:");
    for headline in headlines {
        out.push_str(&format!("\n- {} ({})", headline.title, headline.source));
    }
    out
}

#[derive(Debug, Deserialize)]
struct TopHeadlinesResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    source: Source,
}

#[derive(Debug, Deserialize)]
struct Source {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl NewsClient {
    pub fn new(client: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| NEWSAPI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn top_headlines(&self, country: &str, page_size: u32) -> Result<Vec<Headline>, LookupError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(LookupError::MissingKey { service: SERVICE })?;

        let url = format!("{}/v2/top-headlines", self.base_url);
        debug!(country, page_size, "Fetching top headlines");

        let response = self
            .client
            .get(&url)
            .query(&[("country", country), ("pageSize", &page_size.to_string())])
            .header("X-Api-Key", key)
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LookupError::InvalidKey { service: SERVICE });
        }
        let body = response
            .text()
            .await
            .map_err(|e| LookupError::from_reqwest(SERVICE, e))?;

        let parsed: TopHeadlinesResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(LookupError::Http {
                    service: SERVICE,
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => return Err(LookupError::InvalidResponse(format!("News response: {e}"))),
        };

        if parsed.status != "ok" {
            return Err(LookupError::Api {
                service: SERVICE,
                message: parsed.message.unwrap_or_else(|| "NewsAPI error".to_string()),
            });
        }

        Ok(parsed
            .articles
            .into_iter()
            .filter_map(|article| {
                Some(Headline {
                    title: article.title?,
                    description: article.description,
                    url: article.url,
                    source: article.source.name.unwrap_or_else(|| "unknown".to_string()),
                })
            })
            .take(page_size as usize)
            .collect())
    }
}
