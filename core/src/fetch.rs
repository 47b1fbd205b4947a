//! Fetching recipe pages through a relay chain, and the URL import flow.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::parser::{ParsedRecipe, parse_recipe_from_markup, secure_image_url};

pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Relay templates tried in order. `{url}` is replaced by the target URL as
/// is, `{encoded}` by its percent-encoded form.
pub const DEFAULT_RELAYS: &[&str] = &[
    "{url}",
    "https://api.allorigins.win/raw?url={encoded}",
    "https://corsproxy.io/?url={encoded}",
];

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("No relay endpoints configured")]
    NoRelays,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty body")]
    Empty { url: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Could not fetch the page: {0}")]
    Fetch(#[from] FetchError),

    #[error("No recipe found on this page")]
    NoRecipe,
}

#[derive(Debug, Clone)]
pub struct RelayChain {
    pub relays: Vec<String>,
    /// Wall-clock limit for each relay attempt.
    pub timeout: Duration,
}

impl Default for RelayChain {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|r| (*r).to_string()).collect(),
            timeout: DEFAULT_RELAY_TIMEOUT,
        }
    }
}

impl RelayChain {
    #[must_use]
    pub fn new(relays: Vec<String>, timeout: Duration) -> Self {
        Self { relays, timeout }
    }

    /// Concrete request URLs for `target`, one per relay.
    #[must_use]
    pub fn relay_urls(&self, target: &str) -> Vec<String> {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        self.relays
            .iter()
            .map(|template| {
                template
                    .replace("{encoded}", &encoded)
                    .replace("{url}", target)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Anything that can retrieve page text and binary resources.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Page body, always decoded as UTF-8.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, FetchError>;
}

pub struct RelayFetcher {
    client: reqwest::Client,
    chain: RelayChain,
}

impl RelayFetcher {
    pub fn new(chain: RelayChain) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "carnet/{} (recipe manager)",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, chain })
    }

    async fn fetch_via_chain(&self, target: &str) -> Result<FetchedBytes, FetchError> {
        let parsed = url::Url::parse(target).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let mut last_error = None;
        for relay_url in self.chain.relay_urls(target) {
            match self.attempt(&relay_url).await {
                Ok(fetched) => {
                    tracing::debug!(relay = %relay_url, bytes = fetched.bytes.len(), "relay succeeded");
                    return Ok(fetched);
                }
                Err(e) => {
                    tracing::debug!(relay = %relay_url, error = %e, "relay failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(FetchError::NoRelays))
    }

    async fn attempt(&self, relay_url: &str) -> Result<FetchedBytes, FetchError> {
        let request = async {
            let resp = self.client.get(relay_url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: relay_url.to_string(),
                    status: status.as_u16(),
                });
            }
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = resp.bytes().await?.to_vec();
            if bytes.is_empty() {
                return Err(FetchError::Empty {
                    url: relay_url.to_string(),
                });
            }
            Ok(FetchedBytes {
                bytes,
                content_type,
            })
        };

        tokio::time::timeout(self.chain.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout {
                url: relay_url.to_string(),
                seconds: self.chain.timeout.as_secs(),
            })?
    }
}

#[async_trait]
impl PageSource for RelayFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let fetched = self.fetch_via_chain(url).await?;
        Ok(String::from_utf8_lossy(&fetched.bytes).into_owned())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, FetchError> {
        self.fetch_via_chain(url).await
    }
}

/// Progress stages reported by [`fetch_and_parse_recipe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Fetching,
    Parsing,
    DownloadingImage,
    Done,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImportStage::Fetching => "Fetching page",
            ImportStage::Parsing => "Reading recipe",
            ImportStage::DownloadingImage => "Downloading image",
            ImportStage::Done => "Done",
        };
        f.write_str(label)
    }
}

/// Fetch a page, parse its recipe, and inline the recipe image when possible.
pub async fn fetch_and_parse_recipe(
    source: &dyn PageSource,
    url: &str,
    mut on_progress: impl FnMut(ImportStage),
) -> Result<ParsedRecipe, ImportError> {
    on_progress(ImportStage::Fetching);
    let markup = source.fetch_text(url).await?;

    on_progress(ImportStage::Parsing);
    let mut recipe = parse_recipe_from_markup(&markup, url).ok_or(ImportError::NoRecipe)?;

    if let Some(image_url) = recipe.image.take() {
        if image_url.starts_with("data:") {
            recipe.image = Some(image_url);
        } else {
            on_progress(ImportStage::DownloadingImage);
            recipe.image = match inline_image(source, &image_url).await {
                Ok(data_url) => Some(data_url),
                Err(e) => {
                    tracing::warn!(image = %image_url, error = %e, "could not inline image, keeping link");
                    secure_image_url(Some(&image_url))
                }
            };
        }
    }

    on_progress(ImportStage::Done);
    Ok(recipe)
}

async fn inline_image(source: &dyn PageSource, image_url: &str) -> Result<String, FetchError> {
    let fetched = source.fetch_bytes(image_url).await?;
    if fetched.bytes.is_empty() {
        return Err(FetchError::Empty {
            url: image_url.to_string(),
        });
    }
    let mime = image_mime(fetched.content_type.as_deref(), image_url);
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(&fetched.bytes)))
}

fn image_mime(content_type: Option<&str>, url: &str) -> String {
    if let Some(ct) = content_type {
        let essence = ct.split(';').next().unwrap_or("").trim().to_lowercase();
        if essence.starts_with("image/") {
            return essence;
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    let mime = if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    };
    mime.to_string()
}
