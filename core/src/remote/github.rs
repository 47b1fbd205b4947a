//! GitHub contents API as a [`FileHost`].

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{FileHost, RemoteError, RemoteFile};
use crate::db::Database;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";

const KEY_OWNER: &str = "remote_owner";
const KEY_REPO: &str = "remote_repo";
const KEY_BRANCH: &str = "remote_branch";
const KEY_TOKEN: &str = "remote_token";
const KEY_API_BASE: &str = "remote_api_base";

/// Where the remote datasets live, and the credential to reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub api_base: String,
}

impl RemoteConfig {
    #[must_use]
    pub fn new(owner: &str, repo: &str, token: &str) -> Self {
        Self {
            owner: owner.trim().to_string(),
            repo: repo.trim().to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            token: token.trim().to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.is_empty() || self.repo.is_empty() {
            bail!("Remote owner and repository must not be empty");
        }
        if self.token.is_empty() {
            bail!("Remote access token must not be empty");
        }
        if self.branch.trim().is_empty() {
            bail!("Remote branch must not be empty");
        }
        if !self.api_base.starts_with("https://") && !self.api_base.starts_with("http://") {
            bail!("Remote API base must be an http(s) URL");
        }
        Ok(())
    }

    /// Read the configuration from settings. `None` unless owner, repository
    /// and token are all present.
    pub fn load(db: &Database) -> Result<Option<Self>> {
        let (Some(owner), Some(repo), Some(token)) = (
            db.get_setting(KEY_OWNER)?,
            db.get_setting(KEY_REPO)?,
            db.get_setting(KEY_TOKEN)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(Self {
            owner,
            repo,
            token,
            branch: db
                .get_setting(KEY_BRANCH)?
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            api_base: db
                .get_setting(KEY_API_BASE)?
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }))
    }

    pub fn save(&self, db: &Database) -> Result<()> {
        self.validate()?;
        db.set_setting(KEY_OWNER, &self.owner)?;
        db.set_setting(KEY_REPO, &self.repo)?;
        db.set_setting(KEY_BRANCH, &self.branch)?;
        db.set_setting(KEY_TOKEN, &self.token)?;
        db.set_setting(KEY_API_BASE, &self.api_base)?;
        Ok(())
    }

    /// Remove every remote setting. Returns false if none was set.
    pub fn clear(db: &Database) -> Result<bool> {
        let mut removed = false;
        for key in [KEY_OWNER, KEY_REPO, KEY_BRANCH, KEY_TOKEN, KEY_API_BASE] {
            removed |= db.delete_setting(key)?;
        }
        Ok(removed)
    }

    fn blob_url(&self, sha: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/blobs/{sha}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
        )
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }
}

/// Files over 1 MB come back with empty `content` and `encoding: "none"`;
/// their bytes must be fetched from the blobs API by sha.
#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    encoding: Option<String>,
    size: Option<u64>,
    sha: String,
}

impl ContentResponse {
    /// The decodable inline content, if the response carries it.
    fn inline(&self) -> Option<&str> {
        let content = self.content.as_deref().filter(|c| !c.trim().is_empty())?;
        match self.encoding.as_deref() {
            None | Some("base64") => Some(content),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

pub struct GithubHost {
    client: Client,
    config: RemoteConfig,
}

/// Shared HTTP client for [`GithubHost`]s.
pub fn build_client() -> Result<Client, RemoteError> {
    Ok(Client::builder()
        .user_agent(format!("carnet/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(5))
        .build()?)
}

/// Decode base64 content as served by the contents API (wrapped at 60 columns).
pub fn decode_content(path: &str, encoded: &str) -> Result<String, RemoteError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RemoteError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| RemoteError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

impl GithubHost {
    #[must_use]
    pub fn new(client: Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn read_blob(&self, path: &str, sha: &str) -> Result<String, RemoteError> {
        let resp = self
            .authorized(self.client.get(self.config.blob_url(sha)))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
                StatusCode::FORBIDDEN => RemoteError::Forbidden {
                    path: path.to_string(),
                },
                _ => RemoteError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                },
            });
        }
        let blob: BlobResponse = resp.json().await?;
        tracing::debug!(path, sha, "read large file through the blobs API");
        match blob.encoding.as_deref() {
            Some("utf-8") => Ok(blob.content),
            None | Some("base64") => decode_content(path, &blob.content),
            Some(other) => Err(RemoteError::Decode {
                path: path.to_string(),
                reason: format!("unsupported blob encoding '{other}'"),
            }),
        }
    }
}

#[async_trait]
impl FileHost for GithubHost {
    async fn read(&self, path: &str, bypass_cache: bool) -> Result<Option<RemoteFile>, RemoteError> {
        let mut query = vec![("ref", self.config.branch.clone())];
        if bypass_cache {
            query.push(("t", Utc::now().timestamp_millis().to_string()));
        }
        let resp = self
            .authorized(self.client.get(self.config.contents_url(path)))
            .query(&query)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED => return Err(RemoteError::Unauthorized),
            StatusCode::FORBIDDEN => {
                return Err(RemoteError::Forbidden {
                    path: path.to_string(),
                });
            }
            status if !status.is_success() => {
                return Err(RemoteError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let body: ContentResponse = resp.json().await?;
        let content = match body.inline() {
            Some(encoded) => decode_content(path, encoded)?,
            None if body.size == Some(0) => String::new(),
            None => self.read_blob(path, &body.sha).await?,
        };
        Ok(Some(RemoteFile {
            content,
            version: body.sha,
        }))
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<String, RemoteError> {
        let body = WriteRequest {
            message,
            content: STANDARD.encode(content.as_bytes()),
            branch: &self.config.branch,
            sha: expected,
        };
        let resp = self
            .authorized(self.client.put(self.config.contents_url(path)))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::from_status(path, status.as_u16()));
        }
        let written: WriteResponse = resp.json().await?;
        Ok(written.content.sha)
    }

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), RemoteError> {
        let body = DeleteRequest {
            message,
            sha: version,
            branch: &self.config.branch,
        };
        let resp = self
            .authorized(self.client.delete(self.config.contents_url(path)))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::from_status(path, status.as_u16()));
        }
        Ok(())
    }
}
