//! Where IBC path records come from.
//!
//! A source returns every path it knows about or fails as a whole; a partial
//! listing is never returned. Validation against the RPC map happens in the
//! refresher, not here.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ibcwatch_types::{GitHubConfig, Path};
use reqwest::{header, Client as HttpClient};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading path records
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("registry request failed:: {0}")]
    Http(String),

    #[error("registry returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("unreadable registry file {file}:: {reason}")]
    Parse { file: String, reason: String },

    #[error("registry io error:: {0}")]
    Io(#[from] std::io::Error),
}

/// A loader of path records
#[async_trait]
pub trait PathSource: Send + Sync {
    /// Human readable location, for logs
    fn location(&self) -> String;

    async fn load(&self) -> Result<Vec<Path>, SourceError>;
}

fn parse(file: &str, content: &str) -> Result<Path, SourceError> {
    Path::from_json(content).map_err(|e| SourceError::Parse {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

/// Every `*.json` file in a local directory, in file name order
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PathSource for DirectorySource {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    async fn load(&self) -> Result<Vec<Path>, SourceError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            if file.extension().is_some_and(|ext| ext == "json") && entry.file_type().await?.is_file() {
                files.push(file);
            }
        }
        files.sort();

        let mut paths = Vec::with_capacity(files.len());
        for file in files {
            let content = tokio::fs::read_to_string(&file).await?;
            paths.push(parse(&file.display().to_string(), &content)?);
        }

        debug!(dir = %self.dir.display(), count = paths.len(), "Loaded paths from directory");
        Ok(paths)
    }
}

/// Entry of a GitHub contents API directory listing
#[derive(Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// A single file from the GitHub contents API
#[derive(Deserialize)]
struct ContentFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Registry directories in a GitHub repository, read through the contents API
pub struct GitHubSource {
    http: HttpClient,
    config: GitHubConfig,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(config: GitHubConfig, token: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("ibcwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;

        Ok(Self {
            http,
            config,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Mainnet directory first, then testnets if configured
    fn directories(&self) -> Vec<&str> {
        std::iter::once(self.config.dir.as_str())
            .chain(self.config.testnets_dir.as_deref())
            .collect()
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.org,
            self.config.repo,
            path.trim_start_matches('/')
        )
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, SourceError> {
        let mut request = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Http(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Http(format!("{url}: {e}")))
    }

    async fn load_file(&self, entry: &ContentEntry) -> Result<Path, SourceError> {
        let file: ContentFile = self.get(&self.contents_url(&entry.path)).await?;
        if file.encoding != "base64" {
            return Err(SourceError::Parse {
                file: entry.path.clone(),
                reason: format!("unsupported encoding {:?}", file.encoding),
            });
        }

        let compact: String = file.content.split_whitespace().collect();
        let bytes = STANDARD.decode(compact).map_err(|e| SourceError::Parse {
            file: entry.path.clone(),
            reason: e.to_string(),
        })?;
        let content = String::from_utf8(bytes).map_err(|e| SourceError::Parse {
            file: entry.path.clone(),
            reason: e.to_string(),
        })?;

        parse(&entry.path, &content)
    }
}

#[async_trait]
impl PathSource for GitHubSource {
    fn location(&self) -> String {
        format!(
            "github.com/{}/{}/{}",
            self.config.org,
            self.config.repo,
            self.directories().join(",")
        )
    }

    async fn load(&self) -> Result<Vec<Path>, SourceError> {
        let mut paths = Vec::new();

        for dir in self.directories() {
            let mut entries: Vec<ContentEntry> = self.get(&self.contents_url(dir)).await?;
            entries.retain(|e| e.kind == "file" && e.name.ends_with(".json"));
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            for entry in &entries {
                paths.push(self.load_file(entry).await?);
            }
            debug!(dir, count = entries.len(), "Loaded paths from GitHub");
        }

        Ok(paths)
    }
}
