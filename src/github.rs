//! GitHub contents API client used by the harvester.
//!
//! Only two calls are needed:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | list a directory | `GET /repos/{owner}/{repo}/contents/{path}[?ref=..]` |
//! | fetch a file | the entry's `download_url`, or its `url` + base64 `content` |
//!
//! Directory listings follow `Link: <...>; rel="next"` headers until the last
//! page, so large directories are listed completely.

use anyhow::{bail, Context, Result};
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use std::time::Duration;

use crate::config::{GitHubConfig, RepoDescriptor};

const USER_AGENT: &str = concat!("docchat/", env!("CARGO_PKG_VERSION"));

/// Kind of an entry in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Other,
}

/// One entry of a contents API listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub download_url: Option<String>,
    /// API URL of the entry itself (JSON with base64 `content` for files).
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

pub struct GitHubClient {
    client: Client,
    api_base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn headers(&self, accept: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.token.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid GitHub token")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build the contents URL for `path` inside the descriptor's repository.
    pub fn contents_url(&self, repo: &RepoDescriptor, path: &str) -> Result<Url> {
        let path = path.trim_matches('/');
        let raw = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base_url, repo.owner, repo.repo, path
        );
        let mut url = Url::parse(&raw).with_context(|| format!("invalid contents URL: {}", raw))?;
        if let Some(ref branch) = repo.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    /// List every entry of one directory, across all pages.
    ///
    /// When `path` names a single file the API answers with an object rather
    /// than an array; that object is returned as a one-entry listing.
    pub async fn list_dir(&self, repo: &RepoDescriptor, path: &str) -> Result<Vec<ContentEntry>> {
        let mut next = Some(self.contents_url(repo, path)?);
        let mut entries = Vec::new();

        while let Some(url) = next.take() {
            tracing::debug!(%url, "listing directory");
            let resp = self
                .client
                .get(url.clone())
                .headers(self.headers("application/vnd.github+json")?)
                .send()
                .await
                .with_context(|| format!("failed to call GitHub at {}", url))?;
            let resp = check_status(resp, &url).await?;
            next = next_link(resp.headers());

            let value: serde_json::Value = resp
                .json()
                .await
                .with_context(|| format!("failed to parse listing from {}", url))?;
            match value {
                serde_json::Value::Array(_) => {
                    let page: Vec<ContentEntry> = serde_json::from_value(value)
                        .with_context(|| format!("unexpected listing shape from {}", url))?;
                    entries.extend(page);
                }
                serde_json::Value::Object(_) => {
                    let entry: ContentEntry = serde_json::from_value(value)
                        .with_context(|| format!("unexpected entry shape from {}", url))?;
                    entries.push(entry);
                }
                other => bail!("unexpected listing from {}: {}", url, other),
            }
        }

        Ok(entries)
    }

    /// Download the text of a file entry.
    pub async fn fetch_text(&self, entry: &ContentEntry) -> Result<String> {
        if let Some(ref download_url) = entry.download_url {
            let url = Url::parse(download_url)
                .with_context(|| format!("invalid download URL for {}", entry.path))?;
            tracing::debug!(%url, "downloading file");
            let resp = self
                .client
                .get(url.clone())
                .headers(self.headers("application/vnd.github.raw")?)
                .send()
                .await
                .with_context(|| format!("failed to download {}", url))?;
            let resp = check_status(resp, &url).await?;
            return resp
                .text()
                .await
                .with_context(|| format!("failed to read body of {}", url));
        }

        // No raw URL (e.g. very large files): fall back to the JSON content.
        let api_url = entry
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("entry {} has no download URL", entry.path))?;
        let url =
            Url::parse(api_url).with_context(|| format!("invalid API URL for {}", entry.path))?;
        let resp = self
            .client
            .get(url.clone())
            .headers(self.headers("application/vnd.github+json")?)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;
        let resp = check_status(resp, &url).await?;
        let file: FileContent = resp
            .json()
            .await
            .with_context(|| format!("failed to parse file content from {}", url))?;
        decode_content(&file).with_context(|| format!("failed to decode {}", entry.path))
    }
}

async fn check_status(resp: Response, url: &Url) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    match status.as_u16() {
        401 | 403 | 404 => bail!(
            "GitHub returned {} for {}: {}. Check the GitHub token and the repository details.",
            status,
            url,
            body.trim()
        ),
        _ => bail!("GitHub returned {} for {}: {}", status, url, body.trim()),
    }
}

fn decode_content(file: &FileContent) -> Result<String> {
    if file.encoding != "base64" {
        bail!("unsupported content encoding '{}'", file.encoding);
    }
    let compact: String = file
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Extract the `rel="next"` target from a `Link` header, if any.
pub fn next_link(headers: &HeaderMap) -> Option<Url> {
    let value = headers.get(LINK)?.to_str().ok()?;
    value.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}
