use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::traits::{ForgeError, Release, Tag, UpstreamHost};

/// Public REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Raw content endpoint.
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;

/// GitHub client used for every upstream call in a run.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    raw_base: String,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

/// Build an HTTP client with the shared headers and optional bearer token.
pub fn build_client(token: Option<&str>) -> Result<Client, ForgeError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(crate::USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static("2022-11-28"),
    );

    if let Some(t) = token.filter(|t| !t.is_empty()) {
        if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {t}")) {
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
    }

    Ok(Client::builder().default_headers(headers).build()?)
}

impl GitHubClient {
    pub fn new(token: Option<&str>) -> Result<Self, ForgeError> {
        Ok(Self {
            client: build_client(token)?,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
        })
    }

    /// Point the client at different endpoints (mirrors, GHES, tests).
    #[must_use]
    pub fn with_bases(mut self, api_base: Option<&str>, raw_base: Option<&str>) -> Self {
        if let Some(api) = api_base {
            self.api_base = api.trim_end_matches('/').to_string();
        }
        if let Some(raw) = raw_base {
            self.raw_base = raw.trim_end_matches('/').to_string();
        }
        self
    }

    fn api(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn get(&self, url: &str) -> Result<Option<Response>, ForgeError> {
        debug!(%url, "GET");
        let resp = self.client.get(url).send().await?;
        check(url, resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ForgeError> {
        match self.get(url).await? {
            Some(resp) => Ok(Some(resp.json().await?)),
            None => Ok(None),
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ForgeError> {
        debug!(%url, "GET (bytes)");
        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/octet-stream")
            .send()
            .await?;
        match check(url, resp)? {
            Some(resp) => Ok(resp.bytes().await?.to_vec()),
            None => Err(ForgeError::NotFound(url.to_string())),
        }
    }
}

/// Map a response to `None` on 404, an error on any other non-success.
fn check(url: &str, resp: Response) -> Result<Option<Response>, ForgeError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && resp
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v == "0"))
    {
        return Err(ForgeError::RateLimited {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ForgeError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(Some(resp))
}

#[async_trait]
impl UpstreamHost for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    async fn latest_release(&self, repo: &str) -> Result<Option<Release>, ForgeError> {
        self.get_json(&self.api(&format!("repos/{repo}/releases/latest")))
            .await
    }

    async fn list_releases(&self, repo: &str) -> Result<Vec<Release>, ForgeError> {
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = self.api(&format!(
                "repos/{repo}/releases?per_page={PER_PAGE}&page={page}"
            ));
            let Some(batch) = self.get_json::<Vec<Release>>(&url).await? else {
                break;
            };
            let done = batch.len() < PER_PAGE;
            all.extend(batch.into_iter().filter(|r| !r.draft));
            if done {
                break;
            }
        }
        Ok(all)
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<Tag>, ForgeError> {
        let mut all = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = self.api(&format!("repos/{repo}/tags?per_page={PER_PAGE}&page={page}"));
            let Some(batch) = self.get_json::<Vec<Tag>>(&url).await? else {
                break;
            };
            let done = batch.len() < PER_PAGE;
            all.extend(batch);
            if done {
                break;
            }
        }
        Ok(all)
    }

    async fn resolve_ref(&self, repo: &str, git_ref: &str) -> Result<String, ForgeError> {
        let url = self.api(&format!("repos/{repo}/commits/{git_ref}"));
        match self.get_json::<CommitRef>(&url).await {
            Ok(Some(commit)) => Ok(commit.sha),
            Ok(None) | Err(ForgeError::Status { status: 422, .. }) => {
                Err(ForgeError::NotFound(format!("{repo}@{git_ref}")))
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ForgeError> {
        self.get_bytes(url).await
    }

    async fn raw_file(&self, repo: &str, rev: &str, path: &str) -> Result<Vec<u8>, ForgeError> {
        let url = format!(
            "{}/{repo}/{rev}/{}",
            self.raw_base,
            path.trim_start_matches('/')
        );
        self.get_bytes(&url).await
    }

    async fn snapshot(&self, repo: &str, rev: &str) -> Result<Vec<u8>, ForgeError> {
        self.get_bytes(&self.api(&format!("repos/{repo}/tarball/{rev}")))
            .await
    }
}
