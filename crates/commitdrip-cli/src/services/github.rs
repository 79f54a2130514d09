//! GitHub API client for repository checks at submission time.

use async_trait::async_trait;
use commitdrip_core::{Error, RemoteHost, Result};
use reqwest::StatusCode;
use serde::Serialize;

pub const GITHUB_API: &str = "https://api.github.com";

#[derive(Serialize)]
struct CreateRepo<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
}

/// Checks for and creates repositories owned by the token's user.
pub struct GitHubHost {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl GitHubHost {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(GITHUB_API, token)
    }

    pub fn with_api_base(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "commitdrip")
            .header("Accept", "application/vnd.github+json")
    }
}

/// Repository name without its owner.
fn repo_name(repo: &str) -> &str {
    repo.rsplit('/').next().unwrap_or(repo)
}

#[async_trait]
impl RemoteHost for GitHubHost {
    async fn exists(&self, repo: &str) -> Result<bool> {
        let response = self
            .request(reqwest::Method::GET, &format!("/repos/{}", repo))
            .send()
            .await
            .map_err(|e| Error::RemoteHost(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::RemoteHost(format!(
                    "Failed to look up {}: {} {}",
                    repo, s, text
                )))
            }
        }
    }

    async fn create(&self, repo: &str) -> Result<bool> {
        let body = CreateRepo {
            name: repo_name(repo),
            private: false,
            auto_init: false,
        };
        let response = self
            .request(reqwest::Method::POST, "/user/repos")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::RemoteHost(e.to_string()))?;

        if response.status() == StatusCode::CREATED {
            return Ok(true);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(repo, status = %status, body = %text, "Repository creation declined");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_drops_owner() {
        assert_eq!(repo_name("octo/demo"), "demo");
        assert_eq!(repo_name("demo"), "demo");
    }

    #[test]
    fn test_api_base_is_normalized() {
        let host = GitHubHost::with_api_base("http://localhost:9999/", "t");
        assert_eq!(host.api_base, "http://localhost:9999");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_remote_host_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let host = GitHubHost::with_api_base(format!("http://{}", addr), "t");
        let err = host.exists("octo/demo").await.unwrap_err();
        assert!(matches!(err, Error::RemoteHost(_)));
    }
}
