use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::context::{AnalysisContext, Intent};
use crate::tools::trait_def::{AnalysisTool, Capability, Validation};
use crate::tools::workspace::github_slug;

const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

/// Opens a GitHub pull request for a pushed branch
pub struct CreatePullRequestTool {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl CreatePullRequestTool {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(
            std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            std::env::var("GITHUB_TOKEN").ok(),
        )
    }

    pub fn with_endpoint(api_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reposcope/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

fn required<'a>(arguments: &'a Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("Missing required argument: {}", key))
}

#[async_trait]
impl AnalysisTool for CreatePullRequestTool {
    fn name(&self) -> &str {
        "create_pull_request"
    }

    fn description(&self) -> &str {
        "Open a GitHub pull request from an already pushed branch. Requires title and head; base defaults to main."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "body": { "type": "string" },
                "head": { "type": "string", "description": "Branch containing the changes" },
                "base": { "type": "string", "description": "Target branch. Default is main." },
                "repository": { "type": "string", "description": "GitHub URL; defaults to the repository under analysis" }
            },
            "required": ["title", "head"]
        })
    }

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn validate(&self, context: &AnalysisContext) -> Validation {
        if context.intent != Intent::CreatePullRequest && !context.flag("create_pull_request") {
            return Validation::rejected("pull request creation was not requested");
        }
        if github_slug(&context.repository).is_none() {
            return Validation::rejected("repository is not hosted on GitHub");
        }
        Validation::ok()
    }

    fn health(&self) -> bool {
        self.token.is_some()
    }

    fn estimate(&self, _context: &AnalysisContext) -> Duration {
        Duration::from_secs(20)
    }

    async fn execute(&self, context: &AnalysisContext, arguments: Value) -> Result<Value> {
        let Some(token) = &self.token else {
            bail!("GITHUB_TOKEN is not set");
        };

        let repository = arguments
            .get("repository")
            .and_then(Value::as_str)
            .unwrap_or(&context.repository);
        let (owner, repo) = github_slug(repository)
            .ok_or_else(|| anyhow!("Not a GitHub repository: {}", repository))?;

        let title = required(&arguments, "title")?;
        let head = required(&arguments, "head")?;
        let base = arguments
            .get("base")
            .and_then(Value::as_str)
            .unwrap_or("main");
        let body = arguments
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let url = format!("{}/repos/{}/{}/pulls", self.api_url, owner, repo);
        info!(%url, head, base, "Creating pull request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "title": title, "head": head, "base": base, "body": body }))
            .send()
            .await
            .context("GitHub request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("GitHub returned {}: {}", status, detail);
        }

        let pull: PullResponse = response
            .json()
            .await
            .context("Unexpected GitHub response")?;
        Ok(json!({ "number": pull.number, "url": pull.html_url }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(token: Option<&str>) -> CreatePullRequestTool {
        CreatePullRequestTool::with_endpoint("http://127.0.0.1:9", token.map(String::from))
            .unwrap()
    }

    #[test]
    fn test_health_tracks_token() {
        assert!(!tool(None).health());
        assert!(!tool(Some("")).health());
        assert!(tool(Some("ghp_x")).health());
    }

    #[test]
    fn test_validation() {
        let ctx = AnalysisContext::new("https://github.com/a/b", "open a PR");
        assert!(!tool(Some("t")).validate(&ctx).ok);

        let pr = ctx.clone().with_intent(Intent::CreatePullRequest);
        assert!(tool(Some("t")).validate(&pr).ok);

        let flagged = ctx.with_param("create_pull_request", json!(true));
        assert!(tool(Some("t")).validate(&flagged).ok);

        let gitlab = AnalysisContext::new("https://gitlab.com/a/b", "pr")
            .with_intent(Intent::CreatePullRequest);
        assert!(!tool(Some("t")).validate(&gitlab).ok);
    }

    #[tokio::test]
    async fn test_execute_requires_token_and_arguments() {
        let ctx = AnalysisContext::new("https://github.com/a/b", "pr");
        let err = tool(None).execute(&ctx, json!({})).await.unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));

        let err = tool(Some("t"))
            .execute(&ctx, json!({"head": "fix"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
