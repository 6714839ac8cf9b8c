use crate::config::ReposcopeConfig;
use crate::llm::{GenAIClient, LLMClient};
use anyhow::Result;
use genai::adapter::AdapterKind;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FALLBACK_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";

pub struct SelectedClient {
    pub client: Arc<dyn LLMClient>,
    pub provider: AdapterKind,
    pub description: String,
}

impl std::fmt::Debug for SelectedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedClient")
            .field("provider", &self.provider)
            .field("description", &self.description)
            .finish()
    }
}

/// Picks the configured provider when its credentials are present, else a local Ollama
pub async fn select_llm_client(config: &ReposcopeConfig) -> Result<SelectedClient> {
    if let Some(selected) = try_configured_provider(config).await {
        return Ok(selected);
    }

    if let Some(selected) = try_ollama(config).await {
        return Ok(selected);
    }

    Err(anyhow::anyhow!(
        "No LLM backend available. Please either:\n\
         - Set an API key (ANTHROPIC_API_KEY, OPENAI_API_KEY, etc.) and REPOSCOPE_PROVIDER\n\
         - Start Ollama locally (ollama serve)"
    ))
}

async fn try_configured_provider(config: &ReposcopeConfig) -> Option<SelectedClient> {
    let provider = config.provider;

    if provider == AdapterKind::Ollama {
        debug!("Skipping Ollama in configured provider check - will check availability separately");
        return None;
    }

    if !provider_has_credentials(provider) {
        debug!("Skipping {} - no credentials available", provider);
        return None;
    }

    match GenAIClient::new(provider, config.model.clone(), config.request_timeout()).await {
        Ok(client) => {
            info!("Using configured provider: {} ({})", provider, config.model);
            Some(SelectedClient {
                client: Arc::new(client),
                provider,
                description: format!("{} ({})", provider, config.model),
            })
        }
        Err(e) => {
            warn!("Failed to initialize {}: {}", provider, e);
            None
        }
    }
}

async fn try_ollama(config: &ReposcopeConfig) -> Option<SelectedClient> {
    if !is_ollama_available().await {
        debug!("Ollama not available");
        return None;
    }

    let model = if config.provider == AdapterKind::Ollama {
        config.model.clone()
    } else {
        FALLBACK_OLLAMA_MODEL.to_string()
    };

    match GenAIClient::new(AdapterKind::Ollama, model.clone(), config.request_timeout()).await {
        Ok(client) => {
            info!("Using Ollama with model: {}", model);
            Some(SelectedClient {
                client: Arc::new(client),
                provider: AdapterKind::Ollama,
                description: format!("Ollama ({})", model),
            })
        }
        Err(e) => {
            warn!("Failed to initialize Ollama: {}", e);
            None
        }
    }
}

fn provider_has_credentials(provider: AdapterKind) -> bool {
    match provider.default_key_env_name() {
        None => true,
        Some(env_var) => std::env::var(env_var).is_ok(),
    }
}

async fn is_ollama_available() -> bool {
    let base_url =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());

    let url = format!("{}/api/tags", base_url);

    match reqwest::Client::new()
        .get(&url)
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) => {
            let available = resp.status().is_success();
            debug!("Ollama availability check: {}", available);
            available
        }
        Err(e) => {
            debug!("Ollama not available: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_credentials_check() {
        assert!(provider_has_credentials(AdapterKind::Ollama));
        let _ = provider_has_credentials(AdapterKind::OpenAI);
        let _ = provider_has_credentials(AdapterKind::Anthropic);
    }
}
