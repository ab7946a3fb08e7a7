use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Opaque text-generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generation through a mixtape `Agent`, bounded by a timeout.
pub struct AgentClient {
    agent: mixtape_core::Agent,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(agent: mixtape_core::Agent, timeout: Duration) -> Self {
        Self { agent, timeout }
    }
}

#[async_trait]
impl GenerationClient for AgentClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.agent.run(prompt))
            .await
            .map_err(|_| {
                log::warn!("Model call timed out after {}s", self.timeout.as_secs());
                Error::UpstreamFailure("generation request timed out".into())
            })?
            .map_err(|e| classify_failure(&e.to_string()))?;
        Ok(response.text().trim().to_string())
    }
}

/// Map a model-service failure message onto the error taxonomy. The raw
/// message is logged; the returned error carries only a fixed reason.
pub fn classify_failure(message: &str) -> Error {
    log::warn!("Model service call failed: {message}");
    let lower = message.to_lowercase();
    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("throttl")
        || lower.contains("too many requests")
        || lower.contains("quota")
    {
        Error::UpstreamRateLimited("request volume limit reached".into())
    } else if lower.contains("api key")
        || lower.contains("credential")
        || lower.contains("unauthorized")
        || lower.contains("401")
    {
        Error::Unconfigured("credentials were rejected".into())
    } else {
        Error::UpstreamFailure("generation request failed".into())
    }
}

/// Create a generation client configured from the database's LLM settings.
pub async fn create_client(db: &Database) -> Result<Arc<dyn GenerationClient>> {
    let (provider, model, timeout) = db
        .reader()
        .call(|conn| {
            let provider = repository::get_config(conn, "llm_provider")?;
            let model = repository::get_config(conn, "llm_model")?;
            let timeout = repository::get_config(conn, "llm_timeout_secs")?;
            Ok::<(Option<String>, Option<String>, Option<String>), rusqlite::Error>((
                provider, model, timeout,
            ))
        })
        .await?;

    let provider = provider.as_deref().unwrap_or("bedrock");
    let model_name = model.as_deref().unwrap_or("claude-sonnet-4-5");
    let timeout_secs = match timeout {
        Some(v) => v.trim().parse::<u64>().map_err(|_| {
            Error::Config(format!("llm_timeout_secs must be a whole number, got '{v}'"))
        })?,
        None => DEFAULT_TIMEOUT_SECS,
    };

    if provider == "anthropic" && std::env::var_os("ANTHROPIC_API_KEY").is_none() {
        return Err(Error::Unconfigured("ANTHROPIC_API_KEY is not set".into()));
    }

    let agent = build_agent(provider, model_name).await?;
    log::debug!("Using {provider}/{model_name} with {timeout_secs}s timeout");
    Ok(Arc::new(AgentClient::new(agent, Duration::from_secs(timeout_secs))))
}

async fn build_agent(provider: &str, model_name: &str) -> Result<mixtape_core::Agent> {
    // Each combination needs its own builder call since the model types are different.
    let built = match (provider, model_name) {
        ("bedrock", "claude-haiku-4-5" | "haiku") => {
            mixtape_core::Agent::builder()
                .bedrock(mixtape_core::ClaudeHaiku4_5)
                .build()
                .await
        }
        ("bedrock", _) => {
            mixtape_core::Agent::builder()
                .bedrock(mixtape_core::ClaudeSonnet4_5)
                .build()
                .await
        }
        ("anthropic", "claude-haiku-4-5" | "haiku") => {
            mixtape_core::Agent::builder()
                .anthropic_from_env(mixtape_core::ClaudeHaiku4_5)
                .build()
                .await
        }
        ("anthropic", _) => {
            mixtape_core::Agent::builder()
                .anthropic_from_env(mixtape_core::ClaudeSonnet4_5)
                .build()
                .await
        }
        (other, _) => {
            return Err(Error::Unconfigured(format!("unknown llm_provider: {other}")));
        }
    };
    built.map_err(|e| {
        log::warn!("Failed to build {provider} agent: {e}");
        Error::Unconfigured(format!("cannot initialize the {provider} provider"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert!(matches!(
            classify_failure("HTTP 429 Too Many Requests"),
            Error::UpstreamRateLimited(_)
        ));
        assert!(matches!(
            classify_failure("ThrottlingException: Rate exceeded"),
            Error::UpstreamRateLimited(_)
        ));
    }

    #[test]
    fn test_classify_credentials() {
        assert!(matches!(
            classify_failure("401 Unauthorized: invalid x-api-key"),
            Error::Unconfigured(_)
        ));
    }

    #[test]
    fn test_classify_other() {
        assert!(matches!(
            classify_failure("connection reset by peer"),
            Error::UpstreamFailure(_)
        ));
    }

    #[test]
    fn test_provider_text_stays_out_of_message() {
        let raw = "ValidationException: account 123456789012 key sk-ant-XYZ rejected (401)";
        for message in [
            raw,
            "429 from https://bedrock.internal/model/abc",
            "stack trace: at handler.rs:88",
        ] {
            let shown = classify_failure(message).to_string();
            assert!(!shown.contains("123456789012"), "{shown}");
            assert!(!shown.contains("sk-ant"), "{shown}");
            assert!(!shown.contains("bedrock.internal"), "{shown}");
            assert!(!shown.contains("handler.rs"), "{shown}");
        }
        assert!(classify_failure("HTTP 429")
            .to_string()
            .contains("retry in a few minutes"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_unconfigured() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| repository::set_config(conn, "llm_provider", "carrier-pigeon"))
            .await
            .unwrap();
        let err = create_client(&db).await.err().unwrap();
        assert!(matches!(err, Error::Unconfigured(_)));
    }

    #[tokio::test]
    async fn test_bad_timeout_is_config_error() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| repository::set_config(conn, "llm_timeout_secs", "soon"))
            .await
            .unwrap();
        let err = create_client(&db).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
