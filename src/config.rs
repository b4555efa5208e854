use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the provider API key. Read at startup,
/// never part of the layered config file.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection_name: String,
    /// Must match the embedding model's output dimension.
    pub vector_size: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection_name: "policy_chunks".to_string(),
            vector_size: 3072,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL of an OpenAI-compatible API, without a trailing slash.
    pub api_base: String,
    pub embedding_model: String,
    pub chat_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            chat_model: "gpt-4o".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IngestConfig {
    pub upload_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            chunk_size: 1000,
            chunk_overlap: 500,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QueryConfig {
    /// Results fetched per retrieval round.
    pub top_k: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Sub-queries requested from the decomposition step.
    pub max_sub_queries: usize,
    /// Retrieve/evaluate attempts per sub-query before settling on "Not sure".
    pub max_attempts_per_sub_query: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            score_threshold: None,
            max_sub_queries: 5,
            max_attempts_per_sub_query: 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Loads the layered configuration: programmatic defaults, then an optional
/// TOML file, then `POLICYRAG_`-prefixed environment variables
/// (e.g. `POLICYRAG_QDRANT__URL`).
pub fn load_config() -> Result<AppConfig> {
    let config_path_env = std::env::var("POLICYRAG_CONFIG_PATH").ok();
    let config_path = config_path_env
        .clone()
        .unwrap_or_else(|| "policyrag.toml".to_string());

    if let Some(ref env_path) = config_path_env {
        if !std::path::Path::new(env_path).exists() {
            return Err(anyhow::anyhow!(
                "Config file not found at POLICYRAG_CONFIG_PATH: {}",
                env_path
            ));
        }
        log::info!("POLICYRAG_CONFIG_PATH is set: {}", env_path);
    } else {
        log::info!(
            "POLICYRAG_CONFIG_PATH not set, falling back to default: {}",
            config_path
        );
    }

    let figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed("POLICYRAG_").split("__"));

    let config: AppConfig = figment.extract().context("Failed to extract AppConfig")?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
    if config.qdrant.collection_name.is_empty() {
        return Err(anyhow::anyhow!("qdrant.collection_name cannot be empty"));
    }
    if config.qdrant.vector_size == 0 {
        return Err(anyhow::anyhow!("qdrant.vector_size must be greater than zero"));
    }
    if config.ingest.chunk_size == 0 {
        return Err(anyhow::anyhow!("ingest.chunk_size must be greater than zero"));
    }
    if config.ingest.chunk_overlap >= config.ingest.chunk_size {
        return Err(anyhow::anyhow!(
            "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
            config.ingest.chunk_overlap,
            config.ingest.chunk_size
        ));
    }
    if config.query.top_k == 0 {
        return Err(anyhow::anyhow!("query.top_k must be greater than zero"));
    }
    if config.query.max_attempts_per_sub_query == 0 {
        return Err(anyhow::anyhow!(
            "query.max_attempts_per_sub_query must be greater than zero"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_config_default() {
        Jail::expect_with(|_jail| {
            let config = load_config().expect("Failed to load default config");
            assert_eq!(config.server.port, 8000);
            assert_eq!(config.qdrant.collection_name, "policy_chunks");
            assert_eq!(config.qdrant.vector_size, 3072);
            assert_eq!(config.ingest.chunk_size, 1000);
            assert_eq!(config.ingest.chunk_overlap, 500);
            assert_eq!(config.query.top_k, 4);
            assert_eq!(config.query.max_attempts_per_sub_query, 4);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_toml_only() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "policyrag.toml",
                r#"
[server]
host = "0.0.0.0"
port = 9090

[qdrant]
url = "http://qdrant.internal:6334"
collection_name = "my_policies"
vector_size = 1536

[query]
top_k = 8
                "#,
            )?;
            let config = load_config().expect("Failed to load TOML config");
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.qdrant.collection_name, "my_policies");
            assert_eq!(config.qdrant.vector_size, 1536);
            assert_eq!(config.query.top_k, 8);
            // Untouched sections keep their defaults
            assert_eq!(config.openai.chat_model, "gpt-4o");
            Ok(())
        });
    }

    #[test]
    fn test_load_config_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("POLICYRAG_QDRANT__URL", "http://env-qdrant:6334");
            jail.set_env("POLICYRAG_OPENAI__CHAT_MODEL", "gpt-4o-mini");
            jail.set_env("POLICYRAG_SERVER__PORT", "3000");

            let config = load_config().expect("Failed to load env config");
            assert_eq!(config.qdrant.url, "http://env-qdrant:6334");
            assert_eq!(config.openai.chat_model, "gpt-4o-mini");
            assert_eq!(config.server.port, 3000);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_rejects_overlap_not_smaller_than_chunk() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "policyrag.toml",
                r#"
[ingest]
chunk_size = 500
chunk_overlap = 500
                "#,
            )?;
            let result = load_config();
            assert!(result.is_err());
            let msg = result.unwrap_err().to_string();
            assert!(msg.contains("chunk_overlap"), "unexpected error: {}", msg);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_rejects_empty_collection_name() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "policyrag.toml",
                r#"
[qdrant]
collection_name = ""
                "#,
            )?;
            assert!(load_config().is_err());
            Ok(())
        });
    }
}
