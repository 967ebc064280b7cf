use anyhow::{Context, Result};
use config::{Config, Environment, File};
use ragchat_core::ChatConfig;
use ragchat_knowledge::{ComposerConfig, KnowledgeBaseConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub knowledge: KnowledgeBaseConfig,
    pub chat: ChatConfig,
    pub composer: ComposerConfig,
}

impl Settings {
    /// Defaults, then `ragchat.toml` if present, then `RAGCHAT__SECTION__KEY`
    /// environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from("ragchat")
    }

    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default()).context("Failed to encode default settings")?)
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix("RAGCHAT").separator("__").try_parsing(true))
            .build()
            .context("Failed to assemble settings")?
            .try_deserialize()
            .context("Failed to parse settings")?;

        settings.knowledge.validate()?;
        settings.chat.validate()?;
        Ok(settings)
    }
}
