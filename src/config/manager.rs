use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::paths;
use crate::server::ServerConfig;
use crate::translation::deepl;

/// Settings in the `[server]` section of config.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    /// Listen address, e.g. `0.0.0.0:5505`.
    pub bind: Option<String>,
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: Option<usize>,
    /// Seconds allowed to send `Login` after connecting; 0 disables it.
    pub login_timeout_secs: Option<u64>,
    /// Idle limit in seconds for logged-in connections; 0 or unset disables it.
    pub read_timeout_secs: Option<u64>,
    /// Per-frame write limit in seconds; 0 disables it.
    pub write_timeout_secs: Option<u64>,
    /// Consecutive undecodable frames tolerated per connection.
    pub max_codec_errors: Option<u32>,
    pub max_connections: Option<usize>,
}

/// Settings in the `[translation]` section of config.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationSection {
    /// Name of the provider under `[providers.*]`.
    pub provider: Option<String>,
    /// Model name (OpenAI-compatible providers).
    pub model: Option<String>,
    /// In-memory cache size; 0 disables caching.
    pub cache_entries: Option<usize>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// The API a provider speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (Ollama, OpenRouter, ...).
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "deepl")]
    DeepL,
}

/// Configuration for a translation provider.
///
/// Each provider has an endpoint and optional API key settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    /// API base URL. Defaults to DeepL's free host for `deepl` providers.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key stored directly in config (not recommended).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable name containing the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// List of available models for this provider.
    #[serde(default)]
    pub models: Vec<String>,
}

impl ProviderConfig {
    /// Gets the API key, preferring environment variable over config file.
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(env_var) = &self.api_key_env
            && let Ok(key) = std::env::var(env_var)
            && !key.is_empty()
        {
            return Some(key);
        }
        self.api_key.clone()
    }

    /// Returns `true` if this provider requires an API key.
    pub const fn requires_api_key(&self) -> bool {
        matches!(self.kind, ProviderKind::DeepL)
            || self.api_key.is_some()
            || self.api_key_env.is_some()
    }

    /// The configured endpoint, or the provider kind's default.
    pub fn resolved_endpoint(&self) -> Option<String> {
        match (&self.endpoint, self.kind) {
            (Some(endpoint), _) => Some(endpoint.clone()),
            (None, ProviderKind::DeepL) => Some(deepl::DEFAULT_ENDPOINT.to_string()),
            (None, ProviderKind::OpenAi) => None,
        }
    }
}

/// The complete configuration file structure.
///
/// Corresponds to `~/.config/tl-relay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub translation: TranslationSection,
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// A provider selected and fully resolved for use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Resolved translation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSettings {
    /// `None` relays messages untranslated.
    pub provider: Option<ResolvedProvider>,
    pub cache_entries: usize,
    pub timeout: Duration,
}

/// Resolved configuration after merging CLI arguments and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server: ServerConfig,
    pub translation: TranslationSettings,
}

/// Options for resolving configuration.
///
/// Contains CLI overrides that take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub bind: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_frame_bytes: Option<usize>,
    pub read_timeout_secs: Option<u64>,
}

pub const DEFAULT_CACHE_ENTRIES: usize = 1024;
pub const DEFAULT_TRANSLATION_TIMEOUT_SECS: u64 = 10;

/// Seconds to an optional duration, where 0 means "no limit".
fn optional_secs(secs: Option<u64>, default: Option<Duration>) -> Option<Duration> {
    match secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => default,
    }
}

/// Resolves configuration by merging CLI options with config file settings.
///
/// CLI options take precedence over config file values, which take
/// precedence over built-in defaults.
///
/// # Errors
///
/// Returns an error if the bind address is malformed, limits are zero, the
/// selected provider is not configured, an OpenAI-compatible provider has
/// no model, or a required API key is missing.
pub fn resolve_config(
    options: &ResolveOptions,
    config_file: &ConfigFile,
) -> Result<ResolvedConfig> {
    let server = resolve_server(options, &config_file.server)?;
    let translation = resolve_translation(options, config_file)?;
    Ok(ResolvedConfig {
        server,
        translation,
    })
}

fn resolve_server(options: &ResolveOptions, section: &ServerSection) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();

    let bind = match options.bind.as_ref().or(section.bind.as_ref()) {
        Some(addr) => addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address: '{addr}' (expected host:port)"))?,
        None => defaults.bind,
    };

    let max_frame_bytes = options
        .max_frame_bytes
        .or(section.max_frame_bytes)
        .unwrap_or(DEFAULT_MAX_FRAME_BYTES);
    if max_frame_bytes == 0 || max_frame_bytes > u32::MAX as usize {
        bail!("Invalid max_frame_bytes: {max_frame_bytes} (must be between 1 and {})", u32::MAX);
    }

    let max_codec_errors = section
        .max_codec_errors
        .unwrap_or(defaults.max_codec_errors);
    if max_codec_errors == 0 {
        bail!("Invalid max_codec_errors: must be at least 1");
    }

    let max_connections = section.max_connections.unwrap_or(defaults.max_connections);
    if max_connections == 0 {
        bail!("Invalid max_connections: must be at least 1");
    }

    Ok(ServerConfig {
        bind,
        max_frame_bytes,
        login_timeout: optional_secs(section.login_timeout_secs, defaults.login_timeout),
        read_timeout: optional_secs(
            options.read_timeout_secs.or(section.read_timeout_secs),
            defaults.read_timeout,
        ),
        write_timeout: optional_secs(section.write_timeout_secs, defaults.write_timeout),
        max_codec_errors,
        max_connections,
    })
}

fn resolve_translation(
    options: &ResolveOptions,
    config_file: &ConfigFile,
) -> Result<TranslationSettings> {
    let section = &config_file.translation;
    let cache_entries = section.cache_entries.unwrap_or(DEFAULT_CACHE_ENTRIES);
    let timeout = Duration::from_secs(
        section
            .timeout_secs
            .unwrap_or(DEFAULT_TRANSLATION_TIMEOUT_SECS),
    );

    let Some(provider_name) = options
        .provider
        .as_ref()
        .or(section.provider.as_ref())
        .cloned()
    else {
        return Ok(TranslationSettings {
            provider: None,
            cache_entries,
            timeout,
        });
    };

    // Get provider config
    let provider_config = config_file.providers.get(&provider_name).ok_or_else(|| {
        let mut available: Vec<_> = config_file.providers.keys().map(String::as_str).collect();
        available.sort_unstable();
        if available.is_empty() {
            anyhow::anyhow!(
                "Provider '{provider_name}' not found\n\n\
                 No providers configured. Add providers to ~/.config/tl-relay/config.toml"
            )
        } else {
            anyhow::anyhow!(
                "Provider '{provider_name}' not found\n\n\
                 Available providers:\n  \
                 - {}\n\n\
                 Add providers to ~/.config/tl-relay/config.toml",
                available.join("\n  - ")
            )
        }
    })?;

    let endpoint = provider_config.resolved_endpoint().ok_or_else(|| {
        anyhow::anyhow!(
            "Provider '{provider_name}' has no endpoint\n\n\
             Set endpoint in [providers.{provider_name}]"
        )
    })?;

    let model = options.model.as_ref().or(section.model.as_ref()).cloned();
    if provider_config.kind == ProviderKind::OpenAi {
        let Some(model) = &model else {
            bail!(
                "Missing required configuration: 'model'\n\n\
                 Please provide it via:\n  \
                 - CLI option: tl-relay --model <name>\n  \
                 - Config file: [translation] model in ~/.config/tl-relay/config.toml"
            );
        };

        // Warn if model is not in provider's models list
        if !provider_config.models.is_empty() && !provider_config.models.contains(model) {
            tracing::warn!(
                model = %model,
                provider = %provider_name,
                configured = %provider_config.models.join(", "),
                "model is not in the provider's configured models list, proceeding anyway"
            );
        }
    }

    // Get API key
    let api_key = provider_config.get_api_key();

    // Check if API key is required but missing
    if provider_config.requires_api_key() && api_key.is_none() {
        let env_var = provider_config.api_key_env.as_deref().unwrap_or("API_KEY");
        bail!(
            "Provider '{provider_name}' requires an API key\n\n\
             Set the {env_var} environment variable:\n  \
             export {env_var}=\"your-api-key\"\n\n\
             Or set api_key in ~/.config/tl-relay/config.toml"
        );
    }

    Ok(TranslationSettings {
        provider: Some(ResolvedProvider {
            name: provider_name,
            kind: provider_config.kind,
            endpoint,
            model,
            api_key,
        }),
        cache_entries,
        timeout,
    })
}

/// Manages loading configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new config manager.
    ///
    /// Configuration is stored at `$XDG_CONFIG_HOME/tl-relay/config.toml`
    /// or `~/.config/tl-relay/config.toml` if `XDG_CONFIG_HOME` is not set.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: paths::config_dir()?.join("config.toml"),
        })
    }

    /// Uses an explicit config file path instead of the default location.
    pub const fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub const fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn load(&self) -> Result<ConfigFile> {
        let contents = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config_file: ConfigFile = toml::from_str(&contents).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })?;

        Ok(config_file)
    }

    /// Loads the config file, treating a missing file as empty.
    ///
    /// Unlike a missing file, an unreadable or malformed one is an error.
    pub fn load_or_default(&self) -> Result<ConfigFile> {
        match fs::metadata(&self.config_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.config_path.display(), "no config file, using defaults");
                Ok(ConfigFile::default())
            }
            _ => self.load(),
        }
    }
}
