mod manager;

pub use manager::{
    ConfigFile, ConfigManager, DEFAULT_CACHE_ENTRIES, DEFAULT_TRANSLATION_TIMEOUT_SECS,
    ProviderConfig, ProviderKind, ResolveOptions, ResolvedConfig, ResolvedProvider,
    ServerSection, TranslationSection, TranslationSettings, resolve_config,
};
