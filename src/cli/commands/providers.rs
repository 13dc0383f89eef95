//! Provider listing command handler.

use anyhow::Result;
use std::fmt::Write as _;

use crate::config::{ConfigFile, ConfigManager, ProviderConfig, ProviderKind};
use crate::ui::Style;

/// Prints configured providers to stdout.
///
/// If `specific_provider` is provided, shows detailed information for that provider.
/// Otherwise, lists all configured providers with their endpoints and models.
pub fn print_providers(manager: &ConfigManager, specific_provider: Option<&str>) -> Result<()> {
    let config = manager.load_or_default()?;
    print!("{}", render_providers(&config, specific_provider)?);
    Ok(())
}

fn kind_label(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "openai",
        ProviderKind::DeepL => "deepl",
    }
}

fn endpoint_label(provider: &ProviderConfig) -> String {
    provider
        .resolved_endpoint()
        .unwrap_or_else(|| "(not set)".to_string())
}

/// Renders the listing; split out from printing for testing.
fn render_providers(config: &ConfigFile, specific_provider: Option<&str>) -> Result<String> {
    let mut out = String::new();

    if config.providers.is_empty() {
        out.push_str("No providers configured. Messages are relayed untranslated.\n");
        out.push_str("Add providers to ~/.config/tl-relay/config.toml\n");
        return Ok(out);
    }

    let default_provider = config.translation.provider.as_deref();
    let marker = |name: &str| {
        if default_provider == Some(name) {
            format!(" {}", Style::default_marker())
        } else {
            String::new()
        }
    };

    if let Some(provider_name) = specific_provider {
        let Some(provider) = config.providers.get(provider_name) else {
            anyhow::bail!("Provider '{provider_name}' not found");
        };

        writeln!(
            out,
            "{} {}{}",
            Style::header("Provider:"),
            Style::value(provider_name),
            marker(provider_name)
        )?;
        writeln!(out, "  {} = {}", Style::label("kind    "), kind_label(provider.kind))?;
        writeln!(
            out,
            "  {} = {}",
            Style::label("endpoint"),
            Style::secondary(endpoint_label(provider))
        )?;
        if provider.requires_api_key() {
            let status = if provider.get_api_key().is_some() {
                Style::success("(set)")
            } else {
                Style::warning("(not set)")
            };
            writeln!(out, "  {} = {status}", Style::label("api_key "))?;
        }
        if provider.models.is_empty() {
            writeln!(out, "  {} = (none configured)", Style::label("models  "))?;
        } else {
            writeln!(out, "  {}:", Style::label("models"))?;
            for model in &provider.models {
                writeln!(out, "    - {model}")?;
            }
        }
        return Ok(out);
    }

    writeln!(out, "{}\n", Style::header("Configured providers:"))?;
    let mut names: Vec<_> = config.providers.keys().collect();
    names.sort_unstable();
    for name in names {
        let provider = &config.providers[name];
        writeln!(
            out,
            "  {} {}{}",
            Style::value(name),
            Style::secondary(format!("[{}]", kind_label(provider.kind))),
            marker(name)
        )?;
        writeln!(
            out,
            "    {} {}",
            Style::label("endpoint:"),
            Style::secondary(endpoint_label(provider))
        )?;
        if !provider.models.is_empty() {
            writeln!(out, "    {} {}", Style::label("models:"), provider.models.join(", "))?;
        }
    }

    Ok(out)
}
