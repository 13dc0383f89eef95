use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tl-relay")]
#[command(about = "Translating chat relay server")]
#[command(version)]
pub struct Args {
    /// Address to listen on (host:port)
    #[arg(short = 'b', long)]
    pub bind: Option<String>,

    /// Translation provider name (from config.toml)
    #[arg(short = 'p', long)]
    pub provider: Option<String>,

    /// Model name for OpenAI-compatible providers
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Config file (defaults to ~/.config/tl-relay/config.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Largest accepted frame payload in bytes
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,

    /// Idle timeout in seconds for logged-in connections (0 disables)
    #[arg(long = "read-timeout", value_name = "SECS")]
    pub read_timeout_secs: Option<u64>,

    /// Log level, overridden by TL_RELAY_LOG
    #[arg(long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// Log format, overridden by TL_RELAY_LOG_FORMAT
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List supported language codes
    Languages,
    /// List configured translation providers
    Providers {
        /// Show details for one provider
        provider: Option<String>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_server_flags() {
        let args = Args::try_parse_from([
            "tl-relay",
            "--bind",
            "127.0.0.1:7000",
            "--provider",
            "deepl",
            "--read-timeout",
            "0",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:7000"));
        assert_eq!(args.provider.as_deref(), Some("deepl"));
        assert_eq!(args.read_timeout_secs, Some(0));
        assert_eq!(args.log_format, "json");
        assert_eq!(args.log_level, "info");
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_providers_subcommand() {
        let args = Args::try_parse_from(["tl-relay", "providers", "ollama"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Command::Providers { provider: Some(ref name) }) if name == "ollama"
        ));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Args::try_parse_from(["tl-relay", "--log-format", "xml"]).is_err());
    }
}
