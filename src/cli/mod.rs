use clap::{ ArgAction, Parser };
use std::time::Duration;

use crate::llm::{ GeminiConfig, DEFAULT_BASE_URL };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Gemini API Args ---
    /// API key for the Gemini API. Sent as the `key` query parameter.
    #[arg(long, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Model id used for generation (e.g., gemini-1.5-flash, gemini-2.0-flash)
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-flash")]
    pub model: String,

    /// Base URL of the Gemini REST API, up to and including the version segment
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    // --- Generation Args ---
    /// Sampling temperature.
    #[arg(long, env = "GEMINI_TEMPERATURE", default_value = "0.4")]
    pub temperature: f32,

    /// Maximum number of output tokens. 0 leaves the limit to the server.
    #[arg(long, env = "GEMINI_MAX_TOKENS", default_value = "2048")]
    pub max_tokens: u32,

    /// Stream responses as they are generated (true/false).
    #[arg(long, env = "GEMINI_STREAMING", default_value = "true", action = ArgAction::Set)]
    pub streaming: bool,

    /// Seconds allowed for establishing the connection.
    #[arg(long, env = "GEMINI_CONNECT_TIMEOUT", default_value = "15")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for a whole request, body included.
    #[arg(long, env = "GEMINI_REQUEST_TIMEOUT", default_value = "60")]
    pub request_timeout_secs: u64,

    // --- Prompt Args ---
    /// Intent applied to --prompt and to plain REPL input (e.g., explain-code, fix-code).
    #[arg(long, env = "GEMINI_INTENT", default_value = "programming-question")]
    pub intent: String,

    /// Optional JSON file overriding intent instruction templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Send a single prompt, print the answer and exit instead of starting the REPL.
    #[arg(long)]
    pub prompt: Option<String>,

    /// File whose content is attached as extra context to --prompt.
    #[arg(long)]
    pub context_file: Option<String>,

    // --- General App Args ---
    /// Print the models available to the API key and exit.
    #[arg(long, default_value = "false")]
    pub list_models: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.api_key.trim().to_string(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_tokens,
            streaming: self.streaming,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plugin_settings() {
        let args = Args::try_parse_from(["gemini-chat", "--api-key", "k"]).unwrap();
        let config = args.gemini_config();

        assert_eq!(config.api_key, "k");
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_output_tokens, 2048);
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn streaming_can_be_switched_off() {
        let args = Args::try_parse_from(["gemini-chat", "--streaming", "false", "--max-tokens", "0"]).unwrap();
        let config = args.gemini_config();
        assert!(!config.streaming);
        assert_eq!(config.max_output_tokens, 0);
    }
}
