use log::info;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;
use url::Url;

use super::chat::ChatError;
use super::GeminiConfig;

const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Models offered when the catalog endpoint cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnownModel {
    #[default]
    Gemini15Flash,
    Gemini15Pro,
    Gemini20Flash,
    Gemini20FlashLite,
    Gemini10Pro,
    GeminiPro,
}

impl KnownModel {
    pub const ALL: [KnownModel; 6] = [
        KnownModel::Gemini15Flash,
        KnownModel::Gemini15Pro,
        KnownModel::Gemini20Flash,
        KnownModel::Gemini20FlashLite,
        KnownModel::Gemini10Pro,
        KnownModel::GeminiPro,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            KnownModel::Gemini15Flash => "gemini-1.5-flash",
            KnownModel::Gemini15Pro => "gemini-1.5-pro",
            KnownModel::Gemini20Flash => "gemini-2.0-flash",
            KnownModel::Gemini20FlashLite => "gemini-2.0-flash-lite",
            KnownModel::Gemini10Pro => "gemini-1.0-pro",
            KnownModel::GeminiPro => "gemini-pro",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            KnownModel::Gemini15Flash => "Gemini 1.5 Flash (Recommended)",
            KnownModel::Gemini15Pro => "Gemini 1.5 Pro",
            KnownModel::Gemini20Flash => "Gemini 2.0 Flash",
            KnownModel::Gemini20FlashLite => "Gemini 2.0 Flash Lite",
            KnownModel::Gemini10Pro => "Gemini 1.0 Pro (Legacy)",
            KnownModel::GeminiPro => "Gemini Pro (Legacy)",
        }
    }

    /// Unknown or missing ids resolve to the default model.
    pub fn from_id(id: Option<&str>) -> Self {
        id.and_then(|id| Self::ALL.into_iter().find(|m| m.id() == id)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub supported_methods: Vec<String>,
    pub input_token_limit: u32,
    pub output_token_limit: u32,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    #[serde(default)]
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
    #[serde(default)]
    input_token_limit: u32,
    #[serde(default)]
    output_token_limit: u32,
}

pub fn parse_models_response(body: &str) -> Result<Vec<ModelInfo>, ChatError> {
    let response: ModelsResponse = serde_json::from_str(body)?;
    let models = response.models
        .into_iter()
        .map(|raw| {
            let id = raw.name.strip_prefix("models/").unwrap_or(&raw.name).to_string();
            ModelInfo {
                display_name: raw.display_name.unwrap_or_else(|| id.clone()),
                name: id,
                description: raw.description,
                supported_methods: raw.supported_generation_methods,
                input_token_limit: raw.input_token_limit,
                output_token_limit: raw.output_token_limit,
            }
        })
        .collect();
    Ok(models)
}

/// Lists the models available to the configured API key.
pub async fn list_models(config: &GeminiConfig) -> Result<Vec<ModelInfo>, ChatError> {
    if !config.has_api_key() {
        return Err(ChatError::Configuration("API key is required".to_string()));
    }

    let raw = format!("{}/models", config.base_url.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|e|
        ChatError::Configuration(format!("invalid Gemini URL '{}': {}", raw, e))
    )?;
    url.query_pairs_mut().append_pair("key", &config.api_key);

    let http = HttpClient::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(LIST_TIMEOUT)
        .build()?;

    info!("Fetching model catalog from {}", url.path());
    let response = http.get(url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ChatError::Transport { status: status.as_u16(), body });
    }

    parse_models_response(&body)
}

pub fn format_model_info(model: &ModelInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Model: {}", model.name);
    let _ = writeln!(out, "Display Name: {}", model.display_name);
    if !model.description.trim().is_empty() {
        let _ = writeln!(out, "Description: {}", model.description);
    }
    let _ = writeln!(out, "Supported Methods: {}", model.supported_methods.join(", "));
    let _ = writeln!(out, "Input Token Limit: {}", model.input_token_limit);
    let _ = writeln!(out, "Output Token Limit: {}", model.output_token_limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_and_strips_prefix() {
        let body = r#"{
            "models": [
                {
                    "name": "models/gemini-2.0-flash",
                    "displayName": "Gemini 2.0 Flash",
                    "description": "Fast",
                    "supportedGenerationMethods": ["generateContent", "countTokens"],
                    "inputTokenLimit": 1048576,
                    "outputTokenLimit": 8192
                },
                { "name": "models/embedding-001" }
            ]
        }"#;

        let models = parse_models_response(body).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "gemini-2.0-flash");
        assert_eq!(models[0].supported_methods, vec!["generateContent", "countTokens"]);
        assert_eq!(models[0].output_token_limit, 8192);
        assert_eq!(models[1].display_name, "embedding-001");
        assert_eq!(models[1].input_token_limit, 0);
    }

    #[test]
    fn missing_models_key_is_empty_list() {
        assert!(parse_models_response("{}").unwrap().is_empty());
        assert!(parse_models_response("nope").is_err());
    }

    #[test]
    fn known_model_lookup_defaults_to_flash() {
        assert_eq!(KnownModel::from_id(Some("gemini-1.5-pro")), KnownModel::Gemini15Pro);
        assert_eq!(KnownModel::from_id(Some("unknown")), KnownModel::Gemini15Flash);
        assert_eq!(KnownModel::from_id(None).id(), "gemini-1.5-flash");
    }

    #[test]
    fn formatted_info_skips_blank_description() {
        let model = ModelInfo {
            name: "m".to_string(),
            display_name: "M".to_string(),
            description: String::new(),
            supported_methods: vec!["generateContent".to_string()],
            input_token_limit: 10,
            output_token_limit: 5,
        };
        let text = format_model_info(&model);
        assert!(!text.contains("Description"));
        assert!(text.contains("Supported Methods: generateContent"));
        assert!(text.ends_with("Output Token Limit: 5\n"));
    }
}
