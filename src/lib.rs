pub mod agent;
pub mod cli;
pub mod config;
pub mod console;
pub mod history;
pub mod llm;
pub mod markdown;
pub mod models;

use agent::{ spawn_sink, GenerationCoordinator };
use cli::Args;
use config::prompt::{ load_prompts, Intent, PromptConfig };
use console::{ run_repl, ConsoleSink };
use llm::catalog::{ format_model_info, list_models };
use llm::chat::gemini::GeminiChatClient;
use log::{ info, warn };
use std::error::Error;
use std::fs;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Model: {}", args.model);
    info!("Base URL: {}", args.base_url);
    info!("Streaming: {}", args.streaming);
    info!("Temperature: {}", args.temperature);
    info!("Max Output Tokens: {}", args.max_tokens);
    info!("Connect Timeout: {}s", args.connect_timeout_secs);
    info!("Request Timeout: {}s", args.request_timeout_secs);
    info!("Default Intent: {}", args.intent);
    if let Some(path) = &args.prompts_path {
        info!("Prompts Path: {}", path);
    }
    info!("-------------------------");

    let config = args.gemini_config();
    if !config.has_api_key() {
        warn!("GEMINI_API_KEY is not set; requests will fail until it is configured.");
    }

    if args.list_models {
        for model in list_models(&config).await? {
            println!("{}", format_model_info(&model));
        }
        return Ok(());
    }

    let prompts = match &args.prompts_path {
        Some(path) => load_prompts(path)?,
        None => Arc::new(PromptConfig::default()),
    };
    let intent: Intent = args.intent.parse()?;

    let client = Arc::new(GeminiChatClient::new(config)?);
    let (events, sink) = spawn_sink(ConsoleSink::new(std::io::stdout()));
    let coordinator = GenerationCoordinator::new(client, prompts, events);

    match &args.prompt {
        Some(prompt) => {
            let context = match &args.context_file {
                Some(path) =>
                    Some(
                        fs
                            ::read_to_string(path)
                            .map_err(|e| format!("Failed to read context file '{}': {}", path, e))?
                    ),
                None => None,
            };
            if let Some(worker) = coordinator.send_intent(intent, prompt, context.as_deref())? {
                worker.await?;
            }
        }
        None => run_repl(&coordinator, intent).await?,
    }

    drop(coordinator);
    sink.await?;
    Ok(())
}
