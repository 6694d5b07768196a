//! `kubesage chat`: answer one question.

use kubesage_agent::create_bot;
use kubesage_core::progress::{FnProgress, ProgressSink};
use std::path::Path;
use std::sync::Arc;

pub struct ChatOptions {
    pub model: Option<String>,
    pub namespace: Option<String>,
    pub api_key: Option<String>,
    pub json: bool,
}

pub async fn run(config_path: Option<&Path>, question: &str, options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let model = options.model.unwrap_or_else(|| config.default_model.clone());

    let executor = kubesage_tools::executor_from_config(&config);
    let bot = create_bot(&model, options.api_key, Some(executor), &config)?;

    if !bot.check_tools().await {
        eprintln!("  ⚠️  No tools available, answers will not include live metrics");
    }

    // Progress goes to stderr so stdout carries only the answer.
    let progress: Arc<dyn ProgressSink> = Arc::new(FnProgress(|message: &str| -> Result<(), String> {
        eprintln!("  … {message}");
        Ok(())
    }));

    let namespace = options.namespace.as_deref();
    if options.json {
        let report = bot.chat_report(question, namespace, Some(progress)).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let answer = bot.chat(question, namespace, Some(progress.as_ref())).await;
        println!("{answer}");
    }

    Ok(())
}
