//! `kubesage models`: show how model identifiers are routed.

use kubesage_agent::{BotSettings, BotVariant, classify};
use std::path::Path;

pub async fn run(config_path: Option<&Path>, models: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    for model in models {
        let variant = classify(model);
        let settings = BotSettings::from_config(variant, &config);
        println!("{model}");
        println!("   Variant:         {}", variant.display_name());
        println!("   Sent as:         {}", variant.extract_model_identifier(model));
        if variant == BotVariant::Deterministic {
            println!("   Tool calling:    keyword matching (no model in the loop)");
        } else {
            println!("   Max iterations:  {}", settings.max_iterations);
            println!("   Result budget:   {} chars", settings.max_tool_result_length);
        }
        if let Some(var) = variant.api_key_env() {
            let status = if config.api_key_for(variant.config_key()).is_some() {
                "✅ configured"
            } else {
                "❌ missing"
            };
            println!("   API key ({var}): {status}");
        }
        println!();
    }

    Ok(())
}
