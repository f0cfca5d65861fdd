use crate::config::{Config, ConfigUpdate};
use crate::document::TextFileLoader;
use crate::llm::{InvocationClient, InvocationRequest, MockModelClient, ModelClient, RigModelClient};
use crate::output;
use crate::pipeline::ReviewPipeline;
use crate::providers::{Provider, check_api_key};
use crate::tokens::count_tokens;
use crate::{log_debug, log_info};
use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Arguments of the `check` command
#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub instructions: String,
    pub document: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub json: bool,
    pub plain: bool,
    pub dry_run: bool,
}

/// Handle the 'check' command
pub async fn handle_check_command(args: CheckArgs) -> Result<()> {
    let mut config = Config::load()?;
    if args.provider.is_some() || args.model.is_some() {
        // Overrides apply to this run only
        config.update(ConfigUpdate {
            provider: args.provider.clone(),
            model: args.model.clone(),
            ..ConfigUpdate::default()
        })?;
    }
    config.validate()?;

    let provider = config.provider()?;
    let settings = config.review_settings(provider)?;
    let backend = build_backend(&config, provider, args.dry_run)?;
    let client = InvocationClient::new(backend, config.retry);
    let pipeline = ReviewPipeline::new(client, &settings, Box::new(TextFileLoader))
        .context("Failed to assemble the review chain")?;

    if args.plain || args.json {
        colored::control::set_override(false);
    }
    if args.json {
        // Keep stdout parseable
        output::set_quiet_mode(true);
    }
    output::print_info(&format!(
        "Reviewing {} against {} with {} ({})",
        args.document, args.instructions, provider, settings.model_id
    ));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_info!("Interrupt received, cancelling review");
            ctrl_c.cancel();
        }
    });

    let report = pipeline
        .review(&args.instructions, &args.document, &cancel)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }

    match report.failure() {
        Some((stage, reason)) => Err(anyhow!("Review failed in stage '{stage}': {reason}")),
        None => Ok(()),
    }
}

fn build_backend(
    config: &Config,
    provider: Provider,
    dry_run: bool,
) -> Result<Arc<dyn ModelClient>> {
    if dry_run {
        log_debug!("Using offline model for dry run");
        return Ok(Arc::new(MockModelClient::with_responder(dry_run_response)));
    }
    check_api_key(provider)?;
    Ok(Arc::new(RigModelClient::from_config(
        provider,
        &config.provider_config(provider),
    )))
}

/// Canned completion describing the request instead of answering it
#[allow(clippy::unnecessary_wraps)]
fn dry_run_response(request: &InvocationRequest) -> Result<String, crate::error::ModelError> {
    Ok(format!(
        "[dry run] {} prompt tokens, max_tokens={}",
        count_tokens(&request.prompt),
        request.params.max_tokens
    ))
}

/// Handle the 'config' command
pub fn handle_config_command(update: ConfigUpdate) -> Result<()> {
    let mut config = Config::load()?;

    if config.update(update)? {
        config.save()?;
        output::print_success("Configuration updated successfully.");
    }

    output::print_configuration(&config);
    Ok(())
}

/// Handle the 'schema' command
pub fn handle_schema_command() -> Result<()> {
    let config = Config::load()?;
    output::print_schema(&config.schema()?, &config.questions());
    Ok(())
}

/// Parse `key=value` pairs from the command line
pub fn parse_additional_params(params: &[String]) -> HashMap<String, String> {
    params
        .iter()
        .filter_map(|param| {
            param
                .split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_additional_params_skips_malformed() {
        let params = parse_additional_params(&[
            "seed=7".to_string(),
            "stop=a=b".to_string(),
            "garbage".to_string(),
        ]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("seed").map(String::as_str), Some("7"));
        assert_eq!(params.get("stop").map(String::as_str), Some("a=b"));
    }
}
