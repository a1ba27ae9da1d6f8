pub mod batch;
pub mod cache;
pub mod conversation;
pub mod job;
pub mod llm;
pub mod markup;
pub mod orchestrator;
pub mod tokens;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::archive;
use crate::cli::{EstimateArgs, TextArgs, TranslateArgs};
use crate::config::Config;
use crate::jobs::{JobRecord, JobStore};
use crate::story::StoryXml;
use crate::utils::{LANGUAGE_NAMES, truncate_display};
use conversation::ConversationalTranslator;
use job::{InputFile, JobRequest, run_job};
use llm::{ChatProvider, LlmConfig, OpenAiClient};
use orchestrator::{BatchOptions, normalize_targets};
use tokens::{estimate_cost, estimate_total_tokens};

pub async fn run(args: TranslateArgs) -> Result<()> {
    let cfg = Config::load().unwrap_or_default();

    let source = args
        .source
        .clone()
        .unwrap_or_else(|| cfg.translation.source_language.clone());
    let targets = resolve_targets(&args.targets, &cfg, &source)?;
    let model = args.model.clone().unwrap_or_else(|| cfg.get_model());
    let concurrent = args.concurrent || cfg.translation.concurrent;

    let max_tokens = args.max_tokens.unwrap_or(if concurrent {
        cfg.translation.async_max_tokens
    } else {
        cfg.translation.max_tokens
    });
    let delay_secs = args.delay.unwrap_or(cfg.translation.delay_secs);
    anyhow::ensure!(
        delay_secs.is_finite() && delay_secs >= 0.0,
        "Delay must be a non-negative number of seconds"
    );
    let delay = (delay_secs > 0.0).then(|| Duration::from_secs_f64(delay_secs));

    for file in &args.files {
        if !file.is_file() {
            anyhow::bail!("Input file does not exist: {}", file.display());
        }
    }

    let provider = create_provider(&cfg, args.api_key.clone(), args.api_base.clone())?;

    let options = BatchOptions::new(&source)
        .with_prompt(args.prompt.clone().or(cfg.translation.custom_prompt.clone()))
        .with_max_tokens(max_tokens)
        .with_delay(delay)
        .with_model(&model);

    let output_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => default_output_dir(&args.files[0]),
    };

    let store = JobStore::new();
    let id = store.create(
        args.files.iter().map(|f| f.display().to_string()).collect(),
        targets.clone(),
    );
    let request = JobRequest {
        files: args.files.iter().map(|f| InputFile::new(f)).collect(),
        target_langs: targets.clone(),
        options,
        concurrent,
        work_dir: std::env::temp_dir().join(format!("idml-translator-{}", id)),
        output_dir,
    };

    if !args.json {
        println!(
            "{}",
            format!(
                "[Translate] {} file(s) -> {} using {}{}",
                request.files.len(),
                targets.join(", "),
                model,
                if concurrent { " (concurrent)" } else { "" }
            )
            .cyan()
        );
    }

    let result = run_with_progress(&store, &id, provider, &request).await;

    remove_scratch(&request.work_dir);

    let record = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_summary(&record);
    }

    Ok(())
}

async fn run_with_progress(
    store: &JobStore,
    id: &str,
    provider: Arc<dyn ChatProvider>,
    request: &JobRequest,
) -> Result<JobRecord> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let job = run_job(store, id, provider, request);
    tokio::pin!(job);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    let result = loop {
        tokio::select! {
            res = &mut job => break res,
            _ = ticker.tick() => {
                if let Some(record) = store.get(id) {
                    pb.set_position(record.progress as u64);
                    pb.set_message(format!("{} tokens", record.tokens));
                }
            }
        }
    };

    pb.finish_and_clear();
    result
}

fn print_summary(record: &JobRecord) {
    for link in &record.links {
        println!(
            "{}",
            format!("[OK] {} -> {}", link.language, link.path.display()).green()
        );
    }
    println!("  Tokens used: {}", record.tokens);
    if record.failed_batches > 0 {
        println!(
            "{}",
            format!(
                "[WARN] {} batch(es) failed and kept their source text",
                record.failed_batches
            )
            .yellow()
        );
    }
}

pub async fn run_text(args: TextArgs) -> Result<()> {
    let cfg = Config::load().unwrap_or_default();

    let source = args
        .source
        .clone()
        .unwrap_or_else(|| cfg.translation.source_language.clone());
    let model = args.model.clone().unwrap_or_else(|| cfg.get_model());
    let prompt = args.prompt.clone().or(cfg.translation.custom_prompt.clone());
    let provider = create_provider(&cfg, args.api_key.clone(), args.api_base.clone())?;

    let mut translator =
        ConversationalTranslator::new(provider, &model, &source, &args.target, prompt.as_deref());
    let translated = translator.translate_single(&args.text).await;
    tracing::debug!("{} tokens used", translator.tokens_used());

    if translator.failed_batches() > 0 {
        eprintln!(
            "{}",
            format!(
                "[WARN] Translation failed, returning the original: {}",
                truncate_display(&args.text, 60)
            )
            .yellow()
        );
    }
    println!("{}", translated);

    Ok(())
}

pub fn estimate(args: EstimateArgs) -> Result<()> {
    let cfg = Config::load().unwrap_or_default();

    let source = args
        .source
        .clone()
        .unwrap_or_else(|| cfg.translation.source_language.clone());
    let targets = resolve_targets(&args.targets, &cfg, &source)?;
    let model = args.model.clone().unwrap_or_else(|| cfg.get_model());

    let mut texts = Vec::new();
    for (i, file) in args.files.iter().enumerate() {
        let dir = std::env::temp_dir().join(format!(
            "idml-translator-estimate-{}-{}",
            std::process::id(),
            i
        ));
        let collected = collect_texts(file, &dir);
        remove_scratch(&dir);
        texts.extend(collected?);
    }

    let tokens = estimate_total_tokens(&texts, &model, targets.len());
    let cost = estimate_cost(tokens, &model, 1);

    if args.json {
        let out = serde_json::json!({
            "tokens": tokens,
            "cost": (cost * 10_000.0).round() / 10_000.0,
            "segments": texts.len(),
            "languages": targets,
            "model": model,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", "[Estimate]".cyan());
        println!("  Segments:  {}", texts.len());
        println!("  Languages: {}", targets.join(", "));
        println!("  Model:     {}", model);
        println!("  Tokens:    {}", tokens);
        println!("  Cost:      ~${:.4}", cost);
    }

    Ok(())
}

pub fn list_languages() {
    println!("{}", "[Languages]".cyan());
    for (code, name) in LANGUAGE_NAMES {
        println!("  {:<4} {}", code, name);
    }
}

fn collect_texts(file: &Path, dir: &Path) -> Result<Vec<String>> {
    archive::extract(file, dir).with_context(|| format!("Failed to extract {}", file.display()))?;

    let mut texts = Vec::new();
    for story in archive::find_story_files(dir)? {
        texts.extend(StoryXml::load(&story)?.texts());
    }
    Ok(texts)
}

fn resolve_targets(cli: &[String], cfg: &Config, source: &str) -> Result<Vec<String>> {
    let requested = if cli.is_empty() {
        cfg.translation.target_languages.as_slice()
    } else {
        cli
    };

    let targets = normalize_targets(requested, source);
    if targets.is_empty() {
        anyhow::bail!(
            "No target languages. Pass -t <lang> or set translation.target_languages in the config."
        );
    }
    Ok(targets)
}

fn remove_scratch(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

fn default_output_dir(first_input: &Path) -> PathBuf {
    first_input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn create_provider(
    cfg: &Config,
    api_key: Option<String>,
    api_base: Option<String>,
) -> Result<Arc<dyn ChatProvider>> {
    let api_key = api_key.or_else(|| cfg.get_api_key());
    let api_base = api_base.or_else(|| cfg.get_api_base());

    if api_key.is_none() && api_base.is_none() {
        anyhow::bail!(
            "API key required. Set via --api-key, config, or OPENAI_API_KEY.\n\
             Run 'idml-translator config init' to create a config file."
        );
    }

    let config = LlmConfig::default()
        .with_api_key(api_key)
        .with_base_url(api_base);

    Ok(Arc::new(OpenAiClient::new(config)?))
}
