//! End-to-end IDML translation job
//!
//! Extract every package, translate all story segments of a package in one
//! orchestrator run, then write one repackaged copy per target language.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::llm::ChatProvider;
use super::orchestrator::{
    BatchOptions, Callbacks, JobOutput, async_batch_translate, batch_translate, normalize_targets,
};
use crate::archive;
use crate::jobs::{JOB_TTL, JobRecord, JobStatus, JobStore, OutputLink};
use crate::story::StoryXml;

/// Share of the job progress bar given to the translation phase.
const TRANSLATE_SHARE: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    /// Output files are named `<base_name>-<lang>.idml`.
    pub base_name: String,
}

impl InputFile {
    pub fn new(path: &Path) -> Self {
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Self {
            path: path.to_path_buf(),
            base_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub files: Vec<InputFile>,
    pub target_langs: Vec<String>,
    pub options: BatchOptions,
    pub concurrent: bool,
    /// Scratch space for unpacked packages.
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

struct UnpackedFile<'a> {
    input: &'a InputFile,
    dir: PathBuf,
    stories: Vec<(PathBuf, StoryXml)>,
}

impl UnpackedFile<'_> {
    fn texts(&self) -> Vec<String> {
        self.stories.iter().flat_map(|(_, s)| s.texts()).collect()
    }
}

/// Run a job already registered in `store` and return its final record.
///
/// The record is marked failed if any package cannot be unpacked, read or
/// written. Provider errors never fail the job.
pub async fn run_job(
    store: &JobStore,
    job_id: &str,
    provider: Arc<dyn ChatProvider>,
    request: &JobRequest,
) -> Result<JobRecord> {
    store.update(job_id, |r| r.status = JobStatus::Running);

    match execute(store, job_id, provider, request).await {
        Ok(()) => store
            .get(job_id)
            .with_context(|| format!("Job {} disappeared from the store", job_id)),
        Err(e) => {
            store.update(job_id, |r| {
                r.status = JobStatus::Failed;
                r.error = Some(format!("{:#}", e));
            });
            Err(e)
        }
    }
}

async fn execute(
    store: &JobStore,
    job_id: &str,
    provider: Arc<dyn ChatProvider>,
    request: &JobRequest,
) -> Result<()> {
    let languages = normalize_targets(&request.target_langs, &request.options.source_lang);

    // Every package is unpacked and parsed before the first request is sent.
    let mut unpacked = Vec::with_capacity(request.files.len());
    for (i, input) in request.files.iter().enumerate() {
        let dir = request.work_dir.join(format!("{}-{}", i, input.base_name));
        let original = dir.join("original");
        archive::extract(&input.path, &original)
            .with_context(|| format!("Failed to extract {}", input.path.display()))?;

        let mut stories = Vec::new();
        for path in archive::find_story_files(&original)? {
            let relative = path.strip_prefix(&original)?.to_path_buf();
            stories.push((relative, StoryXml::load(&path)?));
        }

        info!(
            "Unpacked {} ({} stories)",
            input.path.display(),
            stories.len()
        );
        unpacked.push(UnpackedFile { input, dir, stories });
    }

    let total_steps = unpacked.iter().map(|u| u.stories.len()).sum::<usize>().max(1);
    let mut steps_done = 0;
    let mut links = Vec::new();
    let mut failed_batches = 0;

    for file in &unpacked {
        let texts = file.texts();
        let file_steps = file.stories.len();

        let on_progress = |pct: u8| {
            let overall = (steps_done * 100 + file_steps * pct as usize) as f64 / total_steps as f64;
            let scaled = (overall * TRANSLATE_SHARE) as u8;
            store.update(job_id, |r| r.progress = r.progress.max(scaled));
        };
        let on_tokens = |n: u64| {
            store.update(job_id, |r| r.tokens += n);
        };
        let callbacks = Callbacks {
            progress: Some(&on_progress),
            tokens: Some(&on_tokens),
        };

        info!(
            "Translating {} segments of {} into {}",
            texts.len(),
            file.input.base_name,
            languages.join(", ")
        );
        let JobOutput {
            translations,
            stats,
        } = if request.concurrent {
            async_batch_translate(
                Arc::clone(&provider),
                &texts,
                &languages,
                &request.options,
                callbacks,
            )
            .await
        } else {
            batch_translate(
                Arc::clone(&provider),
                &texts,
                &languages,
                &request.options,
                callbacks,
            )
            .await
        };
        info!(
            "{}: {} requests, {} failed, {} tokens",
            file.input.base_name, stats.requests, stats.failed_batches, stats.tokens_used
        );
        failed_batches += stats.failed_batches;

        for lang in &languages {
            let translated = translations.get(lang).unwrap_or(&texts);
            let link = write_language(request, file, lang, translated)?;
            links.push(link);
        }

        steps_done += file_steps;
        let pct = (steps_done * 100 / total_steps).min(100) as u8;
        store.update(job_id, |r| r.progress = r.progress.max(pct));
    }

    store.update(job_id, |r| {
        r.status = JobStatus::Completed;
        r.progress = 100;
        r.links = links;
        r.failed_batches = failed_batches;
        r.expires_at = Some(r.created_at + JOB_TTL.as_secs());
    });

    Ok(())
}

fn write_language(
    request: &JobRequest,
    file: &UnpackedFile<'_>,
    lang: &str,
    translated: &[String],
) -> Result<OutputLink> {
    let lang_dir = file.dir.join(lang);
    archive::copy_unpacked_dir(&file.dir.join("original"), &lang_dir)?;

    let mut index = 0;
    for (relative, story) in &file.stories {
        let end = (index + story.len()).min(translated.len());
        let mut story = story.clone();
        story.apply_translations(&translated[index.min(end)..end]);
        story.save(&lang_dir.join(relative))?;
        index += story.len();
    }

    let file_name = format!("{}-{}.idml", file.input.base_name, lang);
    let output = request.output_dir.join(&file_name);
    archive::repackage(&lang_dir, &output)?;
    info!("Wrote {}", output.display());

    Ok(OutputLink {
        language: lang.to_string(),
        file_name,
        path: output,
    })
}
