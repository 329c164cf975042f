use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dualsub::{
    config::Config,
    pipeline::{self, PipelineOptions},
    task::{Task, TaskRegistry},
    transcribe::WhisperCliTranscriber,
    translate::LlmTranslator,
};

fn main() -> ExitCode {
    let config = Config::parse();

    // Set up logging
    let filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    if !config.input.exists() {
        anyhow::bail!("Input file does not exist: {}", config.input.display());
    }

    let work_dir = config.work_dir();
    std::fs::create_dir_all(&work_dir).context("Failed to create working directory")?;
    info!("Processing: {}", config.input.display());
    info!("Working directory: {}", work_dir.display());

    let api_key = config.llm_api_key.as_ref().context(
        "LLM API key required for translation. Set --llm-api-key or DUALSUB_LLM_API_KEY",
    )?;
    let translator = Arc::new(
        LlmTranslator::new(
            config.llm_provider,
            api_key,
            &config.llm_model,
            config.llm_url.as_deref(),
        )
        .context("Failed to build translator")?,
    );
    let transcriber = Arc::new(WhisperCliTranscriber::new(
        config.whisper_bin.clone(),
        config.whisper_model.clone(),
    ));

    let registry = TaskRegistry::new();
    let task_id = format!(
        "{}-{}",
        config.input.file_stem().unwrap_or_default().to_string_lossy(),
        std::process::id()
    );
    let task = registry.create(Task::new(
        task_id,
        work_dir.clone(),
        config.origin_lang,
        config.target_lang,
        config.subtitle_mode,
        config.modal_filter,
        config.max_words_per_line(),
        config.ui_language,
    ));

    let opts = PipelineOptions {
        chunk_duration_secs: config.segment_duration_secs(),
        origin_language: config.origin_lang,
        target_language: config.target_lang,
        mode: config.subtitle_mode,
        enable_modal_filter: config.modal_filter,
        json_response: config.llm_json,
        max_words_per_line: config.max_words_per_line(),
        translate_parallelism: config.translate_parallelism(),
        ui_language: config.ui_language,
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    // Feed the bar from the task's progress counter while the pipeline runs.
    let bar = create_progress_bar("Generating subtitles");
    let bar_progress = task.progress_sink();
    let bar_feeder = {
        let bar = bar.clone();
        tokio::spawn(async move {
            loop {
                bar.set_position(u64::from(bar_progress.get()));
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    };

    let result = pipeline::generate_subtitles(
        transcriber,
        translator,
        &config.input,
        &work_dir,
        &opts,
        task.progress_sink(),
        cancel,
    )
    .await;
    bar_feeder.abort();

    let infos = result.context("Subtitle generation failed")?;
    if let Some(len) = bar.length() {
        bar.set_position(len);
    }
    bar.finish();

    task.add_subtitle_infos(infos);
    for info in task.subtitle_infos() {
        println!("{}: {}", info.display_name, info.path.display());
    }

    info!("Done!");
    Ok(())
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:43}] {percent}%")
            .unwrap()
            .progress_chars("█░"),
    );
    pb.set_message(message.to_string());
    pb
}
