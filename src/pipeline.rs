use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::align::{self, AlignOptions};
use crate::config::SubtitleMode;
use crate::error::{Error, Result};
use crate::lang::{Language, UiLanguage};
use crate::merge;
use crate::segment::{self, Chunk};
use crate::task::{ProgressSink, SubtitleFileInfo};
use crate::transcribe::Transcriber;
use crate::translate::{self, Translator};

/// Attempts per chunk for the transcriber, counting the first call.
pub const TRANSCRIBE_MAX_ATTEMPTS: usize = 3;

/// Everything the pipeline needs to know about a task.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Chunk duration in seconds; also the global-time stride.
    pub chunk_duration_secs: u64,
    pub origin_language: Language,
    pub target_language: Language,
    pub mode: SubtitleMode,
    pub enable_modal_filter: bool,
    /// Whether the Translator speaks the JSON contract.
    pub json_response: bool,
    pub max_words_per_line: usize,
    pub translate_parallelism: usize,
    pub ui_language: UiLanguage,
}

/// Per-task progress accounting: three milestones per chunk, scaled into
/// the 20-90 band.
struct Progress {
    sink: ProgressSink,
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let pct = if self.total == 0 {
            20
        } else {
            20 + 70 * done / self.total
        };
        self.sink.report(pct.clamp(20, 90) as u8);
    }
}

struct TranslateCtx {
    translator: Arc<dyn Translator>,
    target: Language,
    modal_filter: bool,
    json_response: bool,
    base_path: PathBuf,
}

/// Segment the audio and run the whole pipeline for one task: transcribe,
/// split+translate, align, merge, demux. Returns the produced subtitle
/// descriptors in presentation order.
pub async fn generate_subtitles(
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    audio_path: &Path,
    base_path: &Path,
    opts: &PipelineOptions,
    progress: ProgressSink,
    cancel: CancellationToken,
) -> Result<Vec<SubtitleFileInfo>> {
    let chunks = segment::split_audio(audio_path, opts.chunk_duration_secs, base_path).await?;
    progress.report(20);
    let chunk_count = chunks.len();

    run_stages(
        transcriber,
        translator,
        chunks,
        base_path,
        opts,
        progress.clone(),
        cancel,
    )
    .await?;

    let bilingual = merge::merge_all(base_path, chunk_count)?;
    progress.report(90);

    let infos = merge::demux_bilingual(
        base_path,
        &bilingual,
        opts.mode,
        opts.origin_language,
        opts.target_language,
        opts.ui_language,
    )?;
    progress.report(95);
    info!(chunks = chunk_count, "subtitle generation finished");
    Ok(infos)
}

/// Run the three streaming stages over the given chunks.
///
/// Stage T transcribes sequentially, Stage S translates on a bounded worker
/// pool, Stage A aligns sequentially in arrival order. The stages share one
/// cancellation token; the first stage to fail trips it and its error
/// becomes the task result.
pub async fn run_stages(
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    chunks: Vec<Chunk>,
    base_path: &Path,
    opts: &PipelineOptions,
    progress: ProgressSink,
    cancel: CancellationToken,
) -> Result<()> {
    let total = chunks.len() * 3;
    let shared = Arc::new(Progress {
        sink: progress,
        done: AtomicUsize::new(0),
        total,
    });
    let parallelism = opts.translate_parallelism.max(1);
    let capacity = chunks.len().max(parallelism);
    let (tx1, rx1) = mpsc::channel::<Chunk>(capacity);
    let (tx2, rx2) = mpsc::channel::<Chunk>(capacity);
    let semaphore = Arc::new(Semaphore::new(parallelism));

    let align_opts = AlignOptions {
        chunk_duration: opts.chunk_duration_secs as f64,
        origin_language: opts.origin_language,
        max_words_per_line: opts.max_words_per_line,
        mode: opts.mode,
    };
    let translate_ctx = Arc::new(TranslateCtx {
        translator,
        target: opts.target_language,
        modal_filter: opts.enable_modal_filter,
        json_response: opts.json_response,
        base_path: base_path.to_path_buf(),
    });

    let mut stages: JoinSet<Result<()>> = JoinSet::new();
    stages.spawn(transcription_stage(
        transcriber,
        chunks,
        opts.origin_language,
        base_path.to_path_buf(),
        tx1,
        cancel.clone(),
        shared.clone(),
    ));
    stages.spawn(translation_stage(
        translate_ctx,
        rx1,
        tx2,
        semaphore,
        cancel.clone(),
        shared.clone(),
    ));
    stages.spawn(alignment_stage(
        rx2,
        align_opts,
        base_path.to_path_buf(),
        cancel.clone(),
        shared,
    ));

    let mut first_error: Option<Error> = None;
    while let Some(joined) = stages.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(Error::Panic(e.to_string())));
        if let Err(e) = result {
            cancel.cancel();
            let replace = match &first_error {
                None => true,
                Some(f) => f.is_cancelled() && !e.is_cancelled(),
            };
            if replace {
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Stage T: transcribe chunks one at a time, with a bounded retry per
/// chunk, then hand them to the translation queue. Dropping the sender on
/// return closes the queue.
async fn transcription_stage(
    transcriber: Arc<dyn Transcriber>,
    chunks: Vec<Chunk>,
    language: Language,
    base_path: PathBuf,
    tx: mpsc::Sender<Chunk>,
    cancel: CancellationToken,
    progress: Arc<Progress>,
) -> Result<()> {
    for mut chunk in chunks {
        let mut failure: Option<Error> = None;
        for attempt in 1..=TRANSCRIBE_MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = transcriber.transcribe(&chunk.audio_path, language.asr_code(), &base_path) => r,
            };
            match result {
                Ok(transcription) => {
                    if transcription.is_empty() {
                        info!(chunk = chunk.index, "transcription is empty");
                    }
                    chunk.transcription = Some(transcription);
                    failure = None;
                    break;
                }
                Err(e) => {
                    warn!(chunk = chunk.index, attempt, error = %e, "transcription attempt failed");
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        progress.tick();
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = tx.send(chunk) => sent.map_err(|_| Error::Cancelled)?,
        }
    }
    Ok(())
}

/// Stage S: pull chunks off the transcription queue and translate them on
/// a semaphore-bounded worker pool. The output queue closes only once every
/// worker has finished, successfully or not.
async fn translation_stage(
    ctx: Arc<TranslateCtx>,
    mut rx: mpsc::Receiver<Chunk>,
    tx: mpsc::Sender<Chunk>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    progress: Arc<Progress>,
) -> Result<()> {
    let mut workers: JoinSet<Result<()>> = JoinSet::new();
    let mut failure: Option<Error> = None;

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => None,
            c = rx.recv() => Some(c),
        };
        let chunk = match received {
            Some(Some(chunk)) => chunk,
            Some(None) => break,
            None => {
                failure = Some(Error::Cancelled);
                break;
            }
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => { failure = Some(Error::Cancelled); break; }
            p = semaphore.clone().acquire_owned() => match p {
                Ok(permit) => permit,
                Err(_) => { failure = Some(Error::Cancelled); break; }
            },
        };

        let ctx = ctx.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        let progress = progress.clone();
        workers.spawn(async move {
            let _permit = permit;
            let mut chunk = chunk;
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = translate::split_and_translate(
                    ctx.translator.as_ref(),
                    &mut chunk,
                    ctx.target,
                    ctx.modal_filter,
                    ctx.json_response,
                    &ctx.base_path,
                ) => r?,
            }
            progress.tick();
            tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                sent = tx.send(chunk) => sent.map_err(|_| Error::Cancelled),
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(Error::Panic(e.to_string())));
        if let Err(e) = result {
            let replace = match &failure {
                None => true,
                Some(f) => f.is_cancelled() && !e.is_cancelled(),
            };
            if replace {
                failure = Some(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Stage A: consume translated chunks in arrival order and write their
/// aligned artifacts. Alignment is chunk-local, so arrival order does not
/// affect the merged result. On failure the queue is drained without
/// processing so no producer stays blocked.
async fn alignment_stage(
    mut rx: mpsc::Receiver<Chunk>,
    opts: AlignOptions,
    base_path: PathBuf,
    cancel: CancellationToken,
    progress: Arc<Progress>,
) -> Result<()> {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => None,
            c = rx.recv() => Some(c),
        };
        let chunk = match received {
            Some(Some(chunk)) => chunk,
            Some(None) => break,
            None => {
                tokio::spawn(async move { while rx.recv().await.is_some() {} });
                return Err(Error::Cancelled);
            }
        };

        let split_path = match &chunk.split_path {
            Some(path) => path.clone(),
            None => {
                tokio::spawn(async move { while rx.recv().await.is_some() {} });
                return Err(Error::Merge(format!(
                    "chunk {} reached alignment without a split file",
                    chunk.index
                )));
            }
        };
        let words = chunk
            .transcription
            .as_ref()
            .map(|t| t.words.as_slice())
            .unwrap_or(&[]);

        if let Err(e) = align::process_chunk(words, &split_path, chunk.index, &base_path, &opts) {
            tokio::spawn(async move { while rx.recv().await.is_some() {} });
            return Err(e);
        }
        progress.tick();
    }
    Ok(())
}
