use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::SubtitleMode;
use crate::lang::{Language, UiLanguage};

/// A produced subtitle artifact, as surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleFileInfo {
    pub path: PathBuf,
    pub language_id: String,
    pub display_name: String,
}

/// Monotonic progress handle. The pipeline reports through this; the task
/// owns the underlying counter, so nothing inside the pipeline points back
/// at the task.
#[derive(Clone)]
pub struct ProgressSink {
    pct: Arc<AtomicU8>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self {
            pct: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Record progress. Regressions are ignored so the percentage is
    /// non-decreasing no matter how stages interleave.
    pub fn report(&self, pct: u8) {
        self.pct.fetch_max(pct, Ordering::SeqCst);
    }

    pub fn get(&self) -> u8 {
        self.pct.load(Ordering::SeqCst)
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task state. Created before the pipeline runs, mutated only through
/// the progress sink and `add_subtitle_infos` until completion.
pub struct Task {
    pub task_id: String,
    pub base_path: PathBuf,
    pub origin_lang: Language,
    pub target_lang: Language,
    pub mode: SubtitleMode,
    pub enable_modal_filter: bool,
    pub max_words_per_line: usize,
    pub ui_language: UiLanguage,
    progress: ProgressSink,
    subtitle_infos: Mutex<Vec<SubtitleFileInfo>>,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: impl Into<String>,
        base_path: PathBuf,
        origin_lang: Language,
        target_lang: Language,
        mode: SubtitleMode,
        enable_modal_filter: bool,
        max_words_per_line: usize,
        ui_language: UiLanguage,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            base_path,
            origin_lang,
            target_lang,
            mode,
            enable_modal_filter,
            max_words_per_line,
            ui_language,
            progress: ProgressSink::new(),
            subtitle_infos: Mutex::new(Vec::new()),
        }
    }

    pub fn progress_sink(&self) -> ProgressSink {
        self.progress.clone()
    }

    pub fn process_pct(&self) -> u8 {
        self.progress.get()
    }

    pub fn add_subtitle_infos(&self, infos: Vec<SubtitleFileInfo>) {
        self.subtitle_infos.lock().unwrap().extend(infos);
    }

    pub fn subtitle_infos(&self) -> Vec<SubtitleFileInfo> {
        self.subtitle_infos.lock().unwrap().clone()
    }
}

/// Process-wide task map.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, task: Task) -> Arc<Task> {
        let task = Arc::new(task);
        self.tasks
            .write()
            .unwrap()
            .insert(task.task_id.clone(), task.clone());
        task
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.read().unwrap().get(task_id).cloned()
    }

    pub fn update_progress(&self, task_id: &str, pct: u8) {
        if let Some(task) = self.get(task_id) {
            task.progress.report(pct);
        }
    }

    pub fn list(&self) -> Vec<Arc<Task>> {
        self.tasks.read().unwrap().values().cloned().collect()
    }
}
