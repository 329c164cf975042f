pub mod align;
pub mod config;
pub mod error;
pub mod lang;
pub mod merge;
pub mod pipeline;
pub mod segment;
pub mod srt;
pub mod task;
pub mod transcribe;
pub mod translate;

pub use config::{Config, LlmProvider, SubtitleMode};
pub use error::{Error, Result};
pub use lang::{Language, UiLanguage};
pub use pipeline::{generate_subtitles, run_stages, PipelineOptions};
pub use segment::Chunk;
pub use task::{ProgressSink, SubtitleFileInfo, Task, TaskRegistry};
pub use transcribe::{Transcriber, Transcription, WhisperCliTranscriber, Word};
pub use translate::{LlmTranslator, Translator};
