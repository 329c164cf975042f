use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::lang::{Language, UiLanguage};

/// LLM provider for the split-and-translate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LlmProvider {
    #[default]
    /// OpenAI API (default)
    Openai,
    /// Anthropic Claude API
    Anthropic,
    /// Google Gemini API
    Google,
    /// Local Ollama server
    Ollama,
    /// DeepSeek API
    Deepseek,
}

/// How the bilingual output stacks its two lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum SubtitleMode {
    /// Only the target-language subtitle matters to the caller
    TargetOnly,
    /// Target language above the original
    BilingualTop,
    #[default]
    /// Original above the target language
    BilingualBottom,
}

#[derive(Parser, Debug)]
#[command(name = "dualsub")]
#[command(version, about = "Generate time-aligned bilingual subtitles from spoken audio")]
pub struct Config {
    /// Input audio file path
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Working directory for chunk and subtitle artifacts
    /// (default: <input stem>_dualsub next to the input)
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Language spoken in the input
    #[arg(long, value_enum, default_value = "english")]
    pub origin_lang: Language,

    /// Language to translate the subtitles into
    #[arg(long, value_enum, default_value = "simplified-chinese")]
    pub target_lang: Language,

    /// Line stacking of the bilingual subtitle
    #[arg(long, value_enum, default_value = "bilingual-bottom")]
    pub subtitle_mode: SubtitleMode,

    /// Ask the translator to drop discourse markers and filler words
    #[arg(long)]
    pub modal_filter: bool,

    /// Chunk duration in minutes (clamped to 1-30)
    #[arg(long, default_value_t = 5)]
    pub segment_duration: u64,

    /// Concurrent translation workers (1-20; invalid values fall back to 4)
    #[arg(long, default_value_t = 4)]
    pub translate_parallel_num: i64,

    /// Reserved; transcription currently runs sequentially
    #[arg(long, default_value_t = 1)]
    pub transcribe_parallel_num: i64,

    /// Upper bound on words per short on-screen line (clamped to 1-200)
    #[arg(long, default_value_t = 12)]
    pub max_sentence_length: i64,

    /// LLM provider for translation
    #[arg(long, value_enum, default_value = "openai", env = "DUALSUB_LLM_PROVIDER")]
    pub llm_provider: LlmProvider,

    /// LLM API base URL (optional, for custom endpoints like Azure OpenAI)
    #[arg(long, env = "DUALSUB_LLM_URL")]
    pub llm_url: Option<String>,

    /// LLM API key for translation
    #[arg(long, env = "DUALSUB_LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// LLM model name for translation
    #[arg(long, env = "DUALSUB_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// Request and parse the JSON translation contract instead of plain text
    #[arg(long)]
    pub llm_json: bool,

    /// whisper.cpp binary used for transcription
    #[arg(long, default_value = "whisper-cli", env = "DUALSUB_WHISPER_BIN")]
    pub whisper_bin: String,

    /// Path to a whisper model file (optional; the binary's default otherwise)
    #[arg(long, env = "DUALSUB_WHISPER_MODEL")]
    pub whisper_model: Option<PathBuf>,

    /// Language for artifact display names
    #[arg(long, value_enum, default_value = "english")]
    pub ui_language: UiLanguage,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Chunk duration in seconds, with the minute knob clamped to 1-30.
    pub fn segment_duration_secs(&self) -> u64 {
        self.segment_duration.clamp(1, 30) * 60
    }

    /// Translation worker count; out-of-range values fall back to 4.
    pub fn translate_parallelism(&self) -> usize {
        if (1..=20).contains(&self.translate_parallel_num) {
            self.translate_parallel_num as usize
        } else {
            4
        }
    }

    /// Words per short line, clamped to 1-200.
    pub fn max_words_per_line(&self) -> usize {
        self.max_sentence_length.clamp(1, 200) as usize
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            let stem = self.input.file_stem().unwrap_or_default().to_string_lossy();
            self.input.with_file_name(format!("{}_dualsub", stem))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(args: &[&str]) -> Config {
        Config::try_parse_from(
            std::iter::once("dualsub").chain(args.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn segment_duration_is_clamped_to_minutes() {
        let config = config_from(&["in.mp3", "--segment-duration", "0"]);
        assert_eq!(config.segment_duration_secs(), 60);
        let config = config_from(&["in.mp3", "--segment-duration", "99"]);
        assert_eq!(config.segment_duration_secs(), 30 * 60);
        let config = config_from(&["in.mp3", "--segment-duration", "5"]);
        assert_eq!(config.segment_duration_secs(), 300);
    }

    #[test]
    fn invalid_parallelism_falls_back_to_four() {
        let config = config_from(&["in.mp3", "--translate-parallel-num", "0"]);
        assert_eq!(config.translate_parallelism(), 4);
        let config = config_from(&["in.mp3", "--translate-parallel-num", "21"]);
        assert_eq!(config.translate_parallelism(), 4);
        let config = config_from(&["in.mp3", "--translate-parallel-num", "7"]);
        assert_eq!(config.translate_parallelism(), 7);
    }

    #[test]
    fn max_words_clamps() {
        let config = config_from(&["in.mp3", "--max-sentence-length", "0"]);
        assert_eq!(config.max_words_per_line(), 1);
        let config = config_from(&["in.mp3", "--max-sentence-length", "500"]);
        assert_eq!(config.max_words_per_line(), 200);
    }

    #[test]
    fn default_work_dir_sits_next_to_input() {
        let config = config_from(&["/media/talk.mp3"]);
        assert_eq!(config.work_dir(), PathBuf::from("/media/talk_dualsub"));
    }
}
