use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A single recognized word with chunk-local timings.
///
/// `ord` is the word's position within its chunk's transcription and is
/// strictly increasing; the aligner leans on it to recover sentence spans.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub ord: usize,
}

impl Word {
    pub fn new(text: impl Into<String>, start: f64, end: f64, ord: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            ord,
        }
    }
}

/// The speech-to-text result for one chunk. Immutable once produced; an
/// empty `text` means the chunk was silence.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    pub text: String,
    pub words: Vec<Word>,
}

impl Transcription {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Speech-to-text port. Called sequentially by the pipeline, one chunk at a
/// time; implementations must be safe to call back-to-back.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
        work_dir: &Path,
    ) -> Result<Transcription>;
}

/// Transcriber backed by the `whisper-cli` binary (whisper.cpp).
///
/// Runs the binary with word-level segmentation (`-ml 1`) and a JSON output
/// artifact, then folds the per-word segments into a [`Transcription`].
pub struct WhisperCliTranscriber {
    binary: String,
    model_path: Option<PathBuf>,
}

impl WhisperCliTranscriber {
    pub fn new(binary: impl Into<String>, model_path: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            model_path,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: &str,
        work_dir: &Path,
    ) -> Result<Transcription> {
        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chunk".to_string());
        let output_prefix = work_dir.join(format!("{stem}_asr"));

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-f")
            .arg(audio_path)
            .arg("-l")
            .arg(language)
            .arg("-ml")
            .arg("1")
            .arg("-oj")
            .arg("-of")
            .arg(&output_prefix)
            .arg("-np");
        if let Some(model) = &self.model_path {
            cmd.arg("-m").arg(model);
        }

        debug!(binary = %self.binary, audio = %audio_path.display(), "running whisper-cli");
        let output = cmd.output()
            .await
            .map_err(|e| Error::Transcribe(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transcribe(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let json_path = PathBuf::from(format!("{}.json", output_prefix.display()));
        if !json_path.exists() {
            return Err(Error::Transcribe(format!(
                "missing whisper output at {}",
                json_path.display()
            )));
        }

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path)?)
                .map_err(|e| Error::Transcribe(format!("malformed whisper json: {e}")))?;

        Ok(parse_whisper_json(&raw))
    }
}

/// Fold the whisper.cpp JSON artifact into a word sequence. With `-ml 1`
/// each entry of the `transcription` array carries one word and its
/// millisecond offsets.
fn parse_whisper_json(raw: &Value) -> Transcription {
    let Some(items) = raw.get("transcription").and_then(Value::as_array) else {
        warn!("whisper json has no transcription array");
        return Transcription::default();
    };

    let mut words = Vec::new();
    let mut text = String::new();
    for item in items {
        let token = item
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();
        if token.is_empty() {
            continue;
        }
        let start = item
            .pointer("/offsets/from")
            .and_then(Value::as_f64)
            .unwrap_or_default()
            / 1000.0;
        let end = item
            .pointer("/offsets/to")
            .and_then(Value::as_f64)
            .map(|v| v / 1000.0)
            .unwrap_or(start);

        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(token);
        let ord = words.len();
        words.push(Word::new(token, start, end.max(start), ord));
    }

    Transcription { text, words }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_word_level_json() {
        let raw: Value = serde_json::from_str(
            r#"{
                "transcription": [
                    {"text": " Hello", "offsets": {"from": 0, "to": 500}},
                    {"text": " world", "offsets": {"from": 500, "to": 1000}},
                    {"text": "  ", "offsets": {"from": 1000, "to": 1100}}
                ]
            }"#,
        )
        .unwrap();

        let t = parse_whisper_json(&raw);
        assert_eq!(t.text, "Hello world");
        assert_eq!(t.words.len(), 2);
        assert_eq!(t.words[0], Word::new("Hello", 0.0, 0.5, 0));
        assert_eq!(t.words[1], Word::new("world", 0.5, 1.0, 1));
    }

    #[test]
    fn ords_are_dense_after_skipping_blanks() {
        let raw: Value = serde_json::from_str(
            r#"{
                "transcription": [
                    {"text": " a", "offsets": {"from": 0, "to": 100}},
                    {"text": " ", "offsets": {"from": 100, "to": 150}},
                    {"text": " b", "offsets": {"from": 150, "to": 300}}
                ]
            }"#,
        )
        .unwrap();

        let t = parse_whisper_json(&raw);
        let ords: Vec<usize> = t.words.iter().map(|w| w.ord).collect();
        assert_eq!(ords, vec![0, 1]);
    }

    #[test]
    fn missing_transcription_array_is_silence() {
        let raw: Value = serde_json::from_str(r#"{"result": {}}"#).unwrap();
        let t = parse_whisper_json(&raw);
        assert!(t.is_empty());
        assert!(t.words.is_empty());
    }
}
