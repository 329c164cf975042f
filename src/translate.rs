use std::path::Path;

use async_trait::async_trait;
use llm::{
    builder::{LLMBackend, LLMBuilder},
    chat::ChatMessage,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::LlmProvider;
use crate::error::{Error, Result};
use crate::lang::Language;
use crate::segment::Chunk;

/// Sentinel the model must return for chunks with no meaningful speech.
pub const NO_TEXT_MARKER: &str = "[无文本]";

/// Total attempts for one chunk, counting the first call.
pub const TRANSLATE_MAX_ATTEMPTS: usize = 4;

/// Name of the untimed split file for a chunk.
pub fn split_file_name(index: usize) -> String {
    format!("split_{index}.txt")
}

/// LLM completion port. Implementations may stream internally; the pipeline
/// only sees the final concatenated string.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

fn to_llm_backend(provider: LlmProvider) -> LLMBackend {
    match provider {
        LlmProvider::Openai => LLMBackend::OpenAI,
        LlmProvider::Anthropic => LLMBackend::Anthropic,
        LlmProvider::Google => LLMBackend::Google,
        LlmProvider::Ollama => LLMBackend::Ollama,
        LlmProvider::Deepseek => LLMBackend::DeepSeek,
    }
}

/// Translator backed by an LLM chat provider.
pub struct LlmTranslator {
    client: Box<dyn llm::LLMProvider>,
}

impl LlmTranslator {
    pub fn new(
        provider: LlmProvider,
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
    ) -> Result<Self> {
        let mut builder = LLMBuilder::new()
            .backend(to_llm_backend(provider))
            .api_key(api_key)
            .model(model)
            .system("You are an assistant that helps with subtitle translation.");

        if let Some(url) = base_url {
            builder = builder.base_url(url);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Translate(format!("failed to build LLM client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages = vec![ChatMessage::user().content(prompt).build()];
        let response = self
            .client
            .chat(&messages)
            .await
            .map_err(|e| Error::Translate(format!("chat completion failed: {e}")))?;
        response
            .text()
            .ok_or_else(|| Error::Translate("empty response from LLM".into()))
    }
}

/// Build the sentence-split-and-translate prompt for a chunk transcript.
pub fn split_prompt(target: Language, modal_filter: bool) -> String {
    let filter_rule = if modal_filter {
        "- Remove discourse markers and filler words (um, uh, you know, 那个, 就是) from the original sentences before translating\n"
    } else {
        ""
    };
    format!(
        "Split the following transcript into natural sentences and translate each sentence into {}.\n\
         Rules:\n\
         - Output one record per sentence: a sequence number line, the translated sentence, then the original sentence wrapped in square brackets\n\
         - Separate records with a single blank line\n\
         {}\
         - Keep every original sentence verbatim; do not drop or invent content\n\
         - If the transcript contains no meaningful text, output exactly {}\n\
         - Do not add explanations or notes\n\n",
        target.english_name(),
        filter_rule,
        NO_TEXT_MARKER
    )
}

#[derive(Deserialize)]
struct TranslationItem {
    original_sentence: String,
    translated_sentence: String,
}

#[derive(Deserialize)]
struct TranslationResponse {
    translations: Vec<TranslationItem>,
}

/// Convert a JSON-mode translator response into the 3-line record format.
/// Tolerates markdown code fences around the payload. Returns `None` when
/// the payload does not parse.
pub fn convert_json_response(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest.trim_start();
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }

    let response: TranslationResponse = serde_json::from_str(s).ok()?;
    let mut out = String::new();
    for (i, item) in response.translations.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{}\n[{}]\n\n",
            i + 1,
            item.translated_sentence,
            item.original_sentence
        ));
    }
    Some(out)
}

fn non_whitespace_len(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

/// Validate a split-and-translate response against the chunk transcript.
///
/// Accepts the no-text sentinel only for transcripts shorter than 10
/// non-whitespace characters; otherwise requires at least one well-formed
/// 3-line record and bounds the drift between the concatenated origin
/// sentences and the transcript to 200 characters.
pub fn is_valid_split_content(content: &str, original_text: &str) -> bool {
    if content.contains(NO_TEXT_MARKER) {
        return non_whitespace_len(original_text) < 10;
    }

    if content.trim().is_empty() || original_text.trim().is_empty() {
        return content.trim().is_empty() && original_text.trim().is_empty();
    }

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < 3 {
        return false;
    }

    let mut origin_lines: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() {
            i += 1;
            continue;
        }
        if line.parse::<u64>().is_ok() {
            if i + 2 >= lines.len() {
                warn!("split content truncated mid-record");
                return false;
            }
            let target = lines[i + 1].trim();
            let origin = lines[i + 2]
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']');
            if target.is_empty() || origin.is_empty() {
                warn!("split content record has empty lines");
                return false;
            }
            origin_lines.push(origin);
            i += 3;
        } else {
            i += 1;
        }
    }

    if origin_lines.is_empty() {
        warn!("split content has no records");
        return false;
    }

    let combined: usize = origin_lines.iter().map(|l| non_whitespace_len(l)).sum();
    let original = non_whitespace_len(original_text);
    combined.abs_diff(original) <= 200
}

/// Stage S for one chunk: select a prompt, call the Translator, validate,
/// retry, and persist the untimed split file.
pub async fn split_and_translate(
    translator: &dyn Translator,
    chunk: &mut Chunk,
    target: Language,
    modal_filter: bool,
    json_response: bool,
    base_path: &Path,
) -> Result<()> {
    let split_path = base_path.join(split_file_name(chunk.index));
    let text = chunk
        .transcription
        .as_ref()
        .map(|t| t.text.clone())
        .unwrap_or_default();

    if text.trim().is_empty() {
        std::fs::write(&split_path, "")?;
        chunk.split_path = Some(split_path);
        info!(chunk = chunk.index, "empty transcription, wrote empty split file");
        return Ok(());
    }

    let prompt = split_prompt(target, modal_filter);
    let query = format!("{prompt}{text}");

    let mut failure = Error::Validation {
        chunk: chunk.index,
        attempts: TRANSLATE_MAX_ATTEMPTS,
    };
    for attempt in 1..=TRANSLATE_MAX_ATTEMPTS {
        let raw = match translator.complete(&query).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(chunk = chunk.index, attempt, error = %e, "translation call failed, retrying");
                failure = e;
                continue;
            }
        };

        let content = if json_response {
            match convert_json_response(&raw) {
                Some(content) => content,
                None => {
                    warn!(chunk = chunk.index, attempt, "translator json did not parse, retrying");
                    failure = Error::Validation {
                        chunk: chunk.index,
                        attempts: TRANSLATE_MAX_ATTEMPTS,
                    };
                    continue;
                }
            }
        } else {
            raw
        };

        if is_valid_split_content(&content, &text) {
            std::fs::write(&split_path, &content)?;
            chunk.split_path = Some(split_path);
            return Ok(());
        }

        warn!(chunk = chunk.index, attempt, "invalid split content, retrying");
        failure = Error::Validation {
            chunk: chunk.index,
            attempts: TRANSLATE_MAX_ATTEMPTS,
        };
    }

    Err(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::Transcription;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct ScriptedTranslator {
        responses: Mutex<Vec<Result<String>>>,
    }

    impl ScriptedTranslator {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl Translator for ScriptedTranslator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(Error::Translate("script exhausted".into()));
            }
            responses.remove(0)
        }
    }

    fn chunk_with_text(text: &str) -> Chunk {
        let mut chunk = Chunk::new(0, PathBuf::from("chunk_000.mp3"));
        chunk.transcription = Some(Transcription {
            text: text.to_string(),
            words: Vec::new(),
        });
        chunk
    }

    const VALID: &str = "1\n你好，世界。\n[Hello world, how are you doing today.]\n\n";

    #[test]
    fn valid_content_passes() {
        assert!(is_valid_split_content(
            VALID,
            "Hello world, how are you doing today."
        ));
    }

    #[test]
    fn no_text_marker_requires_short_transcript() {
        assert!(is_valid_split_content(NO_TEXT_MARKER, ""));
        assert!(is_valid_split_content(NO_TEXT_MARKER, "uh hm"));
        let long = "a".repeat(300);
        assert!(!is_valid_split_content(NO_TEXT_MARKER, &long));
    }

    #[test]
    fn length_drift_beyond_200_rejected() {
        let original = "x".repeat(500);
        let content = format!("1\n翻译\n[{}]\n\n", "x".repeat(250));
        assert!(!is_valid_split_content(&content, &original));
        let content = format!("1\n翻译\n[{}]\n\n", "x".repeat(350));
        assert!(is_valid_split_content(&content, &original));
    }

    #[test]
    fn drift_counts_characters_not_bytes() {
        // 150 CJK characters are 450 bytes; a byte count would reject this.
        let original: String = "好".repeat(150);
        let content = format!("1\ntranslation\n[{}]\n\n", "好".repeat(150));
        assert!(is_valid_split_content(&content, &original));
    }

    #[test]
    fn truncated_record_rejected() {
        assert!(!is_valid_split_content("1\nonly target", "some long transcript text"));
    }

    #[test]
    fn record_with_empty_line_rejected() {
        assert!(!is_valid_split_content(
            "1\n\n[Hello world how are you]\n\n",
            "Hello world how are you"
        ));
    }

    #[test]
    fn json_conversion_strips_fences() {
        let raw = "```json\n{\"translations\":[{\"original_sentence\":\"Hello\",\"translated_sentence\":\"你好\"}]}\n```";
        let converted = convert_json_response(raw).unwrap();
        assert_eq!(converted, "1\n你好\n[Hello]\n\n");
    }

    #[test]
    fn json_conversion_rejects_garbage() {
        assert!(convert_json_response("not json at all").is_none());
    }

    #[test]
    fn prompt_names_target_language_and_filter() {
        let plain = split_prompt(Language::SimplifiedChinese, false);
        assert!(plain.contains("Simplified Chinese"));
        assert!(!plain.contains("filler words"));
        let filtered = split_prompt(Language::SimplifiedChinese, true);
        assert!(filtered.contains("filler words"));
        assert!(filtered.contains(NO_TEXT_MARKER));
    }

    #[tokio::test]
    async fn empty_transcription_writes_empty_split_file() {
        let dir = tempfile::tempdir().unwrap();
        let translator = ScriptedTranslator::new(vec![]);
        let mut chunk = chunk_with_text("");
        split_and_translate(
            &translator,
            &mut chunk,
            Language::SimplifiedChinese,
            false,
            false,
            dir.path(),
        )
        .await
        .unwrap();

        let path = chunk.split_path.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
    }

    #[tokio::test]
    async fn invalid_then_valid_response_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let translator = ScriptedTranslator::new(vec![
            Ok("garbage with no records".to_string()),
            Ok(VALID.to_string()),
        ]);
        let mut chunk = chunk_with_text("Hello world, how are you doing today.");
        split_and_translate(
            &translator,
            &mut chunk,
            Language::SimplifiedChinese,
            false,
            false,
            dir.path(),
        )
        .await
        .unwrap();

        let written = std::fs::read_to_string(chunk.split_path.unwrap()).unwrap();
        assert_eq!(written, VALID);
    }

    #[tokio::test]
    async fn persistent_invalid_output_fails_after_four_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let translator = ScriptedTranslator::new(vec![
            Ok("bad".to_string()),
            Ok("bad".to_string()),
            Ok("bad".to_string()),
            Ok("bad".to_string()),
            Ok(VALID.to_string()),
        ]);
        let mut chunk = chunk_with_text("Hello world, how are you doing today.");
        let err = split_and_translate(
            &translator,
            &mut chunk,
            Language::SimplifiedChinese,
            false,
            false,
            dir.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Validation { chunk: 0, attempts: 4 }));
        // The fifth (valid) response must never have been consumed.
        assert_eq!(translator.responses.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_mode_converts_before_validation() {
        let dir = tempfile::tempdir().unwrap();
        let raw = r#"{"translations":[{"original_sentence":"Hello world, how are you doing today.","translated_sentence":"你好，世界。"}]}"#;
        let translator = ScriptedTranslator::new(vec![Ok(raw.to_string())]);
        let mut chunk = chunk_with_text("Hello world, how are you doing today.");
        split_and_translate(
            &translator,
            &mut chunk,
            Language::SimplifiedChinese,
            false,
            true,
            dir.path(),
        )
        .await
        .unwrap();

        let written = std::fs::read_to_string(chunk.split_path.unwrap()).unwrap();
        assert!(written.starts_with("1\n你好，世界。\n[Hello world"));
    }
}
