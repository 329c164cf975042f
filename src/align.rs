use std::path::Path;

use tracing::debug;

use crate::config::SubtitleMode;
use crate::error::Result;
use crate::lang::Language;
use crate::srt::{format_time_range, parse_split_file, SplitBlock, SrtWriter};
use crate::transcribe::Word;
use crate::translate::NO_TEXT_MARKER;

pub fn bilingual_file_name(index: usize) -> String {
    format!("bilingual_{index}.srt")
}

pub fn short_mixed_file_name(index: usize) -> String {
    format!("short_mixed_{index}.srt")
}

pub fn short_origin_file_name(index: usize) -> String {
    format!("short_origin_{index}.srt")
}

/// Alignment parameters shared by every chunk of a task.
#[derive(Debug, Clone)]
pub struct AlignOptions {
    /// Nominal chunk duration in seconds; also the global-time stride.
    pub chunk_duration: f64,
    pub origin_language: Language,
    pub max_words_per_line: usize,
    pub mode: SubtitleMode,
}

/// A re-segmented slice of an origin sentence with its own global timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortLine {
    pub timestamp: String,
    pub text: String,
}

/// One sentence block with its recovered timestamp and short-line split.
#[derive(Debug, Clone)]
pub struct AlignedBlock {
    pub block: SplitBlock,
    pub short_lines: Vec<ShortLine>,
}

/// A sentence token paired with the transcription word it matched, if any.
#[derive(Debug, Clone)]
struct TokenMatch {
    token: String,
    word: Option<Word>,
}

/// Split a space-delimited sentence into word tokens, shedding punctuation.
/// Apostrophes stay so contractions survive intact.
fn split_sentence(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reduce a character-based sentence to its recognizable graphemes, one
/// token per character.
fn recognizable_chars(sentence: &str) -> Vec<String> {
    sentence
        .chars()
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_string())
        .collect()
}

fn text_matches(word: &str, token: &str) -> bool {
    word.to_lowercase() == token.to_lowercase()
}

/// For each token, scan the word stream for the first case-insensitive match
/// whose start does not precede the watermark.
fn collect_spaced_matches(words: &[Word], tokens: &[String], last_ts: f64) -> Vec<TokenMatch> {
    tokens
        .iter()
        .map(|token| {
            let word = words
                .iter()
                .find(|w| text_matches(&w.text, token) && w.start >= last_ts)
                .cloned();
            TokenMatch {
                token: token.clone(),
                word,
            }
        })
        .collect()
}

/// Longest run of matches whose `ord`s are contiguously increasing.
/// Returns the half-open `[begin, end)` range into `matches`.
fn longest_contiguous_run(matches: &[TokenMatch]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut cur_start = 0;
    let mut cur_len = 0;
    let mut prev_ord: Option<usize> = None;

    for (i, m) in matches.iter().enumerate() {
        match (&m.word, prev_ord) {
            (Some(w), Some(p)) if w.ord == p + 1 => {
                cur_len += 1;
                prev_ord = Some(w.ord);
            }
            (Some(w), _) => {
                cur_start = i;
                cur_len = 1;
                prev_ord = Some(w.ord);
            }
            (None, _) => {
                cur_len = 0;
                prev_ord = None;
            }
        }
        if cur_len > best.map_or(0, |(s, e)| e - s) {
            best = Some((cur_start, cur_start + cur_len));
        }
    }

    best
}

/// Walk outward from the run, adopting neighbor words that match the still
/// unmatched tokens, then pull the boundary to the sentence edge when the
/// `ord` gap is small.
fn extend_run(
    words: &[Word],
    matches: &mut [TokenMatch],
    begin: usize,
    end: usize,
) -> (Word, Word) {
    let mut begin_word = matches[begin].word.clone().expect("run starts on a match");
    let mut end_word = matches[end - 1].word.clone().expect("run ends on a match");

    let mut i = begin as i64 - 1;
    let mut j = begin_word.ord as i64 - 1;
    while i >= 0 && j >= 0 {
        let word = &words[j as usize];
        if text_matches(&word.text, &matches[i as usize].token) {
            begin_word = word.clone();
            matches[i as usize].word = Some(word.clone());
        } else {
            break;
        }
        i -= 1;
        j -= 1;
    }

    let mut i = end;
    let mut j = end_word.ord + 1;
    while i < matches.len() && j < words.len() {
        let word = &words[j];
        if text_matches(&word.text, &matches[i].token) {
            end_word = word.clone();
            matches[i].word = Some(word.clone());
        } else {
            break;
        }
        i += 1;
        j += 1;
    }

    if let Some(first) = matches.first().and_then(|m| m.word.clone()) {
        if begin_word.ord > first.ord && begin_word.ord - first.ord < 10 {
            begin_word = first;
        }
    }
    if let Some(last) = matches.last().and_then(|m| m.word.clone()) {
        if last.ord > end_word.ord && last.ord - end_word.ord < 10 {
            end_word = last;
        }
    }

    (begin_word, end_word)
}

/// Every word matching a grapheme token (exact or prefix) at or after the
/// watermark, in token-scan order. Words may repeat.
fn collect_char_candidates(words: &[Word], tokens: &[String], last_ts: f64) -> Vec<Word> {
    let mut candidates = Vec::new();
    for token in tokens {
        for word in words {
            let hit = text_matches(&word.text, token)
                || word.text.to_lowercase().starts_with(&token.to_lowercase());
            if hit && word.start >= last_ts {
                candidates.push(word.clone());
            }
        }
    }
    candidates
}

/// Longest subsequence of candidates with strictly increasing `ord`,
/// reconstructed via parent pointers.
fn longest_increasing_path(candidates: &[Word]) -> Vec<Word> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let n = candidates.len();
    let mut dp = vec![1usize; n];
    let mut prev = vec![usize::MAX; n];
    let mut best_end = 0;

    for i in 1..n {
        for j in 0..i {
            if candidates[i].ord > candidates[j].ord && dp[j] + 1 > dp[i] {
                dp[i] = dp[j] + 1;
                prev[i] = j;
            }
        }
        if dp[i] > dp[best_end] {
            best_end = i;
        }
    }

    let mut path = Vec::with_capacity(dp[best_end]);
    let mut idx = best_end;
    loop {
        path.push(candidates[idx].clone());
        if prev[idx] == usize::MAX {
            break;
        }
        idx = prev[idx];
    }
    path.reverse();
    path
}

/// The aligned span of one sentence: chunk-local times plus the token
/// matches that feed short-line re-segmentation.
struct SentenceSpan {
    start: f64,
    end: f64,
    matches: Vec<TokenMatch>,
}

/// Reproject one origin sentence onto the word stream. Returns the span and
/// the advanced watermark, or `None` when no aligned run exists.
fn sentence_span(
    words: &[Word],
    sentence: &str,
    last_ts: f64,
    language: Language,
) -> Option<(SentenceSpan, f64)> {
    let (begin_word, end_word, matches) = if language.is_space_delimited() {
        let tokens = split_sentence(sentence);
        if tokens.is_empty() {
            return None;
        }
        let mut matches = collect_spaced_matches(words, &tokens, last_ts);
        let (begin, end) = longest_contiguous_run(&matches)?;
        let (begin_word, end_word) = if end - begin == matches.len() {
            (
                matches[begin].word.clone().expect("run starts on a match"),
                matches[end - 1].word.clone().expect("run ends on a match"),
            )
        } else {
            extend_run(words, &mut matches, begin, end)
        };
        (begin_word, end_word, matches)
    } else {
        let tokens = recognizable_chars(sentence);
        if tokens.is_empty() {
            return None;
        }
        let candidates = collect_char_candidates(words, &tokens, last_ts);
        let path = longest_increasing_path(&candidates);
        if path.is_empty() {
            return None;
        }
        let begin_word = path.first().cloned().expect("path is non-empty");
        let end_word = path.last().cloned().expect("path is non-empty");
        let matches = path
            .into_iter()
            .map(|w| TokenMatch {
                token: w.text.clone(),
                word: Some(w),
            })
            .collect();
        (begin_word, end_word, matches)
    };

    let start = begin_word.start.max(last_ts);
    let end = end_word.end;
    let new_last = if end > last_ts { end } else { last_ts };

    Some((
        SentenceSpan {
            start,
            end,
            matches,
        },
        new_last,
    ))
}

/// Short-line width for a sentence of `count` matched words.
fn line_width(count: usize, max_per_line: usize) -> usize {
    if count <= max_per_line {
        count
    } else if count <= 2 * max_per_line {
        count / 2 + 1
    } else if count <= 3 * max_per_line {
        count / 3 + 1
    } else if count <= 4 * max_per_line {
        count / 4 + 1
    } else if count <= 5 * max_per_line {
        count / 5 + 1
    } else {
        max_per_line
    }
}

/// Cut the matched words into short lines of `width` words. Line starts are
/// clamped to the previous line's end and the span start; a candidate start
/// word ending past the span end is rejected and the scan advances.
fn resegment(
    matches: &[TokenMatch],
    span_start: f64,
    span_end: f64,
    width: usize,
    spaced: bool,
) -> Vec<(f64, f64, String)> {
    let mut lines = Vec::new();
    let mut text = String::new();
    let mut in_line = 0usize;
    let mut line_start = span_start;
    let mut line_end = span_start;
    let mut prev_end = span_start;

    for m in matches {
        if spaced && !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&m.token);

        if in_line == 0 {
            let (s, e) = match &m.word {
                Some(w) if w.end > span_end => continue,
                Some(w) => (
                    w.start.max(prev_end).max(span_start),
                    w.end.min(span_end),
                ),
                None => (prev_end, prev_end),
            };
            line_start = s;
            line_end = e.max(s);
            in_line = 1;
        } else {
            if let Some(w) = &m.word {
                let capped = w.end.min(span_end);
                if capped > line_end {
                    line_end = capped;
                }
            }
            in_line += 1;
        }

        if in_line >= width {
            lines.push((line_start, line_end, std::mem::take(&mut text)));
            prev_end = line_end;
            in_line = 0;
        }
    }

    if !text.trim().is_empty() {
        if in_line > 0 {
            lines.push((line_start, line_end, text));
        } else {
            lines.push((prev_end, span_end.max(prev_end), text));
        }
    }

    lines
}

/// Align every block of a chunk against its word stream, producing timed
/// blocks and their short-line splits in block order. Blocks that cannot be
/// aligned are dropped; the watermark survives them.
pub fn align_blocks(
    words: &[Word],
    blocks: &[SplitBlock],
    chunk_index: usize,
    opts: &AlignOptions,
) -> Vec<AlignedBlock> {
    let offset = chunk_index as f64 * opts.chunk_duration;
    let mut aligned = Vec::new();
    let mut last_ts = 0.0f64;

    for block in blocks {
        if block.origin.trim().is_empty() {
            continue;
        }

        let Some((span, new_last)) =
            sentence_span(words, &block.origin, last_ts, opts.origin_language)
        else {
            debug!(chunk = chunk_index, block = block.index, "no aligned run, skipping block");
            continue;
        };

        // Clamp to the chunk and order the endpoints. The start is already
        // watermark-clamped, so a shorter end collapses the block instead of
        // letting its start regress.
        let start = span.start.min(opts.chunk_duration);
        let end = span.end.min(opts.chunk_duration).max(start);

        let mut timed = block.clone();
        timed.timestamp = format_time_range(start + offset, end + offset);

        let count = span.matches.len();
        let short_lines = if count <= opts.max_words_per_line {
            vec![ShortLine {
                timestamp: timed.timestamp.clone(),
                text: block.origin.clone(),
            }]
        } else {
            let width = line_width(count, opts.max_words_per_line);
            resegment(
                &span.matches,
                start,
                end,
                width,
                opts.origin_language.is_space_delimited(),
            )
            .into_iter()
            .map(|(s, e, text)| ShortLine {
                timestamp: format_time_range(s + offset, e + offset),
                text: text.trim_end().to_string(),
            })
            .collect()
        };

        last_ts = new_last.min(opts.chunk_duration);
        aligned.push(AlignedBlock {
            block: timed,
            short_lines,
        });
    }

    aligned
}

/// Write the three per-chunk SRT artifacts for an aligned chunk.
pub fn write_chunk_outputs(
    base_path: &Path,
    chunk_index: usize,
    aligned: &[AlignedBlock],
    mode: SubtitleMode,
) -> Result<()> {
    let mut bilingual = SrtWriter::create(&base_path.join(bilingual_file_name(chunk_index)))?;
    let mut mixed = SrtWriter::create(&base_path.join(short_mixed_file_name(chunk_index)))?;
    let mut short = SrtWriter::create(&base_path.join(short_origin_file_name(chunk_index)))?;

    for item in aligned {
        let block = &item.block;
        let lines: [&str; 2] = match mode {
            SubtitleMode::BilingualTop => [&block.target, &block.origin],
            _ => [&block.origin, &block.target],
        };
        bilingual.write_block(&block.timestamp, &lines)?;

        mixed.write_block(&block.timestamp, &[&block.target])?;
        for line in &item.short_lines {
            mixed.write_block(&line.timestamp, &[&line.text])?;
            short.write_block(&line.timestamp, &[&line.text])?;
        }
    }

    bilingual.finish()?;
    mixed.finish()?;
    short.finish()?;
    Ok(())
}

/// Stage A for one chunk: load the untimed split file, align its blocks,
/// and write the per-chunk artifacts. A chunk marked as having no text
/// contributes nothing.
pub fn process_chunk(
    words: &[Word],
    split_path: &Path,
    chunk_index: usize,
    base_path: &Path,
    opts: &AlignOptions,
) -> Result<()> {
    let content = std::fs::read_to_string(split_path)?;
    if content.contains(NO_TEXT_MARKER) {
        return Ok(());
    }

    let blocks = parse_split_file(split_path)?;
    if blocks.is_empty() {
        return Ok(());
    }

    let aligned = align_blocks(words, &blocks, chunk_index, opts);
    write_chunk_outputs(base_path, chunk_index, &aligned, opts.mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(text: &str, start: f64, end: f64, ord: usize) -> Word {
        Word::new(text, start, end, ord)
    }

    fn english_words() -> Vec<Word> {
        vec![
            w("hello", 0.0, 0.5, 0),
            w("world", 0.5, 1.0, 1),
            w("how", 1.0, 1.3, 2),
            w("are", 1.3, 1.5, 3),
            w("you", 1.5, 1.8, 4),
            w("doing", 1.8, 2.2, 5),
            w("today", 2.2, 2.6, 6),
        ]
    }

    fn opts(language: Language, max_words: usize) -> AlignOptions {
        AlignOptions {
            chunk_duration: 60.0,
            origin_language: language,
            max_words_per_line: max_words,
            mode: SubtitleMode::BilingualBottom,
        }
    }

    #[test]
    fn three_english_sentences_recover_spans() {
        let blocks = vec![
            SplitBlock::new(1, "Hello world", "你好，世界"),
            SplitBlock::new(2, "How are you", "你好吗"),
            SplitBlock::new(3, "Doing today", "今天过得"),
        ];
        let aligned = align_blocks(&english_words(), &blocks, 0, &opts(Language::English, 5));

        assert_eq!(aligned.len(), 3);
        assert_eq!(
            aligned[0].block.timestamp,
            "00:00:00,000 --> 00:00:01,000"
        );
        assert_eq!(
            aligned[1].block.timestamp,
            "00:00:01,000 --> 00:00:01,800"
        );
        assert_eq!(
            aligned[2].block.timestamp,
            "00:00:01,800 --> 00:00:02,600"
        );
        // Every sentence fits one short line.
        assert_eq!(aligned[0].short_lines.len(), 1);
        assert_eq!(aligned[0].short_lines[0].text, "Hello world");
    }

    #[test]
    fn second_chunk_gets_global_offset() {
        let blocks = vec![SplitBlock::new(1, "Hello world", "你好")];
        let aligned = align_blocks(&english_words(), &blocks, 2, &opts(Language::English, 5));
        assert_eq!(
            aligned[0].block.timestamp,
            "00:02:00,000 --> 00:02:01,000"
        );
    }

    #[test]
    fn watermark_never_regresses() {
        // Second block repeats words from before the watermark; its earliest
        // candidates are skipped and the block is clamped forward.
        let words = vec![
            w("go", 0.0, 0.4, 0),
            w("on", 0.4, 0.8, 1),
            w("go", 2.0, 2.4, 2),
            w("on", 2.4, 2.8, 3),
        ];
        let blocks = vec![
            SplitBlock::new(1, "go on", "继续"),
            SplitBlock::new(2, "go on", "继续"),
        ];
        let aligned = align_blocks(&words, &blocks, 0, &opts(Language::English, 5));
        assert_eq!(aligned.len(), 2);
        let first_end = aligned[0].block.timestamp.clone();
        assert_eq!(first_end, "00:00:00,000 --> 00:00:00,800");
        assert_eq!(aligned[1].block.timestamp, "00:00:02,000 --> 00:00:02,800");
    }

    #[test]
    fn unmatchable_block_is_skipped_and_watermark_kept() {
        let blocks = vec![
            SplitBlock::new(1, "Hello world", "你好"),
            SplitBlock::new(2, "completely unrelated gibberish", "乱码"),
            SplitBlock::new(3, "How are you", "你好吗"),
        ];
        let aligned = align_blocks(&english_words(), &blocks, 0, &opts(Language::English, 5));
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[1].block.origin, "How are you");
        assert_eq!(aligned[1].block.timestamp, "00:00:01,000 --> 00:00:01,800");
    }

    #[test]
    fn empty_origin_blocks_are_ignored() {
        let blocks = vec![SplitBlock::new(1, "", "空")];
        let aligned = align_blocks(&english_words(), &blocks, 0, &opts(Language::English, 5));
        assert!(aligned.is_empty());
    }

    #[test]
    fn contiguous_run_beats_scattered_matches() {
        let matches = vec![
            TokenMatch { token: "a".into(), word: Some(w("a", 0.0, 0.1, 7)) },
            TokenMatch { token: "b".into(), word: Some(w("b", 0.1, 0.2, 2)) },
            TokenMatch { token: "c".into(), word: Some(w("c", 0.2, 0.3, 3)) },
            TokenMatch { token: "d".into(), word: Some(w("d", 0.3, 0.4, 4)) },
            TokenMatch { token: "e".into(), word: None },
            TokenMatch { token: "f".into(), word: Some(w("f", 0.5, 0.6, 9)) },
        ];
        assert_eq!(longest_contiguous_run(&matches), Some((1, 4)));
    }

    #[test]
    fn run_of_nothing_is_none() {
        let matches = vec![
            TokenMatch { token: "a".into(), word: None },
            TokenMatch { token: "b".into(), word: None },
        ];
        assert_eq!(longest_contiguous_run(&matches), None);
    }

    #[test]
    fn increasing_path_jumps_gaps() {
        let candidates = vec![
            w("好", 0.0, 0.2, 5),
            w("你", 0.0, 0.1, 0),
            w("好", 0.2, 0.4, 1),
            w("吗", 0.4, 0.6, 3),
        ];
        let path = longest_increasing_path(&candidates);
        let ords: Vec<usize> = path.iter().map(|p| p.ord).collect();
        assert_eq!(ords, vec![0, 1, 3]);
    }

    #[test]
    fn line_width_table() {
        let max = 8;
        assert_eq!(line_width(8, max), 8);
        assert_eq!(line_width(12, max), 7); // 12/2 + 1
        assert_eq!(line_width(20, max), 7); // 20/3 + 1
        assert_eq!(line_width(30, max), 8); // 30/4 + 1
        assert_eq!(line_width(38, max), 8); // 38/5 + 1
        assert_eq!(line_width(100, max), 8);
    }

    #[test]
    fn long_chinese_sentence_partitions_into_short_lines() {
        // 30 graphemes, one word per grapheme, 0.1s apiece.
        let sentence: String = (0..30u32)
            .map(|i| char::from_u32(0x4E00 + i).unwrap())
            .collect();
        let words: Vec<Word> = sentence
            .chars()
            .enumerate()
            .map(|(i, c)| w(&c.to_string(), i as f64 * 0.1, (i + 1) as f64 * 0.1, i))
            .collect();
        let blocks = vec![SplitBlock::new(1, sentence.clone(), "translation")];

        let aligned = align_blocks(&words, &blocks, 0, &opts(Language::SimplifiedChinese, 8));
        assert_eq!(aligned.len(), 1);
        let lines = &aligned[0].short_lines;
        // width = 30/4 + 1 = 8 -> lines of 8, 8, 8, 6.
        assert_eq!(lines.len(), 4);
        let joined: String = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(joined, sentence);

        // Line spans partition the block's interval.
        let span = &aligned[0].block.timestamp;
        assert_eq!(lines[0].timestamp[..12], span[..12]);
        assert_eq!(lines[3].timestamp[17..], span[17..]);
        for pair in lines.windows(2) {
            assert_eq!(pair[0].timestamp[17..], pair[1].timestamp[..12]);
        }
    }

    #[test]
    fn max_words_one_still_uses_width_table() {
        let blocks = vec![SplitBlock::new(1, "hello world how", "你好")];
        let aligned = align_blocks(&english_words(), &blocks, 0, &opts(Language::English, 1));
        assert_eq!(aligned.len(), 1);
        // width = 3/3 + 1 = 2 per the table; three words make two lines.
        assert_eq!(aligned[0].short_lines.len(), 2);
    }

    #[test]
    fn extension_pulls_in_adjacent_matches() {
        // Only "are" passes the scan (others precede the watermark candidates
        // by construction), so the run extends left and right afterwards.
        let words = vec![
            w("how", 1.0, 1.3, 0),
            w("are", 1.3, 1.5, 1),
            w("you", 1.5, 1.8, 2),
        ];
        let tokens = vec!["how".to_string(), "are".to_string(), "you".to_string()];
        let mut matches = collect_spaced_matches(&words, &tokens, 0.0);
        // Simulate a degraded scan that lost the neighbors.
        matches[0].word = None;
        matches[2].word = None;
        let (begin, end) = longest_contiguous_run(&matches).unwrap();
        let (begin_word, end_word) = extend_run(&words, &mut matches, begin, end);
        assert_eq!(begin_word.ord, 0);
        assert_eq!(end_word.ord, 2);
    }

    #[test]
    fn process_chunk_honors_no_text_marker() {
        let dir = tempfile::tempdir().unwrap();
        let split = dir.path().join("split_0.txt");
        std::fs::write(&split, NO_TEXT_MARKER).unwrap();
        process_chunk(&[], &split, 0, dir.path(), &opts(Language::English, 5)).unwrap();
        assert!(!dir.path().join(bilingual_file_name(0)).exists());
    }

    #[test]
    fn process_chunk_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let split = dir.path().join("split_0.txt");
        std::fs::write(&split, "1\n你好，世界\n[Hello world]\n\n").unwrap();
        process_chunk(
            &english_words(),
            &split,
            0,
            dir.path(),
            &opts(Language::English, 5),
        )
        .unwrap();

        let bilingual =
            std::fs::read_to_string(dir.path().join(bilingual_file_name(0))).unwrap();
        assert!(bilingual.contains("1\n00:00:00,000 --> 00:00:01,000\nHello world\n你好，世界\n"));
        assert!(dir.path().join(short_mixed_file_name(0)).exists());
        assert!(dir.path().join(short_origin_file_name(0)).exists());
    }

    #[test]
    fn bilingual_top_swaps_line_order() {
        let dir = tempfile::tempdir().unwrap();
        let aligned = {
            let blocks = vec![SplitBlock::new(1, "Hello world", "你好，世界")];
            align_blocks(&english_words(), &blocks, 0, &opts(Language::English, 5))
        };
        write_chunk_outputs(dir.path(), 0, &aligned, SubtitleMode::BilingualTop).unwrap();
        let bilingual =
            std::fs::read_to_string(dir.path().join(bilingual_file_name(0))).unwrap();
        assert!(bilingual.contains("\n你好，世界\nHello world\n"));
    }
}
