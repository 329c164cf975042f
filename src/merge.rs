use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::align;
use crate::config::SubtitleMode;
use crate::error::Result;
use crate::lang::{Language, UiLanguage};
use crate::srt::{read_blocks, SrtWriter};
use crate::task::SubtitleFileInfo;
use crate::translate;

pub const MERGED_SPLIT_FILE: &str = "split.txt";
pub const MERGED_BILINGUAL_FILE: &str = "bilingual.srt";
pub const MERGED_SHORT_MIXED_FILE: &str = "short_mixed.srt";
pub const MERGED_SHORT_ORIGIN_FILE: &str = "short_origin.srt";
pub const ORIGIN_SRT_FILE: &str = "origin.srt";
pub const TARGET_SRT_FILE: &str = "target.srt";
pub const OUTPUT_DIR: &str = "output";
pub const ORIGIN_TEXT_FILE: &str = "origin.txt";
pub const TARGET_TEXT_FILE: &str = "target.txt";

/// The per-chunk files of one family that actually exist, in chunk order.
/// Missing chunks are skipped with a warning; an all-empty result is legal.
fn existing_family_files(
    base_path: &Path,
    chunk_count: usize,
    name_for: impl Fn(usize) -> String,
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for index in 0..chunk_count {
        let path = base_path.join(name_for(index));
        if path.exists() {
            files.push(path);
        } else {
            warn!(chunk = index, path = %path.display(), "skipping missing file for merge");
        }
    }
    files
}

/// Concatenate plain-text files with a newline between them.
fn merge_plain(target: &Path, sources: &[PathBuf]) -> Result<()> {
    let mut out = BufWriter::new(File::create(target)?);
    for source in sources {
        let content = std::fs::read_to_string(source)?;
        out.write_all(content.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Concatenate SRT files, renumbering blocks into a single ascending
/// sequence. Timestamps are already global, so they pass through untouched.
fn merge_srt(target: &Path, sources: &[PathBuf]) -> Result<()> {
    let mut writer = SrtWriter::create(target)?;
    for source in sources {
        for block in read_blocks(source)? {
            let lines: Vec<&str> = block.lines.iter().map(String::as_str).collect();
            writer.write_block(&block.timestamp, &lines)?;
        }
    }
    writer.finish()?;
    Ok(())
}

/// Merge all four per-chunk file families into their task-level artifacts.
/// Returns the merged bilingual SRT path for the demux step.
pub fn merge_all(base_path: &Path, chunk_count: usize) -> Result<PathBuf> {
    let split_files = existing_family_files(base_path, chunk_count, translate::split_file_name);
    merge_plain(&base_path.join(MERGED_SPLIT_FILE), &split_files)?;

    let bilingual_files =
        existing_family_files(base_path, chunk_count, align::bilingual_file_name);
    let bilingual_path = base_path.join(MERGED_BILINGUAL_FILE);
    merge_srt(&bilingual_path, &bilingual_files)?;

    let mixed_files =
        existing_family_files(base_path, chunk_count, align::short_mixed_file_name);
    merge_srt(&base_path.join(MERGED_SHORT_MIXED_FILE), &mixed_files)?;

    let short_files =
        existing_family_files(base_path, chunk_count, align::short_origin_file_name);
    merge_srt(&base_path.join(MERGED_SHORT_ORIGIN_FILE), &short_files)?;

    info!(chunks = chunk_count, "merged chunk artifacts");
    Ok(bilingual_path)
}

/// Split the merged bilingual SRT into single-language SRTs and plain-text
/// transcripts, and describe the produced files for the task.
pub fn demux_bilingual(
    base_path: &Path,
    bilingual_path: &Path,
    mode: SubtitleMode,
    origin_lang: Language,
    target_lang: Language,
    ui_language: UiLanguage,
) -> Result<Vec<SubtitleFileInfo>> {
    let output_dir = base_path.join(OUTPUT_DIR);
    std::fs::create_dir_all(&output_dir)?;

    let origin_srt_path = base_path.join(ORIGIN_SRT_FILE);
    let target_srt_path = base_path.join(TARGET_SRT_FILE);
    let origin_text_path = output_dir.join(ORIGIN_TEXT_FILE);
    let target_text_path = output_dir.join(TARGET_TEXT_FILE);

    let mut origin_srt = SrtWriter::create(&origin_srt_path)?;
    let mut target_srt = SrtWriter::create(&target_srt_path)?;
    let mut origin_text = BufWriter::new(File::create(&origin_text_path)?);
    let mut target_text = BufWriter::new(File::create(&target_text_path)?);

    for block in read_blocks(bilingual_path)? {
        if block.lines.len() < 2 {
            warn!(timestamp = %block.timestamp, "bilingual block is missing a line, skipping");
            continue;
        }
        let (origin_line, target_line) = match mode {
            SubtitleMode::BilingualTop => (&block.lines[1], &block.lines[0]),
            _ => (&block.lines[0], &block.lines[1]),
        };

        origin_srt.write_block(&block.timestamp, &[origin_line])?;
        target_srt.write_block(&block.timestamp, &[target_line])?;
        writeln!(origin_text, "{}", origin_line)?;
        writeln!(target_text, "{}", target_line)?;
    }

    origin_srt.finish()?;
    target_srt.finish()?;
    origin_text.flush()?;
    target_text.flush()?;

    let mut infos = vec![SubtitleFileInfo {
        path: origin_srt_path,
        language_id: origin_lang.code().to_string(),
        display_name: ui_language.subtitle_display_name(origin_lang),
    }];
    infos.push(SubtitleFileInfo {
        path: target_srt_path,
        language_id: target_lang.code().to_string(),
        display_name: ui_language.subtitle_display_name(target_lang),
    });
    if matches!(mode, SubtitleMode::BilingualTop | SubtitleMode::BilingualBottom) {
        infos.push(SubtitleFileInfo {
            path: bilingual_path.to_path_buf(),
            language_id: "bilingual".to_string(),
            display_name: ui_language.bilingual_display_name().to_string(),
        });
    }

    Ok(infos)
}
