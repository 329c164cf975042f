use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::transcribe::Transcription;

const CHUNK_PREFIX: &str = "chunk_";
const CHUNK_EXT: &str = "mp3";

/// A fixed-duration slice of the source audio. Chunks carry a dense 0-based
/// index; every file derived from a chunk embeds that index in its name so
/// the merger can restore temporal order.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub audio_path: PathBuf,
    pub transcription: Option<Transcription>,
    pub split_path: Option<PathBuf>,
}

impl Chunk {
    pub fn new(index: usize, audio_path: PathBuf) -> Self {
        Self {
            index,
            audio_path,
            transcription: None,
            split_path: None,
        }
    }
}

/// Cut `audio_path` into `chunk_000.mp3`, `chunk_001.mp3`, … of at most
/// `chunk_secs` seconds each, written into `out_dir`.
pub async fn split_audio(audio_path: &Path, chunk_secs: u64, out_dir: &Path) -> Result<Vec<Chunk>> {
    let pattern = out_dir.join(format!("{CHUNK_PREFIX}%03d.{CHUNK_EXT}"));
    info!(audio = %audio_path.display(), chunk_secs, "segmenting audio");

    let output = tokio::process::Command::new("ffmpeg")
        .arg("-i")
        .arg(audio_path)
        .arg("-f")
        .arg("segment")
        .arg("-segment_time")
        .arg(chunk_secs.to_string())
        .arg("-reset_timestamps")
        .arg("1")
        .arg("-y")
        .arg(&pattern)
        .output()
        .await
        .map_err(|e| Error::Segmentation(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Segmentation(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let chunks = collect_chunks(out_dir)?;
    if chunks.is_empty() {
        return Err(Error::Segmentation(format!(
            "no chunks produced in {}",
            out_dir.display()
        )));
    }
    info!(count = chunks.len(), "segmentation produced chunks");
    Ok(chunks)
}

/// List the chunk files in `out_dir` and assign indices in lexicographic
/// order, which equals temporal order for the zero-padded pattern.
fn collect_chunks(out_dir: &Path) -> Result<Vec<Chunk>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(out_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| {
                    name.starts_with(CHUNK_PREFIX) && name.ends_with(&format!(".{CHUNK_EXT}"))
                })
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| Chunk::new(index, path))
        .collect())
}
