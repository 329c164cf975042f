use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Format a global time in seconds as `HH:MM:SS,mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, ms)
}

/// Parse an `HH:MM:SS,mmm` timestamp back into seconds.
pub fn parse_timestamp(s: &str) -> Result<f64> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(Error::Merge(format!("invalid timestamp: {s}")));
    }

    let hours: f64 = parts[0]
        .parse()
        .map_err(|_| Error::Merge(format!("invalid hours in timestamp: {s}")))?;
    let mins: f64 = parts[1]
        .parse()
        .map_err(|_| Error::Merge(format!("invalid minutes in timestamp: {s}")))?;

    let sec_parts: Vec<&str> = parts[2].split(',').collect();
    if sec_parts.len() != 2 {
        return Err(Error::Merge(format!("missing milliseconds in timestamp: {s}")));
    }
    let secs: f64 = sec_parts[0]
        .parse()
        .map_err(|_| Error::Merge(format!("invalid seconds in timestamp: {s}")))?;
    let ms: f64 = sec_parts[1]
        .parse()
        .map_err(|_| Error::Merge(format!("invalid milliseconds in timestamp: {s}")))?;

    Ok(hours * 3600.0 + mins * 60.0 + secs + ms / 1000.0)
}

/// Render the `start --> end` line of an SRT block.
pub fn format_time_range(start: f64, end: f64) -> String {
    format!("{} --> {}", format_timestamp(start), format_timestamp(end))
}

/// One record of the untimed split file Stage S produces: a sequence number,
/// the translated sentence, and the origin sentence (stored bracketed on
/// disk). The aligner fills `timestamp` in later.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitBlock {
    pub index: usize,
    pub origin: String,
    pub target: String,
    pub timestamp: String,
}

impl SplitBlock {
    pub fn new(index: usize, origin: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            index,
            origin: origin.into(),
            target: target.into(),
            timestamp: String::new(),
        }
    }
}

/// Parse an untimed split file into its blocks.
///
/// The on-disk format is a repeating 3-line record separated by blank lines:
/// a decimal sequence number, the translated sentence, and the origin
/// sentence wrapped in square brackets.
pub fn parse_split_file(path: &Path) -> Result<Vec<SplitBlock>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;

    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() {
            i += 1;
            continue;
        }
        let Ok(index) = line.parse::<usize>() else {
            i += 1;
            continue;
        };
        if i + 2 >= lines.len() {
            break;
        }
        let target = lines[i + 1].trim().to_string();
        let origin = lines[i + 2]
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        blocks.push(SplitBlock::new(index, origin, target));
        i += 3;
    }

    Ok(blocks)
}

/// A parsed SRT block as it appears on disk: a timestamp line and one or
/// more text lines. The original numbering is discarded; merging assigns a
/// fresh sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub timestamp: String,
    pub lines: Vec<String>,
}

impl RawBlock {
    pub fn start_seconds(&self) -> Result<f64> {
        let start = self
            .timestamp
            .split("-->")
            .next()
            .ok_or_else(|| Error::Merge(format!("invalid timestamp line: {}", self.timestamp)))?;
        parse_timestamp(start)
    }
}

impl fmt::Display for RawBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.timestamp)?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Read every SRT block from a file. Index lines are validated as integers
/// but not kept.
pub fn read_blocks(path: &Path) -> Result<Vec<RawBlock>> {
    let file = File::open(path)?;
    read_blocks_from(BufReader::new(file))
}

pub fn read_blocks_from<R: BufRead>(reader: R) -> Result<Vec<RawBlock>> {
    let mut blocks = Vec::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Index line; tolerate files that omit it.
        let timestamp = if line.parse::<usize>().is_ok() {
            match lines.next() {
                Some(ts) => ts?.trim().to_string(),
                None => break,
            }
        } else if line.contains("-->") {
            line.to_string()
        } else {
            return Err(Error::Merge(format!("unexpected srt line: {line}")));
        };

        if !timestamp.contains("-->") {
            return Err(Error::Merge(format!("invalid timestamp line: {timestamp}")));
        }

        let mut text = Vec::new();
        for line in lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() {
                break;
            }
            text.push(line);
        }

        blocks.push(RawBlock {
            timestamp,
            lines: text,
        });
    }

    Ok(blocks)
}

/// Streaming SRT writer that renumbers blocks as it writes and flushes
/// after each one.
pub struct SrtWriter<W: Write> {
    writer: BufWriter<W>,
    index: usize,
}

impl<W: Write> SrtWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            index: 0,
        }
    }

    /// Write one block with the next sequence number.
    pub fn write_block(&mut self, timestamp: &str, lines: &[&str]) -> Result<()> {
        self.index += 1;
        writeln!(self.writer, "{}", self.index)?;
        writeln!(self.writer, "{}", timestamp)?;
        for line in lines {
            writeln!(self.writer, "{}", line)?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Number of blocks written so far.
    pub fn count(&self) -> usize {
        self.index
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| Error::Merge(format!("failed to finish srt writer: {e}")))
    }
}

impl SrtWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(file))
    }
}
