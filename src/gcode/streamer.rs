//! Lazy, forward-only G-code line source.
//!
//! A raw line is split at the first `;`: the text before it is the command,
//! the text after it the comment. A line is *countable* when its command part
//! is not blank. Only countable lines are produced, counted and skipped on
//! resume, so `total`, `sent` and the resume position all share one unit.

use super::GCodeError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const COMMENT_DELIMITER: char = ';';

/// A countable line ready to be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GCodeLine {
    /// 1-based position among the countable lines of the file.
    pub ordinal: usize,
    pub text: String,
    pub comment: Option<String>,
}

/// Splits a raw line into command text and optional comment.
///
/// Only the line terminator is removed; whitespace inside the command is kept
/// as written (`"G1 X10 ;move right"` yields `"G1 X10 "`).
pub fn split_line(raw: &str) -> (&str, Option<&str>) {
    let raw = raw.trim_end_matches(['\n', '\r']);
    match raw.split_once(COMMENT_DELIMITER) {
        Some((command, comment)) => {
            let comment = comment.trim_end();
            (command, (!comment.is_empty()).then_some(comment))
        }
        None => (raw, None),
    }
}

pub fn is_countable(raw: &str) -> bool {
    !split_line(raw).0.trim().is_empty()
}

/// First pass: number of countable lines in the file.
pub fn count_lines(path: &Path) -> Result<usize, GCodeError> {
    let file = open_file(path)?;
    count_lines_in(BufReader::new(file)).map_err(|source| GCodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn count_lines_in<R: BufRead>(mut reader: R) -> std::io::Result<usize> {
    let mut buf = Vec::new();
    let mut total = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(total);
        }
        if is_countable(&String::from_utf8_lossy(&buf)) {
            total += 1;
        }
    }
}

fn open_file(path: &Path) -> Result<File, GCodeError> {
    File::open(path).map_err(|source| GCodeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Second pass: yields countable lines, optionally starting after a resume point.
pub struct GCodeStreamer {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    ordinal: usize,
    exhausted: bool,
}

impl GCodeStreamer {
    /// Opens `path` and skips the first `resume_line` countable lines.
    pub fn open(path: &Path, resume_line: usize) -> Result<Self, GCodeError> {
        let file = open_file(path)?;
        let mut streamer = Self::from_reader(BufReader::new(file), path.to_path_buf());
        let skipped = streamer.skip_countable(resume_line);
        if skipped < resume_line {
            tracing::warn!(
                "{} has only {} countable lines, cannot resume after line {}",
                path.display(),
                skipped,
                resume_line
            );
        } else if resume_line > 0 {
            tracing::info!("Resuming {} after line {}", path.display(), resume_line);
        }
        Ok(streamer)
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, path: PathBuf) -> Self {
        Self {
            reader: Box::new(reader),
            path,
            ordinal: 0,
            exhausted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordinal of the last line produced or skipped.
    pub fn position(&self) -> usize {
        self.ordinal
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn skip_countable(&mut self, count: usize) -> usize {
        let mut skipped = 0;
        while skipped < count && self.next().is_some() {
            skipped += 1;
        }
        skipped
    }

    fn read_raw(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => Some(String::from_utf8_lossy(&buf).into_owned()),
            Err(e) => {
                tracing::error!("Failed reading {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl Iterator for GCodeStreamer {
    type Item = GCodeLine;

    fn next(&mut self) -> Option<GCodeLine> {
        if self.exhausted {
            return None;
        }
        loop {
            let Some(raw) = self.read_raw() else {
                self.exhausted = true;
                return None;
            };
            let (command, comment) = split_line(&raw);
            if command.trim().is_empty() {
                continue;
            }
            self.ordinal += 1;
            return Some(GCodeLine {
                ordinal: self.ordinal,
                text: command.to_string(),
                comment: comment.map(str::to_string),
            });
        }
    }
}

impl std::fmt::Debug for GCodeStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GCodeStreamer")
            .field("path", &self.path)
            .field("ordinal", &self.ordinal)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
