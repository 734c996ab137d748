//! File context for `-F/--file`: files rendered as `<file path="...">` blocks
//! that precede the prompt.
//!
//! Paths are confined to the base directory. Directories contribute their
//! direct, non-hidden files. Binary and oversized files are skipped with a
//! warning; the total is capped.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::{AiError, Result};

pub const MAX_FILE_SIZE: u64 = 1024 * 1024;
pub const MAX_TOTAL_SIZE: u64 = 5 * 1024 * 1024;
const SNIFF_LEN: usize = 8192;

pub const BINARY_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "so", "dll", "dylib", "exe", "bin", "o", "a", "class", "jar", "png", "jpg",
    "jpeg", "gif", "bmp", "ico", "webp", "tiff", "mp3", "mp4", "wav", "avi", "mov", "mkv",
    "flac", "ogg", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "pdf", "doc", "docx", "xls",
    "xlsx", "ppt", "pptx", "sqlite", "sqlite3", "db", "woff", "woff2", "ttf", "otf", "eot",
    "wasm",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BinaryExtension,
    NulByte,
    TooLarge(u64),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BinaryExtension => write!(f, "binary file type"),
            SkipReason::NulByte => write!(f, "binary content"),
            SkipReason::TooLarge(size) => {
                write!(f, "{size} bytes is larger than {MAX_FILE_SIZE} bytes")
            }
        }
    }
}

/// Why `path` should not be attached, if it should not.
pub fn skip_reason(path: &Path) -> Result<Option<SkipReason>> {
    let is_binary_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| BINARY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
    if is_binary_ext {
        return Ok(Some(SkipReason::BinaryExtension));
    }
    let size = fs::metadata(path)?.len();
    if size > MAX_FILE_SIZE {
        return Ok(Some(SkipReason::TooLarge(size)));
    }
    let mut head = Vec::with_capacity(SNIFF_LEN);
    fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    if head.contains(&0) {
        return Ok(Some(SkipReason::NulByte));
    }
    Ok(None)
}

fn escapes(raw: &str) -> bool {
    Path::new(raw).is_absolute()
        || Path::new(raw)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}

fn resolve(base: &Path, raw: &str) -> Result<PathBuf> {
    let resolved = match base.join(raw).canonicalize() {
        Ok(p) => p,
        Err(_) if escapes(raw) => {
            return Err(AiError::argument(format!(
                "path '{raw}' is outside the current directory"
            )));
        }
        Err(_) => return Err(AiError::argument(format!("file not found: {raw}"))),
    };
    if !resolved.starts_with(base) {
        return Err(AiError::argument(format!(
            "path '{raw}' is outside the current directory"
        )));
    }
    Ok(resolved)
}

/// Direct, non-hidden regular files of `dir`, sorted by name.
fn dir_files(base: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.path().canonicalize().ok())
        .filter(|p| p.is_file() && p.starts_with(base))
        .collect();
    files.sort();
    Ok(files)
}

/// Render `values` (paths relative to `base`) as file blocks joined by blank lines.
pub fn build_context(values: &[String], base: &Path) -> Result<String> {
    let base = base.canonicalize()?;
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut blocks = Vec::new();
    let mut total: u64 = 0;

    for raw in values {
        let resolved = resolve(&base, raw)?;
        let files = if resolved.is_dir() {
            dir_files(&base, &resolved)?
        } else {
            vec![resolved]
        };

        for file in files {
            if !seen.insert(file.clone()) {
                continue;
            }
            let rel = file
                .strip_prefix(&base)
                .unwrap_or(&file)
                .to_string_lossy()
                .into_owned();
            if let Some(reason) = skip_reason(&file)? {
                tracing::warn!(path = %rel, %reason, "skipping file");
                continue;
            }
            let bytes = fs::read(&file)?;
            let size = bytes.len() as u64;
            if total + size > MAX_TOTAL_SIZE {
                tracing::warn!(path = %rel, limit = MAX_TOTAL_SIZE, "total size limit reached; skipping file");
                continue;
            }
            total += size;
            let content = String::from_utf8_lossy(&bytes);
            blocks.push(format!("<file path=\"{rel}\">\n{content}\n</file>"));
        }
    }
    tracing::debug!(files = blocks.len(), bytes = total, "file context built");
    Ok(blocks.join("\n\n"))
}

/// Context blocks, a blank line, then the prompt.
pub fn attach(context: &str, prompt: &str) -> String {
    match (context.is_empty(), prompt.is_empty()) {
        (true, _) => prompt.to_string(),
        (false, true) => context.to_string(),
        (false, false) => format!("{context}\n\n{prompt}"),
    }
}
