//! JSON dataset persistence: whole-file load, formatted render, and atomic replace.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonStyle {
    pub indent: usize,
    pub trailing_newline: bool,
}

impl JsonStyle {
    pub const TWO_SPACES: Self = Self {
        indent: 2,
        trailing_newline: false,
    };
    pub const FOUR_SPACES: Self = Self {
        indent: 4,
        trailing_newline: false,
    };
    pub const EXPORT: Self = Self {
        indent: 2,
        trailing_newline: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

impl WriteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
        }
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        bail!("dataset file not found: {}", path.display());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn load_json_value(path: &Path) -> Result<Value> {
    load_json(path)
}

pub fn render_json<T: Serialize>(value: &T, style: JsonStyle) -> Result<String> {
    let indent = " ".repeat(style.indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .context("failed to serialize JSON")?;
    let mut rendered = String::from_utf8(buffer).context("serialized JSON is not UTF-8")?;
    if style.trailing_newline {
        rendered.push('\n');
    }
    Ok(rendered)
}

pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    style: JsonStyle,
) -> Result<WriteOutcome> {
    let rendered = render_json(value, style)?;
    write_text_atomic(path, &rendered)
}

/// Replaces `path` through a temporary file in the same directory, so readers never see a
/// partially written dataset. Identical content is not rewritten.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<WriteOutcome> {
    if let Ok(existing) = fs::read(path)
        && compute_hash(&existing) == compute_hash(content.as_bytes())
    {
        debug!(path = %path.display(), "content unchanged; skipping write");
        return Ok(WriteOutcome::Unchanged);
    }

    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
    temp.write_all(content.as_bytes())
        .with_context(|| format!("failed to write temporary file for {}", path.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to flush temporary file for {}", path.display()))?;
    temp.persist(path)
        .map_err(|error| error.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    info!(path = %path.display(), bytes = content.len(), "wrote dataset");
    Ok(WriteOutcome::Written)
}

pub fn compute_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
