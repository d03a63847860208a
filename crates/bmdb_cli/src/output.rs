//! Value rendering and output formats.

use crate::commands::read::Record;
use clap::ValueEnum;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// How keys and values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    /// Raw byte list, e.g. `[104, 105]`.
    Bytes,
    /// UTF-8 text, lossy.
    String,
    /// Lowercase hex.
    Hex,
}

impl ValueKind {
    /// Renders stored bytes.
    pub fn render(self, bytes: &[u8]) -> String {
        match self {
            Self::Bytes => format!("{bytes:?}"),
            Self::String => String::from_utf8_lossy(bytes).into_owned(),
            Self::Hex => hex_encode(bytes),
        }
    }

    /// Parses a command-line argument into the bytes to store.
    pub fn parse(self, input: &str) -> Result<Vec<u8>, String> {
        match self {
            Self::Bytes | Self::String => Ok(input.as_bytes().to_vec()),
            Self::Hex => hex_decode(input),
        }
    }
}

/// A bucket record with key and value rendered for display.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Shown {
    /// Bucket name.
    pub bucket: String,
    /// 1-based position inside the bucket.
    pub index: u64,
    /// Rendered key.
    pub key: String,
    /// Rendered value.
    pub value: String,
}

impl Shown {
    /// Renders `record` with `kind`.
    pub fn new(kind: ValueKind, record: &Record) -> Self {
        Self {
            bucket: record.bucket.clone(),
            index: record.index,
            key: kind.render(&record.key),
            value: kind.render(&record.value),
        }
    }

    /// Text rendering.
    pub fn line(&self) -> String {
        format!("{}[{}] {} = {}", self.bucket, self.index, self.key, self.value)
    }
}

/// Prints a serializable result as JSON, or each text line otherwise.
pub fn emit<T: Serialize>(
    format: Format,
    value: &T,
    lines: impl IntoIterator<Item = String>,
) -> Result<(), serde_json::Error> {
    let output = to_output(format, value, lines)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn to_output<T: Serialize>(
    format: Format,
    value: &T,
    lines: impl IntoIterator<Item = String>,
) -> Result<String, serde_json::Error> {
    match format {
        Format::Json => serde_json::to_string_pretty(value),
        Format::Text => Ok(lines.into_iter().collect::<Vec<_>>().join("\n")),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(input: &str) -> Result<Vec<u8>, String> {
    if input.len() % 2 != 0 {
        return Err(format!("odd-length hex string: {input}"));
    }
    (0..input.len())
        .step_by(2)
        .map(|i| {
            input
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex at offset {i}: {input}"))
        })
        .collect()
}
