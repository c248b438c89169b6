use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Turns raw uploaded bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String>;
}

/// Extracts PDF text with `pdftotext` (poppler) when available, falling back
/// to the pure-Rust `pdf_extract` crate.
pub struct PdfTextExtractor {
    timeout: Duration,
}

impl PdfTextExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String> {
        tracing::debug!(bytes = bytes.len(), "Extracting PDF text");

        let job = tokio::task::spawn_blocking(move || Self::read_text(&bytes));
        let Ok(joined) = tokio::time::timeout(self.timeout, job).await else {
            anyhow::bail!("PDF extraction exceeded {}s", self.timeout.as_secs());
        };
        joined.context("PDF extraction task aborted")?
    }
}

impl PdfTextExtractor {
    /// Blocking. Prefers poppler's layout-aware output; scanned or exotic
    /// files that it cannot read go through `pdf-extract` instead.
    fn read_text(bytes: &[u8]) -> Result<String> {
        let reason = match Self::poppler_text(bytes) {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => "no text layer".to_string(),
            Err(e) => format!("{e:#}"),
        };
        tracing::warn!(%reason, "pdftotext unusable, retrying with pdf-extract");

        pdf_extract::extract_text_from_mem(bytes).context("pdf-extract could not read the document")
    }

    fn poppler_text(bytes: &[u8]) -> Result<String> {
        use std::io::Write;

        let mut input = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .context("creating scratch file")?;
        input.write_all(bytes).context("writing scratch file")?;
        input.flush()?;

        let output = std::process::Command::new("pdftotext")
            .args(["-layout", "-enc", "UTF-8"])
            .arg(input.path())
            .arg("-")
            .output()
            .context("spawning pdftotext (poppler-utils)")?;

        anyhow::ensure!(
            output.status.success(),
            "pdftotext exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Returns true when `filename` carries the `.pdf` extension (any case).
pub fn is_pdf_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("pdf"))
}

/// Splits `text` into windows of at most `chunk_size` characters, each
/// starting `chunk_size - overlap` characters after the previous one.
///
/// Windows are trimmed and dropped when empty. Emission stops at the first
/// window that reaches the end of the text.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = offsets.len();
    let byte_at = |n: usize| offsets.get(n).copied().unwrap_or(text.len());

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(len);
        let chunk = text[byte_at(start)..byte_at(end)].trim();

        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= len {
            break;
        }

        start += step;
    }

    chunks
}
