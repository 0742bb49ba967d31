//! Log redaction for credentials and patient identifiers.
//!
//! Formatted log lines pass through `sanitize` before reaching any sink:
//! - Bearer tokens and bare JWTs
//! - Configured key material (hex or base64 of 32+ bytes, PEM blocks)
//! - `password=`, `secret=`, `cipher_key=` style assignments
//! - Emails, phone numbers, SSNs and MRNs
//!
//! Redaction is a backstop. Types holding plaintext or secrets already
//! redact themselves in `Debug`.
//!
//! Input is capped at `CLINIVAULT_SANITIZE_MAX_BYTES` (default 16 KiB) per
//! call; anything past the cap is dropped and marked `[TRUNCATED]`.

use std::io::Write;
use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

const DEFAULT_MAX_BYTES: usize = 16 * 1024;
const MAX_BYTES_ENV: &str = "CLINIVAULT_SANITIZE_MAX_BYTES";
const TRUNCATED_MARK: &str = " [TRUNCATED]";

/// Ordered rules: earlier rules run first so a bearer token is tagged as a
/// token and not as generic key material.
const RULES: &[(&str, &str)] = &[
    (
        r"(?i)\bbearer\s+[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+",
        "Bearer [REDACTED-TOKEN]",
    ),
    (
        r"\beyJ[A-Za-z0-9_\-]{8,}\.[A-Za-z0-9_\-]{8,}\.[A-Za-z0-9_\-]{8,}",
        "[REDACTED-JWT]",
    ),
    (
        r#"(?i)\b(password|passwd|secret|signing_secret|cipher_key|api_key|token|key)\s*[:=]\s*"?[^\s",}]{6,}"?"#,
        "$1=[REDACTED-SECRET]",
    ),
    (
        r"-----BEGIN [A-Z ]{0,40}KEY-----[A-Za-z0-9+/=\s]*-----END [A-Z ]{0,40}KEY-----",
        "[REDACTED-PEM]",
    ),
    (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]"),
    (r"[A-Za-z0-9+/_\-]{43}=?(?:[^A-Za-z0-9+/=_\-]|$)", "[REDACTED-KEY] "),
    (
        r"(?i)\b[a-z0-9][a-z0-9._%+\-]{0,63}@[a-z0-9](?:[a-z0-9\-]{0,61}[a-z0-9])?(?:\.[a-z0-9\-]{1,63})*\.[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED-SSN]"),
    (r"(?i)\bMRN[:#\s]?\s*\d{6,10}\b", "[REDACTED-MRN]"),
    (
        r"(?:\+\d{1,3}[\s.\-]?)?\(?\b\d{3}\)?[\s.\-]\d{3}[\s.\-]\d{4}\b",
        "[REDACTED-PHONE]",
    ),
];

struct Redactor {
    any: RegexSet,
    rules: Vec<(Regex, &'static str)>,
}

fn redactor() -> &'static Redactor {
    static REDACTOR: OnceLock<Redactor> = OnceLock::new();
    REDACTOR.get_or_init(|| Redactor {
        any: RegexSet::new(RULES.iter().map(|(p, _)| *p)).expect("static patterns compile"),
        rules: RULES
            .iter()
            .map(|(p, r)| (Regex::new(p).expect("static pattern compiles"), *r))
            .collect(),
    })
}

fn max_bytes() -> usize {
    std::env::var(MAX_BYTES_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_MAX_BYTES)
}

/// Longest prefix of `input` that is at most `limit` bytes and ends on a
/// char boundary.
fn clip(input: &str, limit: usize) -> &str {
    if input.len() <= limit {
        return input;
    }
    let end = (0..=limit)
        .rev()
        .find(|&i| input.is_char_boundary(i))
        .unwrap_or(0);
    &input[..end]
}

/// Replace credentials and identifiers in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_bytes())
}

fn sanitize_with_limit(input: &str, limit: usize) -> String {
    let clipped = clip(input, limit);
    let redactor = redactor();

    let mut out = clipped.to_string();
    if redactor.any.is_match(clipped) {
        for (regex, replacement) in &redactor.rules {
            if regex.is_match(&out) {
                let replaced = regex.replace_all(&out, *replacement).into_owned();
                out = replaced;
            }
        }
    }

    if clipped.len() < input.len() {
        out.push_str(TRUNCATED_MARK);
    }
    out
}

/// `MakeWriter` that redacts every formatted line before the inner writer
/// sees it.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            pending: Vec::new(),
        }
    }
}

/// Line-buffering writer created per event by `SanitizingMakeWriter`.
pub struct SanitizingWriter<W: Write> {
    inner: W,
    pending: Vec<u8>,
}

impl<W: Write> SanitizingWriter<W> {
    fn emit(&mut self, raw: &[u8]) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(raw);
        self.inner.write_all(sanitize(&text).as_bytes())
    }

    fn drain_complete_lines(&mut self) -> std::io::Result<()> {
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.emit(&line)?;
        }
        Ok(())
    }
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.drain_complete_lines()?;

        // A line with no newline in sight is flushed once it passes the cap.
        if self.pending.len() > max_bytes() {
            let overflow = std::mem::take(&mut self.pending);
            self.emit(&overflow)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.drain_complete_lines()?;
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
