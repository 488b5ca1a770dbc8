//! Lexical particles and the resumable tokenizer.
//!
//! The tokenizer is a pull API over a byte buffer that keeps growing as
//! reads complete. [`next_particle`] either returns one complete particle and
//! advances the cursor past it, or returns `Ok(None)` and leaves the cursor
//! at the particle start so the same bytes are re-examined once more input
//! has arrived. Particle boundaries always fall on ASCII `<` or `>`, so a
//! multi-byte UTF-8 sequence is never split across two particles.
//!
//! Attribute values are scanned quote-aware: inside `'...'` or `"..."` a
//! raw `<` or `>` is value content. This is looser than XML 1.0 but matches
//! what deployed clients send.

use crate::error::XmlError;
use crate::escape::unescape;

const COMMENT_OPEN: &[u8] = b"<!--";
const COMMENT_CLOSE: &[u8] = b"-->";
const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";
const PI_CLOSE: &[u8] = b"?>";

/// Particle kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleKind {
    /// `<name ...>`
    OpenTag,
    /// `</name>`
    CloseTag,
    /// `<name .../>`
    SelfClosingTag,
    /// Character data (including CDATA sections)
    Text,
    /// `<!-- ... -->`
    Comment,
    /// `<?target ...?>`
    ProcessingInstruction,
}

impl ParticleKind {
    /// Whether the particle is one of the three tag kinds
    #[must_use]
    pub fn is_tag(self) -> bool {
        matches!(self, Self::OpenTag | Self::CloseTag | Self::SelfClosingTag)
    }
}

/// One lexical unit of an XML stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    kind: ParticleKind,
    raw: String,
    name: Option<String>,
}

impl Particle {
    fn new(kind: ParticleKind, raw: String) -> Result<Self, XmlError> {
        let name = match kind {
            ParticleKind::OpenTag | ParticleKind::SelfClosingTag => Some(tag_name(&raw[1..])?),
            ParticleKind::CloseTag => Some(tag_name(&raw[2..])?),
            ParticleKind::ProcessingInstruction => Some(tag_name(&raw[2..])?),
            ParticleKind::Text | ParticleKind::Comment => None,
        };
        Ok(Self { kind, raw, name })
    }

    /// Particle kind
    #[must_use]
    pub fn kind(&self) -> ParticleKind {
        self.kind
    }

    /// Raw source text exactly as received
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Qualified name for tags, target for processing instructions
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this is a CDATA section
    #[must_use]
    pub fn is_cdata(&self) -> bool {
        self.kind == ParticleKind::Text && self.raw.starts_with("<![CDATA[")
    }

    /// Character content of a text particle with entities resolved.
    ///
    /// CDATA content is returned verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::InvalidEntity`] for a bad entity reference.
    pub fn text(&self) -> Result<String, XmlError> {
        if self.is_cdata() {
            let inner = &self.raw[CDATA_OPEN.len()..self.raw.len() - CDATA_CLOSE.len()];
            return Ok(inner.to_string());
        }
        Ok(unescape(&self.raw)?.into_owned())
    }

    /// Whether a text particle contains only XML whitespace
    #[must_use]
    pub fn is_whitespace(&self) -> bool {
        self.kind == ParticleKind::Text
            && !self.is_cdata()
            && self.raw.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
    }

    /// Attributes of a tag or processing instruction, values unescaped.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::MalformedTag`] on broken attribute syntax and
    /// [`XmlError::InvalidEntity`] on a bad reference inside a value.
    pub fn attributes(&self) -> Result<Vec<(String, String)>, XmlError> {
        let body = match self.kind {
            ParticleKind::OpenTag => &self.raw[1..self.raw.len() - 1],
            ParticleKind::SelfClosingTag => &self.raw[1..self.raw.len() - 2],
            ParticleKind::ProcessingInstruction => {
                &self.raw[2..self.raw.len() - PI_CLOSE.len()]
            }
            _ => return Ok(Vec::new()),
        };
        let name_len = self.name.as_ref().map_or(0, String::len);
        parse_attributes(&body[name_len..])
    }
}

/// Read the next particle from `buffer` starting at `*cursor`.
///
/// Returns `Ok(None)` when the bytes at the cursor do not yet form a complete
/// particle; the cursor is left unchanged in that case.
///
/// # Errors
///
/// Returns an error for malformed markup or invalid UTF-8. The cursor is not
/// advanced on error.
pub fn next_particle(buffer: &[u8], cursor: &mut usize) -> Result<Option<Particle>, XmlError> {
    let start = *cursor;
    let input = match buffer.get(start..) {
        Some(rest) if !rest.is_empty() => rest,
        _ => return Ok(None),
    };

    let scanned = if input[0] == b'<' {
        scan_markup(input)?
    } else {
        input
            .iter()
            .position(|&b| b == b'<')
            .map(|end| (ParticleKind::Text, end))
    };

    let Some((kind, len)) = scanned else {
        return Ok(None);
    };

    let raw = std::str::from_utf8(&input[..len])
        .map_err(|_| XmlError::InvalidUtf8)?
        .to_string();
    let particle = Particle::new(kind, raw)?;
    *cursor = start + len;
    tracing::trace!(kind = ?particle.kind, len, "particle");
    Ok(Some(particle))
}

/// Resumable tokenizer owning its input buffer.
///
/// Consumed bytes are discarded lazily by [`Tokenizer::compact`].
#[derive(Debug, Default)]
pub struct Tokenizer {
    buffer: Vec<u8>,
    cursor: usize,
}

impl Tokenizer {
    /// Create an empty tokenizer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete particle, or `None` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// See [`next_particle`].
    pub fn next_particle(&mut self) -> Result<Option<Particle>, XmlError> {
        next_particle(&self.buffer, &mut self.cursor)
    }

    /// Number of buffered bytes not yet returned as particles
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Drop bytes that have already been consumed
    pub fn compact(&mut self) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    /// Discard all buffered input
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}

/// Determine kind and byte length of the markup particle at the start of
/// `input` (which begins with `<`).
fn scan_markup(input: &[u8]) -> Result<Option<(ParticleKind, usize)>, XmlError> {
    match input.get(1) {
        None => Ok(None),
        Some(b'!') => {
            if input.starts_with(COMMENT_OPEN) {
                Ok(find(input, COMMENT_OPEN.len(), COMMENT_CLOSE)
                    .map(|end| (ParticleKind::Comment, end)))
            } else if input.starts_with(CDATA_OPEN) {
                Ok(find(input, CDATA_OPEN.len(), CDATA_CLOSE).map(|end| (ParticleKind::Text, end)))
            } else if COMMENT_OPEN.starts_with(input) || CDATA_OPEN.starts_with(input) {
                Ok(None)
            } else {
                Err(XmlError::Unsupported("document type declaration"))
            }
        }
        Some(b'?') => {
            Ok(find(input, 2, PI_CLOSE).map(|end| (ParticleKind::ProcessingInstruction, end)))
        }
        Some(_) => Ok(scan_tag(input)),
    }
}

/// Find the `>` that ends a tag, skipping over quoted attribute values.
fn scan_tag(input: &[u8]) -> Option<(ParticleKind, usize)> {
    let mut quote: Option<u8> = None;
    for (i, &b) in input.iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    let kind = if input[1] == b'/' {
                        ParticleKind::CloseTag
                    } else if input[i - 1] == b'/' {
                        ParticleKind::SelfClosingTag
                    } else {
                        ParticleKind::OpenTag
                    };
                    return Some((kind, i + 1));
                }
                _ => {}
            },
        }
    }
    None
}

/// Byte length up to and including the first `needle` at or after `from`.
fn find(input: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    input
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos + needle.len())
}

fn is_name_terminator(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '/' | '>' | '?' | '=')
}

fn tag_name(after_lt: &str) -> Result<String, XmlError> {
    let end = after_lt
        .find(is_name_terminator)
        .unwrap_or(after_lt.len());
    let name = &after_lt[..end];
    if name.is_empty() {
        return Err(XmlError::MalformedTag(truncate(after_lt)));
    }
    if name.contains(['<', '"', '\'']) {
        return Err(XmlError::MalformedTag(truncate(name)));
    }
    Ok(name.to_string())
}

/// Parse `name='value'` pairs following a tag name.
fn parse_attributes(mut rest: &str) -> Result<Vec<(String, String)>, XmlError> {
    let mut attributes: Vec<(String, String)> = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(attributes);
        }

        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .ok_or_else(|| XmlError::MalformedTag(format!("attribute {} has no value", truncate(rest))))?;
        let name = &rest[..name_end];
        if name.is_empty() || name.contains(['<', '>', '"', '\'', '/']) {
            return Err(XmlError::MalformedTag(truncate(rest)));
        }

        rest = rest[name_end..].trim_start();
        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| XmlError::MalformedTag(format!("attribute {name} has no value")))?
            .trim_start();

        let quote = rest
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| XmlError::MalformedTag(format!("attribute {name} is not quoted")))?;
        let body = &rest[1..];
        let close = body
            .find(quote)
            .ok_or_else(|| XmlError::MalformedTag(format!("attribute {name} is not terminated")))?;
        let value = unescape(&body[..close])?.into_owned();

        if attributes.iter().any(|(n, _)| n == name) {
            return Err(XmlError::MalformedTag(format!("duplicate attribute {name}")));
        }
        attributes.push((name.to_string(), value));

        rest = &body[close + 1..];
        if !rest.is_empty() && !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
            return Err(XmlError::MalformedTag(format!(
                "missing whitespace after attribute {name}"
            )));
        }
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}
