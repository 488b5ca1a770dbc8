//! Element assembler: particles in, stream events out.
//!
//! Depth 1 is the stream opener, which stays open for the whole session.
//! Each element that closes back to depth 1 is a complete stanza.
//!
//! ```text
//! depth 0 ──open──▶ 1   StreamOpened(opener)
//! depth 1 ──open──▶ 2 … ──close──▶ 1   Stanza(element)
//! depth 1 ──close─▶ 0   StreamClosed
//! ```

use crate::element::Element;
use crate::error::XmlError;
use crate::namespace::{NamespaceScope, checked_split};
use crate::particle::{Particle, ParticleKind};
use std::collections::VecDeque;

/// Event emitted by the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// XML declaration seen before the stream opener (`<?xml ...?>`),
    /// carried as an element named `xml` with its pseudo-attributes
    Prolog(Element),
    /// Stream opener; emitted open, without children
    StreamOpened(Element),
    /// One complete top-level child of the stream
    Stanza(Element),
    /// The stream opener was closed
    StreamClosed,
}

/// Builds elements from particles and emits stream events.
#[derive(Debug, Default)]
pub struct ElementAssembler {
    depth: usize,
    stream_name: Option<String>,
    stack: Vec<Element>,
    scope: NamespaceScope,
    events: VecDeque<AssemblerEvent>,
}

impl ElementAssembler {
    /// Create an assembler at depth 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth; 1 while a stream is open between stanzas
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether a stream opener has been seen and not yet closed
    #[must_use]
    pub fn is_stream_open(&self) -> bool {
        self.stream_name.is_some()
    }

    /// Take the next pending event
    pub fn next_event(&mut self) -> Option<AssemblerEvent> {
        self.events.pop_front()
    }

    /// Forget all state, ready for a fresh stream on the same connection
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consume one particle.
    ///
    /// # Errors
    ///
    /// Returns a framing error on a close tag that does not match the
    /// innermost open element, a malformed tag, a forbidden name, or an
    /// unbound prefix. The assembler must be discarded afterwards.
    pub fn feed(&mut self, particle: Particle) -> Result<(), XmlError> {
        match particle.kind() {
            ParticleKind::OpenTag => self.open(&particle, false),
            ParticleKind::SelfClosingTag => self.open(&particle, true),
            ParticleKind::CloseTag => self.close(&particle),
            ParticleKind::Text => self.text(&particle),
            ParticleKind::ProcessingInstruction => self.instruction(&particle),
            ParticleKind::Comment => {
                tracing::trace!("ignoring comment");
                Ok(())
            }
        }
    }

    fn open(&mut self, particle: &Particle, self_closing: bool) -> Result<(), XmlError> {
        let mut element = build_element(particle)?;
        self.scope.push(&element);
        if let Err(e) = self.scope.bind(&mut element) {
            self.scope.pop();
            return Err(e);
        }

        if self.depth == 0 {
            self.stream_name = Some(element.qualified_name());
            self.events.push_back(AssemblerEvent::StreamOpened(element));
            self.depth = 1;
            if self_closing {
                self.end_stream();
            }
            return Ok(());
        }

        if self_closing {
            self.scope.pop();
            self.complete(element);
        } else {
            self.stack.push(element);
            self.depth += 1;
        }
        Ok(())
    }

    fn close(&mut self, particle: &Particle) -> Result<(), XmlError> {
        let found = particle.name().unwrap_or_default();

        if self.depth == 0 {
            return Err(XmlError::UnexpectedClose(found.to_string()));
        }

        if self.depth == 1 {
            let expected = self.stream_name.as_deref().unwrap_or_default();
            if expected != found {
                return Err(XmlError::MismatchedClose {
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
            self.end_stream();
            return Ok(());
        }

        let Some(element) = self.stack.pop() else {
            return Err(XmlError::UnexpectedClose(found.to_string()));
        };
        let expected = element.qualified_name();
        if expected != found {
            return Err(XmlError::MismatchedClose {
                expected,
                found: found.to_string(),
            });
        }

        self.scope.pop();
        self.depth -= 1;
        self.complete(element);
        Ok(())
    }

    /// Attach a finished element to its parent, or emit it as a stanza.
    fn complete(&mut self, element: Element) {
        match self.stack.last_mut() {
            Some(parent) => parent.push_child(element),
            None => {
                tracing::trace!(name = element.name(), "stanza complete");
                self.events.push_back(AssemblerEvent::Stanza(element));
            }
        }
    }

    fn end_stream(&mut self) {
        self.scope.clear();
        self.stack.clear();
        self.stream_name = None;
        self.depth = 0;
        self.events.push_back(AssemblerEvent::StreamClosed);
    }

    fn text(&mut self, particle: &Particle) -> Result<(), XmlError> {
        match self.stack.last_mut() {
            Some(element) => {
                element.push_text(&particle.text()?);
                Ok(())
            }
            None => {
                if !particle.is_whitespace() {
                    tracing::trace!(depth = self.depth, "ignoring text outside stanza");
                }
                Ok(())
            }
        }
    }

    fn instruction(&mut self, particle: &Particle) -> Result<(), XmlError> {
        if self.depth == 0 && particle.name() == Some("xml") {
            let mut prolog = Element::new("xml");
            for (name, value) in particle.attributes()? {
                prolog.set_attribute(&name, value);
            }
            self.events.push_back(AssemblerEvent::Prolog(prolog));
        } else {
            tracing::trace!(target = ?particle.name(), "ignoring processing instruction");
        }
        Ok(())
    }
}

fn build_element(particle: &Particle) -> Result<Element, XmlError> {
    let qualified = particle.name().unwrap_or_default();
    let (prefix, local) = checked_split(qualified)?;
    if is_reserved(local) || prefix.is_some_and(is_reserved) {
        return Err(XmlError::InvalidName(qualified.to_string()));
    }

    let mut element = Element::new(qualified);
    for (name, value) in particle.attributes()? {
        let (attr_prefix, _) = checked_split(&name)?;
        if attr_prefix.is_none() && name != "xmlns" && is_reserved(&name) {
            return Err(XmlError::InvalidName(name));
        }
        element.set_attribute(&name, value);
    }
    Ok(element)
}

fn is_reserved(name: &str) -> bool {
    name.len() >= 3 && name[..3].eq_ignore_ascii_case("xml")
}

/// Whether the open and close tags of `particles` nest properly.
///
/// Self-closing tags and non-tag particles are ignored. The sequence is
/// balanced if every close matches the innermost open and the final depth
/// is 0, or 1 for a still-open stream opener.
#[must_use]
pub fn is_balanced(particles: &[Particle]) -> bool {
    let mut open: Vec<&str> = Vec::new();
    for particle in particles {
        match particle.kind() {
            ParticleKind::OpenTag => open.push(particle.name().unwrap_or_default()),
            ParticleKind::CloseTag => match open.pop() {
                Some(name) if Some(name) == particle.name() => {}
                _ => return false,
            },
            _ => {}
        }
    }
    open.len() <= 1
}
