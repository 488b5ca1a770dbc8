//! Stream decoder combining the tokenizer and assembler.
//!
//! Owned by exactly one session. Bytes arrive through [`StreamDecoder::feed`]
//! in whatever chunks the transport delivers; events come out of
//! [`StreamDecoder::next_event`] in arrival order.

use crate::assembler::{AssemblerEvent, ElementAssembler};
use crate::error::XmlError;
use crate::particle::Tokenizer;

/// Default limit on bytes buffered for a single incomplete particle
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

/// Incremental decoder for one XML stream
#[derive(Debug)]
pub struct StreamDecoder {
    tokenizer: Tokenizer,
    assembler: ElementAssembler,
    max_pending: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    /// Create a decoder with the default pending-bytes limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PENDING)
    }

    /// Create a decoder that rejects an incomplete particle larger than
    /// `max_pending` bytes
    #[must_use]
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            assembler: ElementAssembler::new(),
            max_pending,
        }
    }

    /// Append received bytes.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::BufferOverflow`] if unconsumed input exceeds the
    /// configured limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), XmlError> {
        self.tokenizer.compact();
        let size = self.tokenizer.pending() + bytes.len();
        if size > self.max_pending {
            return Err(XmlError::BufferOverflow {
                size,
                limit: self.max_pending,
            });
        }
        self.tokenizer.extend(bytes);
        Ok(())
    }

    /// Next event, or `Ok(None)` when more input is needed.
    ///
    /// # Errors
    ///
    /// Returns any framing error raised by the tokenizer or assembler.
    pub fn next_event(&mut self) -> Result<Option<AssemblerEvent>, XmlError> {
        loop {
            if let Some(event) = self.assembler.next_event() {
                return Ok(Some(event));
            }
            match self.tokenizer.next_particle()? {
                Some(particle) => self.assembler.feed(particle)?,
                None => return Ok(None),
            }
        }
    }

    /// Drain every event currently decodable.
    ///
    /// # Errors
    ///
    /// Returns the first framing error; events before it are lost.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Vec<AssemblerEvent>, XmlError> {
        self.feed(bytes)?;
        let mut events = Vec::new();
        while let Some(event) = self.next_event()? {
            events.push(event);
        }
        Ok(events)
    }

    /// Restart the stream after a security layer change.
    ///
    /// The assembler forgets the current stream; buffered bytes not yet
    /// consumed are kept since they already belong to the new stream.
    pub fn restart(&mut self) {
        tracing::debug!(pending = self.tokenizer.pending(), "stream decoder restart");
        self.assembler.reset();
    }

    /// Drop all buffered input and assembly state
    pub fn clear(&mut self) {
        self.tokenizer.clear();
        self.assembler.reset();
    }

    /// Current element nesting depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.assembler.depth()
    }

    /// Bytes received but not yet consumed
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tokenizer.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = "<stream:stream to='x' xmlns='jabber:client' \
        xmlns:stream='http://etherx.jabber.org/streams' version='1.0'>";
    const PING: &str = "<iq type='get' id='1'><ping xmlns='urn:xmpp:ping'/></iq>";
    const CLOSE: &str = "</stream:stream>";

    #[test]
    fn test_three_deliveries() {
        let mut decoder = StreamDecoder::new();
        let first = decoder.decode(OPEN.as_bytes()).unwrap();
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], AssemblerEvent::StreamOpened(_)));

        let second = decoder.decode(PING.as_bytes()).unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(&second[0], AssemblerEvent::Stanza(iq) if iq.name() == "iq"));

        let third = decoder.decode(CLOSE.as_bytes()).unwrap();
        assert_eq!(third, vec![AssemblerEvent::StreamClosed]);
        assert!(decoder.decode(b"").unwrap().is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = format!("{OPEN}{PING}{CLOSE}");
        let mut decoder = StreamDecoder::new();
        let mut events = Vec::new();
        for b in input.as_bytes() {
            events.extend(decoder.decode(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(events.len(), 3);
        assert_eq!(decoder.depth(), 0);
    }

    #[test]
    fn test_split_inside_quoted_value() {
        let mut decoder = StreamDecoder::new();
        decoder.decode(OPEN.as_bytes()).unwrap();
        assert!(decoder.decode(b"<message to='a>b").unwrap().is_empty());
        let events = decoder.decode(b"@c'/>").unwrap();
        let AssemblerEvent::Stanza(msg) = &events[0] else {
            panic!("expected stanza");
        };
        assert_eq!(msg.attribute("to"), Some("a>b@c"));
    }

    #[test]
    fn test_buffer_overflow() {
        let mut decoder = StreamDecoder::with_limit(16);
        assert!(decoder.feed(b"<stream:stream").is_ok());
        assert!(matches!(
            decoder.feed(b" xmlns='jabber:client'"),
            Err(XmlError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn test_restart_keeps_pending_bytes() {
        let mut decoder = StreamDecoder::new();
        decoder.decode(OPEN.as_bytes()).unwrap();
        let events = decoder
            .decode(format!("<auth/>{}", &OPEN[..20]).as_bytes())
            .unwrap();
        assert_eq!(events.len(), 1);
        decoder.restart();
        let events = decoder.decode(OPEN[20..].as_bytes()).unwrap();
        assert!(matches!(events[0], AssemblerEvent::StreamOpened(_)));
    }
}
