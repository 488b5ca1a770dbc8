//! Fuzz target for the XML stream decoder
//!
//! Feeds arbitrary bytes in arbitrary chunks; the decoder must only ever
//! return events or errors, and never grow past its limit.

#![no_main]

use arbitrary::Arbitrary;
use corvid_xml::StreamDecoder;
use libfuzzer_sys::fuzz_target;

const LIMIT: usize = 4096;

#[derive(Debug, Arbitrary)]
struct Input {
    chunks: Vec<Vec<u8>>,
    restart_after: Option<u8>,
}

fuzz_target!(|input: Input| {
    let mut decoder = StreamDecoder::with_limit(LIMIT);
    for (i, chunk) in input.chunks.iter().enumerate() {
        if input.restart_after == Some(i as u8) {
            decoder.restart();
        }
        if decoder.decode(chunk).is_err() {
            break;
        }
        assert!(decoder.pending() <= LIMIT);
    }
});
