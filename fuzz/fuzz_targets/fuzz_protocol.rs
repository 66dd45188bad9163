//! Fuzz target for the wire-facing parsers.
//!
//! Tests that arbitrary bytes don't cause panics when run through the
//! envelope parser, AID parser, or performative parser.

#![no_main]

use fjage_gw::{AgentId, Message, Performative};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = Message::parse(s);
        let _ = AgentId::parse(s);
        let _ = Performative::from_wire_str(s);
    }
});
