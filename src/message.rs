//! The message object: a writable [`MessageBuilder`] under construction,
//! and a readable, already-parsed [`Message`].
//!
//! The C reference keeps one struct with a `data_len < 0` sentinel to
//! distinguish "still being built" from "parsed from the wire", and a
//! hand-rolled JSON token index for the readable side. Here the two
//! states are distinct types connected by [`MessageBuilder::build`]
//! (outbound) and [`Message::parse`] (inbound), and both are backed by
//! a `serde_json::Map` rather than a token index — same wire shape,
//! ecosystem JSON library instead of a bespoke tokenizer.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::aid::AgentId;
use crate::perf::Performative;

const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Generate a 36-character id from the 64-symbol alphabet, each symbol
/// drawn independently.
#[must_use]
pub(crate) fn generate_id() -> String {
    let mut out = String::with_capacity(36);
    let mut bits: u64 = 0;
    let mut bits_left = 0u32;
    while out.len() < 36 {
        if bits_left < 6 {
            bits |= u64::from(random_u64() as u32) << bits_left;
            bits_left += 32;
        }
        let idx = (bits & 0x3f) as usize;
        out.push(char::from(ID_ALPHABET[idx]));
        bits >>= 6;
        bits_left -= 6;
    }
    out
}

/// A process-local source of non-cryptographic randomness, good enough
/// for ids and the self-AID suffix. `RandomState` is seeded from the
/// OS the first time it's constructed, so this isn't a fixed sequence
/// across runs.
pub(crate) fn random_u64() -> u64 {
    RandomState::new().build_hasher().finish()
}

/// A message payload value.
///
/// Internal only — the builder's public `add_*` methods take raw
/// scalar/array types directly, never this enum; it's just the shared
/// parameter type `field_to_json` dispatches on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Str(String),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Bool(bool),
    ByteArray(Vec<u8>),
    Int32Array(Vec<i32>),
    Float32Array(Vec<f32>),
}

fn encode_typed_array(clazz: &'static str, bytes: &[u8]) -> Value {
    let mut obj = Map::new();
    obj.insert("clazz".to_string(), Value::String(clazz.to_string()));
    obj.insert(
        "data".to_string(),
        Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    );
    Value::Object(obj)
}

fn field_to_json(v: &FieldValue) -> Value {
    match v {
        FieldValue::Str(s) => Value::String(s.clone()),
        FieldValue::Int32(n) => Value::from(*n),
        FieldValue::Int64(n) => Value::from(*n),
        FieldValue::Float32(f) => {
            serde_json::Number::from_f64(f64::from(*f)).map_or(Value::Null, Value::Number)
        }
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::ByteArray(bytes) => encode_typed_array("[B", bytes),
        FieldValue::Int32Array(xs) => {
            let mut bytes = Vec::with_capacity(xs.len() * 4);
            for x in xs {
                bytes.extend_from_slice(&x.to_le_bytes());
            }
            encode_typed_array("[I", &bytes)
        }
        FieldValue::Float32Array(xs) => {
            let mut bytes = Vec::with_capacity(xs.len() * 4);
            for x in xs {
                bytes.extend_from_slice(&x.to_le_bytes());
            }
            encode_typed_array("[F", &bytes)
        }
    }
}

/// A message under construction. Build one with [`MessageBuilder::new`],
/// populate it with the `add_*`/`set_*` methods, then hand it to
/// [`MessageBuilder::build`] to get a [`Message`] ready to send.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    id: String,
    clazz: String,
    perf: Performative,
    recipient: Option<AgentId>,
    in_reply_to: Option<String>,
    payload: Map<String, Value>,
}

impl MessageBuilder {
    /// Start a new message of the given class and performative. An id
    /// is generated immediately.
    #[must_use]
    pub fn new(clazz: impl Into<String>, perf: Performative) -> Self {
        Self {
            id: generate_id(),
            clazz: clazz.into(),
            perf,
            recipient: None,
            in_reply_to: None,
            payload: Map::new(),
        }
    }

    /// The id generated for this message at construction time.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn set_recipient(mut self, aid: AgentId) -> Self {
        self.recipient = Some(aid);
        self
    }

    #[must_use]
    pub fn set_in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    #[must_use]
    pub fn add_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload
            .insert(key.into(), field_to_json(&FieldValue::Str(value.into())));
        self
    }

    #[must_use]
    pub fn add_int32(mut self, key: impl Into<String>, value: i32) -> Self {
        self.payload
            .insert(key.into(), field_to_json(&FieldValue::Int32(value)));
        self
    }

    #[must_use]
    pub fn add_int64(mut self, key: impl Into<String>, value: i64) -> Self {
        self.payload
            .insert(key.into(), field_to_json(&FieldValue::Int64(value)));
        self
    }

    #[must_use]
    pub fn add_float32(mut self, key: impl Into<String>, value: f32) -> Self {
        self.payload
            .insert(key.into(), field_to_json(&FieldValue::Float32(value)));
        self
    }

    #[must_use]
    pub fn add_bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.payload
            .insert(key.into(), field_to_json(&FieldValue::Bool(value)));
        self
    }

    #[must_use]
    pub fn add_byte_array(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.payload.insert(
            key.into(),
            field_to_json(&FieldValue::ByteArray(value.into())),
        );
        self
    }

    #[must_use]
    pub fn add_int_array(mut self, key: impl Into<String>, value: impl Into<Vec<i32>>) -> Self {
        self.payload.insert(
            key.into(),
            field_to_json(&FieldValue::Int32Array(value.into())),
        );
        self
    }

    #[must_use]
    pub fn add_float_array(mut self, key: impl Into<String>, value: impl Into<Vec<f32>>) -> Self {
        self.payload.insert(
            key.into(),
            field_to_json(&FieldValue::Float32Array(value.into())),
        );
        self
    }

    /// Finish building. `sender` is intentionally not settable here —
    /// the gateway forces it to its own AID at send time, since the
    /// remote forbids spoofing it.
    #[must_use]
    pub fn build(self) -> Message {
        Message {
            id: self.id,
            clazz: self.clazz,
            perf: self.perf,
            sender: None,
            recipient: self.recipient,
            in_reply_to: self.in_reply_to,
            payload: self.payload,
        }
    }
}

/// A message, either freshly built (about to be sent) or parsed off
/// the wire (received).
#[derive(Debug, Clone)]
pub struct Message {
    id: String,
    clazz: String,
    perf: Performative,
    sender: Option<AgentId>,
    recipient: Option<AgentId>,
    in_reply_to: Option<String>,
    payload: Map<String, Value>,
}

impl Message {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn clazz(&self) -> &str {
        &self.clazz
    }

    #[must_use]
    pub const fn performative(&self) -> Performative {
        self.perf
    }

    #[must_use]
    pub fn sender(&self) -> Option<&AgentId> {
        self.sender.as_ref()
    }

    #[must_use]
    pub fn recipient(&self) -> Option<&AgentId> {
        self.recipient.as_ref()
    }

    #[must_use]
    pub fn in_reply_to(&self) -> Option<&str> {
        self.in_reply_to.as_deref()
    }

    /// Force the sender to `aid`, overriding whatever the builder set
    /// (which is always `None` — this exists for the session machine,
    /// which is the only code allowed to set it).
    pub(crate) fn set_sender(&mut self, aid: AgentId) {
        self.sender = Some(aid);
    }

    pub(crate) fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn get_string(&self, key: &str, default: Option<&str>) -> Option<String> {
        match self.payload.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            // An object/array-valued key (e.g. a [B]/[I]/[F]-encoded typed
            // array) is a type the scalar getter never matches — the C
            // reference only matches JSMN_STRING/JSMN_PRIMITIVE tokens and
            // skips nested objects/arrays by their token size instead.
            Some(Value::Null | Value::Object(_) | Value::Array(_)) | None => {
                default.map(str::to_string)
            }
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn get_int32(&self, key: &str, default: i32) -> i32 {
        self.payload
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(default)
    }

    pub fn get_int64(&self, key: &str, default: i64) -> i64 {
        self.payload
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn get_float32(&self, key: &str, default: f32) -> f32 {
        self.payload.get(key).and_then(Value::as_f64).map_or(default, |f| f as f32)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.payload
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    fn get_typed_array(&self, key: &str, expect_clazz: &str) -> Option<Vec<u8>> {
        let value = self.payload.get(key)?;
        if let Value::Object(obj) = value {
            let clazz = obj.get("clazz")?.as_str()?;
            if clazz != expect_clazz {
                return None;
            }
            let data = obj.get("data")?.as_str()?;
            return base64::engine::general_purpose::STANDARD.decode(data).ok();
        }
        None
    }

    /// Length of a byte/int/float array field, or `-1` if absent —
    /// matches the C reference's `get_*_array(..., NULL, 0)` length
    /// query convention.
    #[must_use]
    pub fn get_byte_array(&self, key: &str, out: Option<&mut [u8]>) -> i32 {
        let bytes = if let Some(Value::Array(items)) = self.payload.get(key) {
            items
                .iter()
                .filter_map(Value::as_u64)
                .map(|v| v as u8)
                .collect()
        } else if let Some(bytes) = self.get_typed_array(key, "[B") {
            bytes
        } else {
            return -1;
        };
        if let Some(out) = out {
            let n = out.len().min(bytes.len());
            out[..n].copy_from_slice(&bytes[..n]);
        }
        i32::try_from(bytes.len()).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub fn get_int_array(&self, key: &str, out: Option<&mut [i32]>) -> i32 {
        let values: Vec<i32> = if let Some(Value::Array(items)) = self.payload.get(key) {
            items
                .iter()
                .filter_map(Value::as_i64)
                .filter_map(|v| i32::try_from(v).ok())
                .collect()
        } else if let Some(bytes) = self.get_typed_array(key, "[I") {
            bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        } else {
            return -1;
        };
        if let Some(out) = out {
            let n = out.len().min(values.len());
            out[..n].copy_from_slice(&values[..n]);
        }
        i32::try_from(values.len()).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub fn get_float_array(&self, key: &str, out: Option<&mut [f32]>) -> i32 {
        let values: Vec<f32> = if let Some(Value::Array(items)) = self.payload.get(key) {
            items
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect()
        } else if let Some(bytes) = self.get_typed_array(key, "[F") {
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        } else {
            return -1;
        };
        if let Some(out) = out {
            let n = out.len().min(values.len());
            out[..n].copy_from_slice(&values[..n]);
        }
        i32::try_from(values.len()).unwrap_or(i32::MAX)
    }

    /// Parse a fully-decoded envelope `data` object into a readable
    /// message. `clazz` is the sibling `"clazz"` key from the envelope.
    /// Parse a single envelope object — `{"clazz":"...","data":{...}}`
    /// — such as the one embedded in an inbound `send` frame's
    /// `"message"` field. Returns `None` on malformed JSON or a missing
    /// `msgID`.
    #[must_use]
    pub fn parse(envelope_json: &str) -> Option<Self> {
        let Value::Object(envelope) = serde_json::from_str(envelope_json).ok()? else {
            return None;
        };
        let clazz = envelope.get("clazz")?.as_str()?.to_string();
        let Value::Object(data) = envelope.get("data")?.clone() else {
            return None;
        };
        Self::from_wire(clazz, data)
    }

    pub(crate) fn from_wire(clazz: String, mut data: Map<String, Value>) -> Option<Self> {
        let id = data.remove("msgID").and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })?;
        let perf = data
            .remove("perf")
            .and_then(|v| v.as_str().and_then(Performative::from_wire_str))
            .unwrap_or_default();
        let sender = data
            .remove("sender")
            .and_then(|v| v.as_str().map(AgentId::parse));
        let recipient = data
            .remove("recipient")
            .and_then(|v| v.as_str().map(AgentId::parse));
        let in_reply_to = data.remove("inReplyTo").and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        });
        Some(Self {
            id,
            clazz,
            perf,
            sender,
            recipient,
            in_reply_to,
            payload: data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_is_36_chars_from_alphabet() {
        let id = generate_id();
        assert_eq!(id.len(), 36);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn builder_roundtrips_scalars_through_wire_shape() {
        let msg = MessageBuilder::new("org.arl.fjage.test.TestMessage", Performative::Inform)
            .add_string("mystring", "myvalue")
            .add_int32("myint", 7)
            .add_int64("mylong", 77)
            .add_float32("myfloat", 2.7)
            .add_bool("mytbool", true)
            .add_bool("myfbool", false)
            .build();
        assert_eq!(msg.get_string("mystring", None).as_deref(), Some("myvalue"));
        assert_eq!(msg.get_int32("myint", -1), 7);
        assert_eq!(msg.get_int64("mylong", -1), 77);
        assert!((msg.get_float32("myfloat", 0.0) - 2.7).abs() < 0.01);
        assert!(msg.get_bool("mytbool", false));
        assert!(!msg.get_bool("myfbool", true));
    }

    #[test]
    fn typed_arrays_roundtrip_through_base64() {
        let msg = MessageBuilder::new("x", Performative::Inform)
            .add_byte_array("mydata", vec![7u8, 6, 5, 4, 3, 2, 1])
            .add_float_array("mysignal", vec![3.0f32, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0])
            .build();
        assert_eq!(msg.get_byte_array("mydata", None), 7);
        let mut bytes = [0u8; 7];
        msg.get_byte_array("mydata", Some(&mut bytes));
        assert_eq!(bytes, [7, 6, 5, 4, 3, 2, 1]);

        assert_eq!(msg.get_float_array("mysignal", None), 7);
        let mut floats = [0f32; 7];
        msg.get_float_array("mysignal", Some(&mut floats));
        assert!((floats[0] - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_array_field_returns_negative_one() {
        let msg = MessageBuilder::new("x", Performative::None).build();
        assert_eq!(msg.get_byte_array("nope", None), -1);
        assert_eq!(msg.get_int_array("nope", None), -1);
        assert_eq!(msg.get_float_array("nope", None), -1);
    }

    #[test]
    fn from_wire_requires_msg_id() {
        let mut data = Map::new();
        data.insert("perf".to_string(), Value::String("INFORM".to_string()));
        assert!(Message::from_wire("x".to_string(), data).is_none());
    }
}
