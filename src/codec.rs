//! The wire codec: one JSON object per line, newline-terminated.
//!
//! Outbound envelope shape and control-frame shapes, and the inbound
//! line classifier the session machine dispatches on.

use serde_json::{Map, Value};

use crate::aid::AgentId;
use crate::message::Message;

/// The result of classifying one parsed inbound line.
pub(crate) enum InboundFrame {
    /// `{"action":"send","message":{...}}` — a message addressed to
    /// somebody; the session machine still has to check whether it's
    /// addressed to us or a subscribed topic.
    Deliver(Message),
    /// A response to our `agentForService` discovery request.
    AgentForService { id: String, agent_id: Option<AgentId> },
    /// A response to our `agentsForService` discovery request.
    AgentsForService { id: String, agent_ids: Vec<AgentId> },
    /// An `action` other than `"send"` — the session machine answers
    /// these with an explicit `answer:false` refusal.
    Unrecognized { id: Option<String>, action: Option<String> },
}

/// Parse one line of input into an [`InboundFrame`]. Returns `None` on
/// a JSON parse failure or a malformed frame — both are silently
/// dropped per the wire codec's contract.
pub(crate) fn parse_line(line: &str) -> Option<InboundFrame> {
    let value: Value = serde_json::from_str(line).ok()?;
    let Value::Object(obj) = value else {
        return None;
    };

    if let Some(action) = obj.get("action").and_then(Value::as_str) {
        if action == "send" {
            let envelope = obj.get("message")?;
            let msg = Message::parse(&envelope.to_string())?;
            return Some(InboundFrame::Deliver(msg));
        }
        let id = obj.get("id").and_then(Value::as_str).map(str::to_string);
        return Some(InboundFrame::Unrecognized {
            id,
            action: Some(action.to_string()),
        });
    }

    if let Some(id) = obj.get("id").and_then(Value::as_str) {
        // A frame with no `action` key is only meaningful as a reply to one
        // of our own discovery requests; anything else (including an
        // unrecognized `inResponseTo`) is silently ignored, not refused —
        // the container only refuses unrecognized *actions* (above).
        match obj.get("inResponseTo").and_then(Value::as_str) {
            Some("agentForService") => {
                let agent_id = obj.get("agentID").and_then(Value::as_str).map(AgentId::parse);
                return Some(InboundFrame::AgentForService {
                    id: id.to_string(),
                    agent_id,
                });
            }
            Some("agentsForService") => {
                let agent_ids = obj
                    .get("agentIDs")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(AgentId::parse)
                            .collect()
                    })
                    .unwrap_or_default();
                return Some(InboundFrame::AgentsForService {
                    id: id.to_string(),
                    agent_ids,
                });
            }
            _ => return None,
        }
    }

    None
}

/// Encode a message envelope, forcing `sender` to `self_aid` regardless
/// of what the builder set.
fn encode_envelope(msg: &Message, self_aid: &AgentId) -> Value {
    let mut data = Map::new();
    data.insert("msgID".to_string(), Value::String(msg.id().to_string()));
    if let Some(s) = msg.performative().as_wire_str() {
        data.insert("perf".to_string(), Value::String(s.to_string()));
    }
    if let Some(recipient) = msg.recipient() {
        data.insert(
            "recipient".to_string(),
            Value::String(recipient.to_wire_string()),
        );
    }
    if let Some(id) = msg.in_reply_to() {
        data.insert("inReplyTo".to_string(), Value::String(id.to_string()));
    }
    data.insert(
        "sender".to_string(),
        Value::String(self_aid.to_wire_string()),
    );
    for (k, v) in msg.payload() {
        data.insert(k.clone(), v.clone());
    }

    let mut envelope = Map::new();
    envelope.insert("clazz".to_string(), Value::String(msg.clazz().to_string()));
    envelope.insert("data".to_string(), Value::Object(data));
    Value::Object(envelope)
}

/// Encode the outbound `send` control frame for `msg`.
pub(crate) fn encode_send(msg: &Message, self_aid: &AgentId) -> String {
    let mut frame = Map::new();
    frame.insert("action".to_string(), Value::String("send".to_string()));
    frame.insert("relay".to_string(), Value::Bool(true));
    frame.insert("message".to_string(), encode_envelope(msg, self_aid));
    Value::Object(frame).to_string()
}

pub(crate) fn encode_agent_for_service(id: &str, service: &str) -> String {
    let mut frame = Map::new();
    frame.insert(
        "action".to_string(),
        Value::String("agentForService".to_string()),
    );
    frame.insert("id".to_string(), Value::String(id.to_string()));
    frame.insert("service".to_string(), Value::String(service.to_string()));
    Value::Object(frame).to_string()
}

pub(crate) fn encode_agents_for_service(id: &str, service: &str) -> String {
    let mut frame = Map::new();
    frame.insert(
        "action".to_string(),
        Value::String("agentsForService".to_string()),
    );
    frame.insert("id".to_string(), Value::String(id.to_string()));
    frame.insert("service".to_string(), Value::String(service.to_string()));
    Value::Object(frame).to_string()
}

/// Encode the `wantsMessagesFor` subscription advertisement: our own
/// AID plus every currently subscribed topic/agent.
pub(crate) fn encode_wants_messages_for<'a>(
    self_aid: &AgentId,
    subscriptions: impl Iterator<Item = &'a str>,
) -> String {
    let mut ids = vec![Value::String(self_aid.to_wire_string())];
    ids.extend(subscriptions.map(|s| Value::String(s.to_string())));
    let mut frame = Map::new();
    frame.insert(
        "action".to_string(),
        Value::String("wantsMessagesFor".to_string()),
    );
    frame.insert("agentIDs".to_string(), Value::Array(ids));
    Value::Object(frame).to_string()
}

/// Encode an `answer:false` refusal for an unsolicited or unrecognized
/// incoming frame.
pub(crate) fn encode_refusal(id: Option<&str>, action: Option<&str>) -> String {
    let mut frame = Map::new();
    if let Some(id) = id {
        frame.insert("id".to_string(), Value::String(id.to_string()));
    }
    if let Some(action) = action {
        frame.insert(
            "inResponseTo".to_string(),
            Value::String(action.to_string()),
        );
    }
    frame.insert("answer".to_string(), Value::Bool(false));
    Value::Object(frame).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBuilder;
    use crate::perf::Performative;

    #[test]
    fn encode_send_forces_sender_and_omits_absent_fields() {
        let self_aid = AgentId::agent("CGatewayAgent@deadbeef");
        let msg = MessageBuilder::new("org.arl.fjage.test.TestMessage", Performative::Inform)
            .add_string("mystring", "myvalue")
            .build();
        let line = encode_send(&msg, &self_aid);
        let value: Value = serde_json::from_str(&line).unwrap();
        let data = &value["message"]["data"];
        assert_eq!(data["sender"], "CGatewayAgent@deadbeef");
        assert_eq!(data["perf"], "INFORM");
        assert!(data.get("recipient").is_none());
        assert!(data.get("inReplyTo").is_none());
        assert_eq!(data["mystring"], "myvalue");
    }

    #[test]
    fn encode_send_omits_perf_key_for_none() {
        let self_aid = AgentId::agent("a");
        let msg = MessageBuilder::new("x", Performative::None).build();
        let line = encode_send(&msg, &self_aid);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert!(value["message"]["data"].get("perf").is_none());
    }

    #[test]
    fn parse_line_recognizes_send_action() {
        let self_aid = AgentId::agent("a");
        let msg = MessageBuilder::new("org.arl.fjage.test.TestMessage", Performative::Inform)
            .set_recipient(AgentId::agent("a"))
            .build();
        let line = encode_send(&msg, &self_aid);
        match parse_line(&line) {
            Some(InboundFrame::Deliver(m)) => {
                assert_eq!(m.clazz(), "org.arl.fjage.test.TestMessage");
                assert_eq!(m.recipient().map(AgentId::to_wire_string).as_deref(), Some("a"));
            }
            _ => panic!("expected Deliver"),
        }
    }

    #[test]
    fn parse_line_recognizes_discovery_response() {
        let line = r#"{"id":"abc","inResponseTo":"agentForService","agentID":"shell"}"#;
        match parse_line(line) {
            Some(InboundFrame::AgentForService { id, agent_id }) => {
                assert_eq!(id, "abc");
                assert_eq!(agent_id.unwrap().to_wire_string(), "shell");
            }
            _ => panic!("expected AgentForService"),
        }
    }

    #[test]
    fn parse_line_drops_malformed_json() {
        assert!(parse_line("not json").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn parse_line_flags_unrecognized_action() {
        let line = r#"{"action":"somethingElse","id":"xyz"}"#;
        match parse_line(line) {
            Some(InboundFrame::Unrecognized { id, action }) => {
                assert_eq!(id.as_deref(), Some("xyz"));
                assert_eq!(action.as_deref(), Some("somethingElse"));
            }
            _ => panic!("expected Unrecognized"),
        }
    }
}
