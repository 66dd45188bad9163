//! `ParameterReq` helper: a thin RPC layered on top of the core
//! gateway, not part of the session machine itself.
//!
//! Builds a message of class `org.arl.fjage.param.ParameterReq` with
//! `{index, param[, value]}`, sends it as a `REQUEST`, and waits up to
//! 1000 ms for an `INFORM` response. Both the getters and setters
//! exist for every scalar type the reference source supports (the
//! distilled spec mentioned only the getters; the setters are pulled
//! from the original `fjage_param_set_*` family — see DESIGN.md).

use std::time::Duration;

use crate::aid::AgentId;
use crate::gateway::Gateway;
use crate::message::MessageBuilder;
use crate::perf::Performative;

const PARAM_REQ_CLASS: &str = "org.arl.fjage.param.ParameterReq";
const PARAM_TIMEOUT: Duration = Duration::from_millis(1000);

fn request(
    gw: &mut Gateway,
    recipient: &AgentId,
    param: &str,
    index: i32,
) -> Option<crate::message::Message> {
    let msg = MessageBuilder::new(PARAM_REQ_CLASS, Performative::Request)
        .set_recipient(recipient.clone())
        .add_int32("index", index)
        .add_string("param", param)
        .build();
    let resp = gw.request(msg, PARAM_TIMEOUT)?;
    (resp.performative() == Performative::Inform).then_some(resp)
}

fn request_with_value(
    gw: &mut Gateway,
    recipient: &AgentId,
    param: &str,
    index: i32,
    build_value: impl FnOnce(MessageBuilder) -> MessageBuilder,
) -> bool {
    let builder = MessageBuilder::new(PARAM_REQ_CLASS, Performative::Request)
        .set_recipient(recipient.clone())
        .add_int32("index", index)
        .add_string("param", param);
    let msg = build_value(builder).build();
    gw.request(msg, PARAM_TIMEOUT)
        .is_some_and(|resp| resp.performative() == Performative::Inform)
}

/// Get an integer parameter. `ndx` is the parameter's array index, or
/// `-1` for a scalar (non-indexed) parameter. Returns `defval` if the
/// remote doesn't answer or answers with anything but `INFORM`.
pub fn get_int(gw: &mut Gateway, aid: &AgentId, param: &str, ndx: i32, defval: i32) -> i32 {
    request(gw, aid, param, ndx).map_or(defval, |resp| resp.get_int32("value", defval))
}

pub fn get_long(gw: &mut Gateway, aid: &AgentId, param: &str, ndx: i32, defval: i64) -> i64 {
    request(gw, aid, param, ndx).map_or(defval, |resp| resp.get_int64("value", defval))
}

pub fn get_float(gw: &mut Gateway, aid: &AgentId, param: &str, ndx: i32, defval: f32) -> f32 {
    request(gw, aid, param, ndx).map_or(defval, |resp| resp.get_float32("value", defval))
}

pub fn get_bool(gw: &mut Gateway, aid: &AgentId, param: &str, ndx: i32, defval: bool) -> bool {
    request(gw, aid, param, ndx).map_or(defval, |resp| resp.get_bool("value", defval))
}

/// Get a string parameter. Unlike the numeric getters this has no
/// default-value fallback parameter in the reference source: absence
/// or a non-`INFORM` response both surface as `None`.
pub fn get_string(gw: &mut Gateway, aid: &AgentId, param: &str, ndx: i32) -> Option<String> {
    request(gw, aid, param, ndx).and_then(|resp| resp.get_string("value", None))
}

/// Set an integer parameter. `true` on `INFORM` (success), `false`
/// otherwise.
pub fn set_int(gw: &mut Gateway, aid: &AgentId, param: &str, value: i32, ndx: i32) -> bool {
    request_with_value(gw, aid, param, ndx, |b| b.add_int32("value", value))
}

pub fn set_long(gw: &mut Gateway, aid: &AgentId, param: &str, value: i64, ndx: i32) -> bool {
    request_with_value(gw, aid, param, ndx, |b| b.add_int64("value", value))
}

pub fn set_float(gw: &mut Gateway, aid: &AgentId, param: &str, value: f32, ndx: i32) -> bool {
    request_with_value(gw, aid, param, ndx, |b| b.add_float32("value", value))
}

pub fn set_bool(gw: &mut Gateway, aid: &AgentId, param: &str, value: bool, ndx: i32) -> bool {
    request_with_value(gw, aid, param, ndx, |b| b.add_bool("value", value))
}

pub fn set_string(gw: &mut Gateway, aid: &AgentId, param: &str, value: &str, ndx: i32) -> bool {
    request_with_value(gw, aid, param, ndx, |b| b.add_string("value", value.to_string()))
}
