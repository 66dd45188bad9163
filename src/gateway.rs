//! The gateway handle and its session machine.
//!
//! `Gateway` owns everything a session needs: the transport, the self
//! AID, the subscription set, the inbound queue, the interrupt
//! primitive, and the partial-line receive buffer. Every blocking
//! public method drives the session machine in-line up to its own
//! deadline; there is no background reader thread.

use std::io::{self, Write as _};
use std::time::{Duration, Instant};

use crate::aid::AgentId;
use crate::codec::{self, InboundFrame};
use crate::error::GatewayError;
use crate::message::{generate_id, Message};
use crate::queue::InboundQueue;
use crate::subscription::SubscriptionSet;
use crate::transport::Channel;
use crate::wait::{Interrupter, Wait, WaitOutcome};

/// What the current session-machine invocation is trying to satisfy.
enum Goal<'a> {
    /// Stop as soon as any inbound `send` is delivered to the queue.
    FirstInbound,
    /// Stop once a response correlated to this request id arrives.
    Correlation(&'a str),
}

/// How one session-machine invocation ended.
enum SessionOutcome {
    Done,
    TimedOut,
    Interrupted,
}

enum DiscoveryResult {
    One(Option<AgentId>),
    Many(Vec<AgentId>),
}

/// A connection to a remote fjage-style container, held as a
/// pseudo-agent. Not `Sync` — only [`Gateway::interrupter`]'s returned
/// handle may cross threads; every other method requires exclusive,
/// same-thread access.
pub struct Gateway {
    channel: Channel,
    self_aid: AgentId,
    subscriptions: SubscriptionSet,
    queue: InboundQueue,
    wait: Wait,
    buf: Vec<u8>,
    discovery_result: Option<DiscoveryResult>,
}

impl Gateway {
    fn new(channel: Channel, self_aid: AgentId) -> Result<Self, GatewayError> {
        Ok(Self {
            channel,
            self_aid,
            subscriptions: SubscriptionSet::new(),
            queue: InboundQueue::new(),
            wait: Wait::new()?,
            buf: Vec::new(),
            discovery_result: None,
        })
    }

    fn random_self_aid() -> AgentId {
        let suffix = crate::message::random_u64() as u32;
        AgentId::agent(format!("CGatewayAgent@{suffix:08x}"))
    }

    /// Connect to a container over TCP. Emits the initial
    /// `wantsMessagesFor` advertisement immediately, per the reference
    /// source's TCP path.
    pub fn open_tcp(host: impl AsRef<str>, port: u16) -> Result<Self, GatewayError> {
        let channel = Channel::connect_tcp(host.as_ref(), port)?;
        let mut gw = Self::new(channel, Self::random_self_aid())?;
        gw.advertise_subscriptions()?;
        tracing::debug!(aid = %gw.self_aid, host = host.as_ref(), port, "opened tcp gateway");
        Ok(gw)
    }

    /// Connect to a container over a serial device. Does **not** emit
    /// the initial `wantsMessagesFor` — the reference source's serial
    /// path omits it, and that asymmetry is preserved rather than
    /// "fixed" (see DESIGN.md).
    pub fn open_serial(path: impl AsRef<str>, baud: u32) -> Result<Self, GatewayError> {
        let channel = Channel::open_serial(path.as_ref(), baud)?;
        let gw = Self::new(channel, Self::random_self_aid())?;
        tracing::debug!(aid = %gw.self_aid, path = path.as_ref(), baud, "opened serial gateway");
        Ok(gw)
    }

    /// Open the serial device, write a single wakeup byte, and return.
    /// Does not construct a `Gateway` — this is a one-shot helper for
    /// waking a sleeping peer before opening the real connection.
    pub fn rs232_wakeup(path: impl AsRef<str>, baud: u32) -> Result<(), GatewayError> {
        Channel::rs232_wakeup(path.as_ref(), baud)
    }

    /// The gateway's own AID, of the form `CGatewayAgent@xxxxxxxx`.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.self_aid
    }

    /// A cloneable handle that can interrupt a blocked `receive`/
    /// `receive_any`/`request`/discovery call from another thread.
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        self.wait.interrupter()
    }

    /// Interrupt the current (or next) blocking call on this gateway.
    pub fn interrupt(&self) -> Result<(), GatewayError> {
        self.wait.interrupter().interrupt()
    }

    /// Tear down the gateway: the channel, the interrupt primitive, and
    /// any still-queued inbound messages are all dropped together.
    ///
    /// Ownership already makes this happen on an ordinary `drop`; this
    /// method exists only to give the teardown a name matching the
    /// reference source's `fjage_close`, for callers who want to close
    /// explicitly rather than rely on scope exit.
    pub fn close(self) {
        drop(self);
    }

    fn advertise_subscriptions(&mut self) -> Result<(), GatewayError> {
        let line = codec::encode_wants_messages_for(&self.self_aid, self.subscriptions.topics());
        self.write_line(&line)
    }

    /// Subscribe to a topic. Triggers a fresh `wantsMessagesFor`
    /// advertisement, which the remote treats as the authoritative
    /// filter.
    pub fn subscribe(&mut self, topic: &AgentId) -> Result<(), GatewayError> {
        self.subscriptions.subscribe(&topic.to_wire_string())?;
        self.advertise_subscriptions()
    }

    /// Subscribe to `aid`'s default notification topic
    /// (`"#" + aid + "__ntf"`).
    pub fn subscribe_agent(&mut self, aid: &AgentId) -> Result<(), GatewayError> {
        self.subscriptions.subscribe_agent(aid)?;
        self.advertise_subscriptions()
    }

    pub fn unsubscribe(&mut self, topic: &AgentId) -> Result<(), GatewayError> {
        self.subscriptions.unsubscribe(&topic.to_wire_string());
        self.advertise_subscriptions()
    }

    #[must_use]
    pub fn is_subscribed(&self, topic: &AgentId) -> bool {
        self.subscriptions.is_subscribed(&topic.to_wire_string())
    }

    /// Send a message. Its sender is always forced to this gateway's
    /// own AID; ownership is consumed regardless of whether the write
    /// succeeds.
    pub fn send(&mut self, msg: Message) -> Result<(), GatewayError> {
        let line = codec::encode_send(&msg, &self.self_aid);
        self.write_line(&line)
    }

    /// Block until a message matching `clazz` (if given) and
    /// `in_reply_to` (if given) is available, or `timeout` elapses, or
    /// the gateway is interrupted.
    pub fn receive(
        &mut self,
        clazz: Option<&str>,
        in_reply_to: Option<&str>,
        timeout: Duration,
    ) -> Option<Message> {
        self.wait.drain_stale();
        if let Some(m) = self.queue.get(clazz, in_reply_to) {
            return Some(m);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.run_session_machine(&Goal::FirstInbound, remaining) {
                Ok(SessionOutcome::Done) => {
                    if let Some(m) = self.queue.get(clazz, in_reply_to) {
                        return Some(m);
                    }
                    if Instant::now() >= deadline {
                        return None;
                    }
                }
                Ok(SessionOutcome::TimedOut | SessionOutcome::Interrupted) | Err(_) => {
                    return None;
                }
            }
        }
    }

    /// Like [`Gateway::receive`], but matching any class in `clazzes`
    /// rather than a single one (or a reply-id).
    pub fn receive_any(&mut self, clazzes: &[&str], timeout: Duration) -> Option<Message> {
        self.wait.drain_stale();
        if let Some(m) = self.queue.get_any(clazzes) {
            return Some(m);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.run_session_machine(&Goal::FirstInbound, remaining) {
                Ok(SessionOutcome::Done) => {
                    if let Some(m) = self.queue.get_any(clazzes) {
                        return Some(m);
                    }
                    if Instant::now() >= deadline {
                        return None;
                    }
                }
                Ok(SessionOutcome::TimedOut | SessionOutcome::Interrupted) | Err(_) => {
                    return None;
                }
            }
        }
    }

    /// Send `msg` and wait up to `timeout` for a reply correlated to
    /// it by `in_reply_to`.
    pub fn request(&mut self, msg: Message, timeout: Duration) -> Option<Message> {
        let id = msg.id().to_string();
        self.send(msg).ok()?;
        self.receive(None, Some(&id), timeout)
    }

    /// Resolve one agent providing `service`, or `None` if nobody
    /// answers within 1000 ms.
    pub fn agent_for_service(&mut self, service: &str) -> Option<AgentId> {
        self.discovery_result = None;
        self.wait.drain_stale();
        let req_id = generate_id();
        let line = codec::encode_agent_for_service(&req_id, service);
        self.write_line(&line).ok()?;
        match self.run_session_machine(&Goal::Correlation(&req_id), Duration::from_millis(1000)) {
            Ok(SessionOutcome::Done) => match self.discovery_result.take() {
                Some(DiscoveryResult::One(aid)) => aid,
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolve every agent providing `service`. Empty if nobody
    /// answers within 1000 ms.
    pub fn agents_for_service(&mut self, service: &str) -> Vec<AgentId> {
        self.discovery_result = None;
        self.wait.drain_stale();
        let req_id = generate_id();
        let line = codec::encode_agents_for_service(&req_id, service);
        if self.write_line(&line).is_err() {
            return Vec::new();
        }
        match self.run_session_machine(&Goal::Correlation(&req_id), Duration::from_millis(1000)) {
            Ok(SessionOutcome::Done) => match self.discovery_result.take() {
                Some(DiscoveryResult::Many(aids)) => aids,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Write one line to the channel, retrying on `WouldBlock` with a
    /// short sleep — the one other suspension point besides `open` and
    /// the session machine's `wait`.
    fn write_line(&mut self, line: &str) -> Result<(), GatewayError> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        let mut offset = 0;
        while offset < bytes.len() {
            match self.channel.write(&bytes[offset..]) {
                Ok(0) => {
                    return Err(GatewayError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned 0 bytes",
                    )))
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => return Err(GatewayError::Io(e)),
            }
        }
        Ok(())
    }

    fn run_session_machine(
        &mut self,
        goal: &Goal<'_>,
        timeout: Duration,
    ) -> Result<SessionOutcome, GatewayError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.wait.wait(self.channel.as_fd(), remaining)? {
                WaitOutcome::Interrupted => return Ok(SessionOutcome::Interrupted),
                WaitOutcome::TimedOut => return Ok(SessionOutcome::TimedOut),
                WaitOutcome::DataAvailable => {
                    if self.pump(goal)? {
                        return Ok(SessionOutcome::Done);
                    }
                    if Instant::now() >= deadline {
                        return Ok(SessionOutcome::TimedOut);
                    }
                }
            }
        }
    }

    /// Non-blocking-drain the channel into the line buffer, then
    /// process every complete line. Returns `true` as soon as one line
    /// satisfies `goal`.
    fn pump(&mut self, goal: &Goal<'_>) -> Result<bool, GatewayError> {
        let mut tmp = [0u8; 4096];
        loop {
            match io::Read::read(&mut self.channel, &mut tmp) {
                Ok(0) => break,
                Ok(n) => self.buf.extend_from_slice(&tmp[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(GatewayError::Io(e)),
            }
        }
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            if self.process_line(&line, goal) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn process_line(&mut self, line: &str, goal: &Goal<'_>) -> bool {
        match codec::parse_line(line) {
            Some(InboundFrame::Deliver(msg)) => {
                let addressed_to_us = msg.recipient().is_some_and(|r| {
                    let wire = r.to_wire_string();
                    wire == self.self_aid.to_wire_string() || self.subscriptions.is_subscribed(&wire)
                });
                if addressed_to_us {
                    self.queue.push(msg);
                    matches!(goal, Goal::FirstInbound)
                } else {
                    false
                }
            }
            Some(InboundFrame::AgentForService { id, agent_id }) => {
                if matches!(goal, Goal::Correlation(pending) if *pending == id.as_str()) {
                    self.discovery_result = Some(DiscoveryResult::One(agent_id));
                    true
                } else {
                    false
                }
            }
            Some(InboundFrame::AgentsForService { id, agent_ids }) => {
                if matches!(goal, Goal::Correlation(pending) if *pending == id.as_str()) {
                    self.discovery_result = Some(DiscoveryResult::Many(agent_ids));
                    true
                } else {
                    false
                }
            }
            Some(InboundFrame::Unrecognized { id, action }) => {
                let refusal = codec::encode_refusal(id.as_deref(), action.as_deref());
                let _ = self.write_line(&refusal);
                false
            }
            None => {
                tracing::trace!(%line, "dropped unparsable line");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write as _};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use crate::message::MessageBuilder;
    use crate::perf::Performative;

    fn spawn_fake_container() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn open_tcp_emits_initial_wants_messages_for() {
        let (listener, port) = spawn_fake_container();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            line
        });
        let _gw = Gateway::open_tcp("127.0.0.1", port).unwrap();
        let line = handle.join().unwrap();
        assert!(line.contains("wantsMessagesFor"));
    }

    #[test]
    fn receive_delivers_message_addressed_to_self() {
        let (listener, port) = spawn_fake_container();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap(); // initial wantsMessagesFor

            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            let self_aid = value["agentIDs"][0].as_str().unwrap().to_string();

            let mut envelope = serde_json::Map::new();
            let mut data = serde_json::Map::new();
            data.insert("msgID".into(), "id-1".into());
            data.insert("perf".into(), "INFORM".into());
            data.insert("recipient".into(), self_aid.into());
            data.insert("sender".into(), "shell".into());
            envelope.insert("clazz".into(), "org.arl.fjage.test.TestMessage".into());
            envelope.insert("data".into(), serde_json::Value::Object(data));
            let mut frame = serde_json::Map::new();
            frame.insert("action".into(), "send".into());
            frame.insert("message".into(), serde_json::Value::Object(envelope));
            let mut out = serde_json::Value::Object(frame).to_string();
            out.push('\n');
            stream.write_all(out.as_bytes()).unwrap();
            stream
        });
        let mut gw = Gateway::open_tcp("127.0.0.1", port).unwrap();
        let msg = gw
            .receive(None, None, Duration::from_millis(2000))
            .expect("message should arrive");
        assert_eq!(msg.clazz(), "org.arl.fjage.test.TestMessage");
        let _stream = handle.join().unwrap();
    }

    #[test]
    fn receive_times_out_with_no_traffic() {
        let (listener, port) = spawn_fake_container();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream
        });
        let mut gw = Gateway::open_tcp("127.0.0.1", port).unwrap();
        let start = Instant::now();
        let result = gw.receive(None, None, Duration::from_millis(200));
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(150));
        let _stream = handle.join().unwrap();
    }

    #[test]
    fn interrupt_unblocks_receive_promptly() {
        let (listener, port) = spawn_fake_container();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream
        });
        let mut gw = Gateway::open_tcp("127.0.0.1", port).unwrap();
        let interrupter = gw.interrupter();
        let watcher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            interrupter.interrupt().unwrap();
        });
        let start = Instant::now();
        let result = gw.receive(None, None, Duration::from_millis(5000));
        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_millis(1000));
        watcher.join().unwrap();
        let _stream = handle.join().unwrap();
    }

    #[test]
    fn unrecognized_action_gets_refused() {
        let (listener, port) = spawn_fake_container();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap(); // wantsMessagesFor
            stream
                .write_all(b"{\"action\":\"somethingElse\",\"id\":\"xyz\"}\n")
                .unwrap();
            let mut refusal = String::new();
            reader.read_line(&mut refusal).unwrap();
            refusal
        });
        let mut gw = Gateway::open_tcp("127.0.0.1", port).unwrap();
        // give the session machine a tick to process and refuse
        let _ = gw.receive(None, None, Duration::from_millis(200));
        let refusal = handle.join().unwrap();
        let value: serde_json::Value = serde_json::from_str(&refusal).unwrap();
        assert_eq!(value["answer"], false);
        assert_eq!(value["inResponseTo"], "somethingElse");
    }

    #[test]
    fn send_forces_self_as_sender() {
        let (listener, port) = spawn_fake_container();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap(); // wantsMessagesFor
            line.clear();
            reader.read_line(&mut line).unwrap(); // the send frame
            line
        });
        let mut gw = Gateway::open_tcp("127.0.0.1", port).unwrap();
        let self_aid = gw.agent_id().to_wire_string();
        let msg = MessageBuilder::new("x", Performative::Inform)
            .set_recipient(AgentId::agent("somebody-else"))
            .build();
        gw.send(msg).unwrap();
        let line = handle.join().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["message"]["data"]["sender"], self_aid);
    }
}
