//! The DNX wire protocol: a small set of tagged text messages wrapped in a
//! `<dnxMessage>` envelope, carried over unreliable datagrams.
//!
//! This is not general XML - it is the same ad-hoc tagged-field format
//! `dnxXml.c` produces: a flat sequence of `<Tag>value</Tag>` pairs with
//! no nesting, no attributes, no escaping beyond what the primitive
//! encodings need. A real XML parser would be overkill for a format
//! this small and would accept inputs no peer on the wire ever sends.

use std::fmt::Write as _;

use crate::error::{DnxError, DnxResult};
use crate::transport::MAX_MESSAGE_SIZE;
use crate::xid::Xid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeReqType {
    Register,
    Deregister,
}

impl NodeReqType {
    fn as_tag(self) -> &'static str {
        match self {
            NodeReqType::Register => "REGISTER",
            NodeReqType::Deregister => "DEREGISTER",
        }
    }

    fn parse(s: &str) -> DnxResult<Self> {
        match s {
            "REGISTER" => Ok(NodeReqType::Register),
            "DEREGISTER" => Ok(NodeReqType::Deregister),
            other => Err(DnxError::Syntax(format!("unknown ReqType {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgmtStatus {
    Ack,
    Nak,
}

impl MgmtStatus {
    fn as_tag(self) -> &'static str {
        match self {
            MgmtStatus::Ack => "ACK",
            MgmtStatus::Nak => "NAK",
        }
    }

    fn parse(s: &str) -> DnxResult<Self> {
        match s {
            "ACK" => Ok(MgmtStatus::Ack),
            "NAK" => Ok(MgmtStatus::Nak),
            other => Err(DnxError::Syntax(format!("unknown Status {other}"))),
        }
    }
}

/// A worker-ready advertisement, sent client -> server on the dispatch
/// channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRequest {
    pub xid: Xid,
    pub req_type: NodeReqType,
    pub job_cap: u32,
    pub ttl: u32,
    pub hostname: String,
}

/// A check to execute, sent server -> client on the dispatch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub xid: Xid,
    /// Always "Pending" on the wire: the state tag reflects the job's
    /// state at encode time, before the server's local state transitions
    /// to InProgress, matching `dnxDispatcher.c`.
    pub priority: u32,
    pub timeout: u32,
    pub command: String,
}

/// Sent client -> server to acknowledge a Result was received for
/// processing. The server never retransmits on a missing ack (see
/// DESIGN.md); it is logged, not acted on.
#[derive(Debug, Clone, PartialEq)]
pub struct JobAck {
    pub xid: Xid,
}

/// A completed (or synthesized-timeout) check result, sent client -> server
/// on the collect channel, or synthesized locally by the server's timer.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub xid: Xid,
    pub delta: f64,
    pub result_code: i32,
    pub result_data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MgmtRequest {
    pub xid: Xid,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MgmtReply {
    pub xid: Xid,
    pub status: MgmtStatus,
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DnxMessage {
    NodeRequest(NodeRequest),
    Job(Job),
    JobAck(JobAck),
    Result(CheckResult),
    MgmtRequest(MgmtRequest),
    MgmtReply(MgmtReply),
}

impl DnxMessage {
    fn request_tag(&self) -> &'static str {
        match self {
            DnxMessage::NodeRequest(_) => "NodeRequest",
            DnxMessage::Job(_) => "Job",
            DnxMessage::JobAck(_) => "JobAck",
            DnxMessage::Result(_) => "Result",
            DnxMessage::MgmtRequest(_) => "MgmtRequest",
            DnxMessage::MgmtReply(_) => "MgmtReply",
        }
    }
}

struct Writer {
    buf: String,
}

impl Writer {
    fn new(request: &str) -> Self {
        let mut buf = String::with_capacity(256);
        buf.push_str("<dnxMessage><Request>");
        buf.push_str(request);
        buf.push_str("</Request>");
        Self { buf }
    }

    fn tag(&mut self, tag: &str, value: &str) {
        let _ = write!(self.buf, "<{tag}>{value}</{tag}>");
    }

    /// Emits the XID under both the current tag name and the legacy `GUID`
    /// alias: senders emit both for one release cycle so that older peers
    /// that only understand `GUID` keep working.
    fn xid(&mut self, xid: &Xid) {
        let s = xid.to_string();
        self.tag("XID", &s);
        self.tag("GUID", &s);
    }

    fn finish(mut self) -> DnxResult<String> {
        self.buf.push_str("</dnxMessage>");
        if self.buf.len() > MAX_MESSAGE_SIZE {
            return Err(DnxError::Size(format!(
                "encoded message is {} bytes, max is {MAX_MESSAGE_SIZE}",
                self.buf.len()
            )));
        }
        Ok(self.buf)
    }
}

/// Finds the first `<tag>...</tag>` occurrence and returns its inner text.
/// Unknown tags elsewhere in the buffer are simply never looked up, which is
/// how "unknown tags are ignored" falls out of this scan-by-name approach.
fn get_tag<'a>(buf: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = buf.find(&open)? + open.len();
    let end = buf[start..].find(&close)? + start;
    Some(&buf[start..end])
}

fn require_tag<'a>(buf: &'a str, tag: &str) -> DnxResult<&'a str> {
    get_tag(buf, tag).ok_or_else(|| DnxError::Syntax(format!("missing required tag <{tag}>")))
}

/// Reads the XID field, accepting the legacy `GUID` tag as an alias when
/// `XID` is absent (older senders only emit `GUID`).
fn require_xid(buf: &str) -> DnxResult<Xid> {
    let raw = get_tag(buf, "XID")
        .or_else(|| get_tag(buf, "GUID"))
        .ok_or_else(|| DnxError::Syntax("missing XID/GUID tag".to_string()))?;
    raw.parse()
}

fn parse_u32(buf: &str, tag: &str) -> DnxResult<u32> {
    require_tag(buf, tag)?
        .parse()
        .map_err(|_| DnxError::Syntax(format!("malformed {tag}")))
}

fn parse_i32(buf: &str, tag: &str) -> DnxResult<i32> {
    require_tag(buf, tag)?
        .parse()
        .map_err(|_| DnxError::Syntax(format!("malformed {tag}")))
}

fn parse_f64(buf: &str, tag: &str) -> DnxResult<f64> {
    require_tag(buf, tag)?
        .parse()
        .map_err(|_| DnxError::Syntax(format!("malformed {tag}")))
}

pub fn encode(msg: &DnxMessage) -> DnxResult<String> {
    let mut w = Writer::new(msg.request_tag());
    match msg {
        DnxMessage::NodeRequest(m) => {
            w.xid(&m.xid);
            w.tag("ReqType", m.req_type.as_tag());
            w.tag("JobCap", &m.job_cap.to_string());
            w.tag("TTL", &m.ttl.to_string());
            w.tag("Hostname", &m.hostname);
        }
        DnxMessage::Job(m) => {
            w.xid(&m.xid);
            w.tag("State", "Pending");
            w.tag("Priority", &m.priority.to_string());
            w.tag("Timeout", &m.timeout.to_string());
            w.tag("Command", &m.command);
        }
        DnxMessage::JobAck(m) => {
            w.xid(&m.xid);
        }
        DnxMessage::Result(m) => {
            w.xid(&m.xid);
            w.tag("State", "Complete");
            w.tag("Delta", &m.delta.to_string());
            w.tag("ResultCode", &m.result_code.to_string());
            w.tag("ResultData", &m.result_data);
        }
        DnxMessage::MgmtRequest(m) => {
            w.xid(&m.xid);
            w.tag("Action", &m.action);
        }
        DnxMessage::MgmtReply(m) => {
            w.xid(&m.xid);
            w.tag("Status", m.status.as_tag());
            w.tag("Reply", &m.reply);
        }
    }
    w.finish()
}

pub fn decode(buf: &str) -> DnxResult<DnxMessage> {
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(DnxError::Size(format!(
            "received message is {} bytes, max is {MAX_MESSAGE_SIZE}",
            buf.len()
        )));
    }
    let request = require_tag(buf, "Request")?;
    match request {
        "NodeRequest" => Ok(DnxMessage::NodeRequest(NodeRequest {
            xid: require_xid(buf)?,
            req_type: NodeReqType::parse(require_tag(buf, "ReqType")?)?,
            job_cap: parse_u32(buf, "JobCap")?,
            ttl: parse_u32(buf, "TTL")?,
            hostname: require_tag(buf, "Hostname")?.to_string(),
        })),
        "Job" => Ok(DnxMessage::Job(Job {
            xid: require_xid(buf)?,
            priority: parse_u32(buf, "Priority")?,
            timeout: parse_u32(buf, "Timeout")?,
            command: require_tag(buf, "Command")?.to_string(),
        })),
        "JobAck" => Ok(DnxMessage::JobAck(JobAck {
            xid: require_xid(buf)?,
        })),
        "Result" => Ok(DnxMessage::Result(CheckResult {
            xid: require_xid(buf)?,
            delta: parse_f64(buf, "Delta")?,
            result_code: parse_i32(buf, "ResultCode")?,
            result_data: require_tag(buf, "ResultData")?.to_string(),
        })),
        "MgmtRequest" => Ok(DnxMessage::MgmtRequest(MgmtRequest {
            xid: require_xid(buf)?,
            action: require_tag(buf, "Action")?.to_string(),
        })),
        "MgmtReply" => Ok(DnxMessage::MgmtReply(MgmtReply {
            xid: require_xid(buf)?,
            status: MgmtStatus::parse(require_tag(buf, "Status")?)?,
            reply: require_tag(buf, "Reply")?.to_string(),
        })),
        other => Err(DnxError::Syntax(format!("unknown Request type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xid::ObjectKind;

    fn sample_messages() -> Vec<DnxMessage> {
        let xid = Xid::new(ObjectKind::Worker, 7, 3);
        vec![
            DnxMessage::NodeRequest(NodeRequest {
                xid,
                req_type: NodeReqType::Register,
                job_cap: 1,
                ttl: 25,
                hostname: "worker01".to_string(),
            }),
            DnxMessage::Job(Job {
                xid,
                priority: 1,
                timeout: 30,
                command: "check_disk -w 80 -c 90".to_string(),
            }),
            DnxMessage::JobAck(JobAck { xid }),
            DnxMessage::Result(CheckResult {
                xid,
                delta: 0.42,
                result_code: 0,
                result_data: "OK - disk ok".to_string(),
            }),
            DnxMessage::MgmtRequest(MgmtRequest {
                xid,
                action: "SHUTDOWN".to_string(),
            }),
            DnxMessage::MgmtReply(MgmtReply {
                xid,
                status: MgmtStatus::Ack,
                reply: "threads=3 ok=10 fail=0".to_string(),
            }),
        ]
    }

    #[test]
    fn round_trips_every_message_type() {
        for msg in sample_messages() {
            let encoded = encode(&msg).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn guid_alias_decodes_identically_to_xid() {
        let msg = DnxMessage::JobAck(JobAck {
            xid: Xid::new(ObjectKind::Job, 1, 0),
        });
        let encoded = encode(&msg).unwrap();
        assert!(encoded.contains("<GUID>"));
        assert!(encoded.contains("<XID>"));

        // Simulate an old sender that only emits GUID.
        let guid_only = encoded.replacen("<XID>0-1-0</XID>", "", 1);
        let decoded = decode(&guid_only).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let msg = DnxMessage::JobAck(JobAck {
            xid: Xid::new(ObjectKind::Job, 1, 0),
        });
        let encoded = encode(&msg).unwrap();
        let with_extra = encoded.replace(
            "</dnxMessage>",
            "<FutureField>surprise</FutureField></dnxMessage>",
        );
        let decoded = decode(&with_extra).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let msg = DnxMessage::Job(Job {
            xid: Xid::new(ObjectKind::Job, 1, 0),
            priority: 1,
            timeout: 30,
            command: "x".repeat(2000),
        });
        assert!(matches!(encode(&msg), Err(DnxError::Size(_))));
    }

    #[test]
    fn decode_rejects_missing_fields() {
        let broken = "<dnxMessage><Request>JobAck</Request></dnxMessage>";
        assert!(decode(broken).is_err());
    }
}
