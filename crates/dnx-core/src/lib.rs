//! Wire protocol, transaction identifiers and transport abstraction
//! shared by the server and client binaries.

pub mod error;
pub mod message;
pub mod transport;
pub mod xid;

pub use error::{DnxError, DnxResult};
pub use message::{
    decode, encode, CheckResult, DnxMessage, Job, JobAck, MgmtReply, MgmtRequest, MgmtStatus,
    NodeReqType, NodeRequest,
};
pub use transport::{ChannelUrl, RecvOutcome, Scheme, Transport, UdpTransport, MAX_MESSAGE_SIZE};
pub use xid::{ObjectKind, Xid};
