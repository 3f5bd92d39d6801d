//! Wire framing for the chat protocol.
//!
//! Every frame is an 8-byte header followed by a UTF-8 JSON object:
//!
//! ```text
//! +---------+------+----------+----------+---------------------+
//! | version | kind | priority | reserved | payload length (BE) |
//! |   u8    |  u8  |    u8    |    u8    |        u32          |
//! +---------+------+----------+----------+---------------------+
//! ```
//!
//! A zero length means an empty payload.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::ChatError;

pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 8;

/// Structured frame payload.
pub type Payload = Map<String, Value>;

// ═══════════════════════════════════════════════════════════════
// Message kinds
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgKind {
    LoginRequest = 1,
    LoginResponse = 2,
    PrivateMessage = 3,
    GroupMessage = 4,
    ServerInfo = 5,
    CreateGroup = 6,
    SignupEmailRequest = 9,
    SignupEmailResponse = 10,
    VerifyEmailRequest = 11,
    VerifyEmailResponse = 12,
    SetCredentialsRequest = 13,
    SetCredentialsResponse = 14,
    ListUsersRequest = 15,
    ListUsersResponse = 16,
    FriendRequest = 17,
    FriendResponse = 18,
    FriendAccept = 19,
    FriendList = 20,
    CreateGroupResponse = 21,
    GroupAddMember = 22,
    GroupAddMemberResponse = 23,
    GroupRemoveMember = 24,
    GroupRemoveMemberResponse = 25,
    RequestAddMember = 26,
    RequestAddMemberResponse = 27,
    GetMemberRequests = 28,
    GetMemberRequestsResponse = 29,
    ApproveMemberRequest = 30,
    ApproveMemberResponse = 31,
    RejectMemberRequest = 32,
    RejectMemberResponse = 33,
}

impl MsgKind {
    pub const ALL: [MsgKind; 31] = [
        Self::LoginRequest,
        Self::LoginResponse,
        Self::PrivateMessage,
        Self::GroupMessage,
        Self::ServerInfo,
        Self::CreateGroup,
        Self::SignupEmailRequest,
        Self::SignupEmailResponse,
        Self::VerifyEmailRequest,
        Self::VerifyEmailResponse,
        Self::SetCredentialsRequest,
        Self::SetCredentialsResponse,
        Self::ListUsersRequest,
        Self::ListUsersResponse,
        Self::FriendRequest,
        Self::FriendResponse,
        Self::FriendAccept,
        Self::FriendList,
        Self::CreateGroupResponse,
        Self::GroupAddMember,
        Self::GroupAddMemberResponse,
        Self::GroupRemoveMember,
        Self::GroupRemoveMemberResponse,
        Self::RequestAddMember,
        Self::RequestAddMemberResponse,
        Self::GetMemberRequests,
        Self::GetMemberRequestsResponse,
        Self::ApproveMemberRequest,
        Self::ApproveMemberResponse,
        Self::RejectMemberRequest,
        Self::RejectMemberResponse,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// Chat traffic travels as [`Priority::Chat`], everything else as control.
    pub fn priority(self) -> Priority {
        match self {
            Self::PrivateMessage | Self::GroupMessage => Priority::Chat,
            _ => Priority::Control,
        }
    }

    /// Kinds a connection may send before it has logged in.
    pub fn allowed_before_login(self) -> bool {
        matches!(
            self,
            Self::LoginRequest
                | Self::SignupEmailRequest
                | Self::VerifyEmailRequest
                | Self::SetCredentialsRequest
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Priority {
    Control = 1,
    Chat = 2,
    /// Reserved for file transfer.
    File = 3,
}

// ═══════════════════════════════════════════════════════════════
// Frame
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub version: u8,
    /// Raw kind code; unknown codes survive decoding and are ignored upstream.
    pub kind: u8,
    pub priority: u8,
    pub payload: Payload,
}

impl Frame {
    pub fn new(kind: MsgKind, payload: Payload) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: kind.code(),
            priority: kind.priority() as u8,
            payload,
        }
    }

    /// Build a frame from any serializable body. Non-object bodies are
    /// rejected since the payload must be a key/value map.
    pub fn from_body<T: Serialize>(kind: MsgKind, body: &T) -> Result<Self, ChatError> {
        match serde_json::to_value(body)? {
            Value::Object(map) => Ok(Self::new(kind, map)),
            Value::Null => Ok(Self::new(kind, Map::new())),
            other => Err(ChatError::Serialize(serde::ser::Error::custom(format!(
                "payload must be an object, got {other}"
            )))),
        }
    }

    /// Size of the payload as it goes on the wire.
    pub fn payload_len(&self) -> Result<usize, ChatError> {
        if self.payload.is_empty() {
            return Ok(0);
        }
        Ok(serde_json::to_vec(&self.payload)?.len())
    }

    pub fn msg_kind(&self) -> Option<MsgKind> {
        MsgKind::from_code(self.kind)
    }

    /// Parse the payload into a request body. Fields of the wrong type make
    /// the whole body fall back to its default (all fields empty).
    pub fn body<T: DeserializeOwned + Default>(&self) -> T {
        match serde_json::from_value(Value::Object(self.payload.clone())) {
            Ok(body) => body,
            Err(e) => {
                warn!(kind = self.kind, "malformed payload fields: {e}");
                T::default()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Codec
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ChatError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > self.max_payload {
            return Err(ChatError::FrameTooLarge {
                len,
                max: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        let version = src.get_u8();
        let kind = src.get_u8();
        let priority = src.get_u8();
        let _reserved = src.get_u8();
        src.advance(4);
        let body = src.split_to(len);

        let payload = if body.is_empty() {
            Map::new()
        } else {
            match serde_json::from_slice::<Value>(&body) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(kind, len, "undecodable payload, treating as empty");
                    Map::new()
                }
            }
        };

        Ok(Some(Frame {
            version,
            kind,
            priority,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ChatError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ChatError> {
        let body = if frame.payload.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&frame.payload)?
        };
        if body.len() > self.max_payload {
            return Err(ChatError::FrameTooLarge {
                len: body.len(),
                max: self.max_payload,
            });
        }

        dst.reserve(HEADER_LEN + body.len());
        dst.put_u8(frame.version);
        dst.put_u8(frame.kind);
        dst.put_u8(frame.priority);
        dst.put_u8(0);
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
