//! WebSocket 线协议
//!
//! 帧都是 JSON 文本：入站 `{"event", "data", "requestId"?}`，
//! 出站 `{"event", "data", "requestId"?}`。事件名只在这一层出现，
//! 应用层使用强类型的命令与事件。

use application::{ClientCommand, CommandOutcome, ServerEvent};
use domain::{ChatRoomId, RoomKey, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ErrorBody;

/// 客户端发来的原始帧
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub request_id: Option<Value>,
}

/// 解析后的入站请求
#[derive(Debug, PartialEq, Eq)]
pub enum InboundRequest {
    Command(ClientCommand),
    Ping,
}

#[derive(Debug, Deserialize)]
struct RoomData {
    room: RoomKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageData {
    chat_room_id: ChatRoomId,
    receiver_id: UserId,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingData {
    chat_room_id: ChatRoomId,
    is_typing: bool,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, ErrorBody> {
        serde_json::from_str(text)
            .map_err(|err| ErrorBody::new("BAD_FRAME", format!("malformed frame: {err}")))
    }

    pub fn into_request(self) -> Result<InboundRequest, ErrorBody> {
        let data = self.data;
        let command = match self.event.as_str() {
            "ping" => return Ok(InboundRequest::Ping),
            "joinRoom" => ClientCommand::JoinRoom {
                room: decode::<RoomData>(data)?.room,
            },
            "leaveRoom" => ClientCommand::LeaveRoom {
                room: decode::<RoomData>(data)?.room,
            },
            "sendMessage" => {
                let data = decode::<SendMessageData>(data)?;
                ClientCommand::SendMessage {
                    chat_room_id: data.chat_room_id,
                    receiver_id: data.receiver_id,
                    content: data.content,
                }
            }
            "setTyping" => {
                let data = decode::<TypingData>(data)?;
                ClientCommand::SetTyping {
                    chat_room_id: data.chat_room_id,
                    is_typing: data.is_typing,
                }
            }
            other => {
                return Err(ErrorBody::new(
                    "UNKNOWN_EVENT",
                    format!("unknown event `{other}`"),
                ))
            }
        };
        Ok(InboundRequest::Command(command))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T, ErrorBody> {
    serde_json::from_value(data)
        .map_err(|err| ErrorBody::new("BAD_FRAME", format!("invalid event data: {err}")))
}

/// 发给客户端的帧
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
}

impl ServerFrame {
    fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            request_id: None,
        }
    }

    pub fn ack(request_id: Option<Value>, outcome: &CommandOutcome) -> Self {
        let data = match outcome {
            CommandOutcome::Joined { room, newly } => json!({ "room": room, "joined": newly }),
            CommandOutcome::Left { room, was_member } => json!({ "room": room, "left": was_member }),
            CommandOutcome::MessageSent(message) => json!(message),
            CommandOutcome::TypingRelayed { delivered } => json!({ "delivered": delivered }),
        };
        Self {
            request_id,
            ..Self::new("ack", data)
        }
    }

    pub fn error(request_id: Option<Value>, body: &ErrorBody) -> Self {
        Self {
            request_id,
            ..Self::new("error", json!(body))
        }
    }

    pub fn pong(request_id: Option<Value>) -> Self {
        Self {
            request_id,
            ..Self::new("pong", Value::Null)
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&ServerEvent> for ServerFrame {
    fn from(event: &ServerEvent) -> Self {
        match event {
            ServerEvent::MessageCreated(message) => Self::new("message.created", json!(message)),
            ServerEvent::TypingChanged {
                chat_room_id,
                user_id,
                is_typing,
            } => Self::new(
                "typing.changed",
                json!({
                    "chatRoomId": chat_room_id,
                    "userId": user_id,
                    "isTyping": is_typing,
                }),
            ),
            ServerEvent::Admin { kind, payload } => Self::new(format!("admin.{kind}"), payload.clone()),
            ServerEvent::Business { kind, payload, .. } => {
                Self::new(format!("business.{kind}"), payload.clone())
            }
            ServerEvent::Review { kind, payload, .. } => {
                Self::new(format!("review.{kind}"), payload.clone())
            }
        }
    }
}
