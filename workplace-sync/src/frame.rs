//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! A WebSocket text message carries one Engine.IO packet: a single type digit
//! followed by its payload. Engine.IO `message` packets carry Socket.IO
//! packets, encoded as
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json>]
//! ```
//!
//! Over long-polling, one HTTP body carries several Engine.IO packets joined
//! by the record separator `\x1e`.
//!
//! Binary attachments are not used by the notification server and are
//! rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Separates packets inside a long-polling payload.
pub const RECORD_SEPARATOR: char = '\x1e';

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),

    #[error("event packet without a name")]
    MissingEventName,
}

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let payload = chars.as_str();
        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(payload)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(payload.to_string())),
            '3' => Ok(EnginePacket::Pong(payload.to_string())),
            '4' => Ok(EnginePacket::Message(payload.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            kind => Err(FrameError::UnknownType {
                layer: "engine",
                kind,
            }),
        }
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(match self {
            EnginePacket::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        })
    }
}

/// Split a long-polling body into its packets.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, FrameError> {
    body.split(RECORD_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(EnginePacket::decode)
        .collect()
}

pub fn encode_payload(packets: &[EnginePacket]) -> Result<String, FrameError> {
    let encoded = packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encoded.join(&RECORD_SEPARATOR.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    /// Event on the default namespace.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args,
        }
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(FrameError::Unsupported("binary attachments"));
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(end) => {
                    let namespace = &rest[..end];
                    rest = &rest[end + 1..];
                    namespace.to_string()
                }
                None => {
                    let namespace = rest.to_string();
                    rest = "";
                    namespace
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|_| FrameError::Unsupported("ack id out of range"))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let json = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect {
                namespace,
                data: json,
            }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = match json {
                    Some(Value::Array(args)) => args,
                    _ => return Err(FrameError::MissingEventName),
                };
                if args.is_empty() {
                    return Err(FrameError::MissingEventName);
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    _ => return Err(FrameError::MissingEventName),
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id.ok_or(FrameError::Unsupported("ack without id"))?;
                let args = match json {
                    Some(Value::Array(args)) => args,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError {
                namespace,
                data: json.unwrap_or(Value::Null),
            }),
            kind => Err(FrameError::UnknownType {
                layer: "socket",
                kind,
            }),
        }
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        let mut out = String::new();
        let (kind, namespace) = match self {
            SocketPacket::Connect { namespace, .. } => ('0', namespace),
            SocketPacket::Disconnect { namespace } => ('1', namespace),
            SocketPacket::Event { namespace, .. } => ('2', namespace),
            SocketPacket::Ack { namespace, .. } => ('3', namespace),
            SocketPacket::ConnectError { namespace, .. } => ('4', namespace),
        };
        out.push(kind);
        if namespace != DEFAULT_NAMESPACE && !namespace.is_empty() {
            out.push_str(namespace);
            out.push(',');
        }

        match self {
            SocketPacket::Connect { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&serde_json::to_string(data)?);
                }
            }
            SocketPacket::Disconnect { .. } => {}
            SocketPacket::Event {
                ack_id, name, args, ..
            } => {
                if let Some(id) = ack_id {
                    out.push_str(&id.to_string());
                }
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                out.push_str(&serde_json::to_string(&array)?);
            }
            SocketPacket::Ack { ack_id, args, .. } => {
                out.push_str(&ack_id.to_string());
                out.push_str(&serde_json::to_string(args)?);
            }
            SocketPacket::ConnectError { data, .. } => {
                out.push_str(&serde_json::to_string(data)?);
            }
        }
        Ok(out)
    }

    /// Wrap into the Engine.IO `message` packet that carries it.
    pub fn into_engine(self) -> Result<EnginePacket, FrameError> {
        Ok(EnginePacket::Message(self.encode()?))
    }
}
