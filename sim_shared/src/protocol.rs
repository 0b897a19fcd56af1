//! Wire protocol.
//!
//! Every frame is a JSON text message whose `type` field selects the variant.
//! Commands flow client -> server, events flow server -> client. Commands are
//! fire-and-forget: delivery is at-most-once and there is no acknowledgment or
//! error reply. Clients learn about the effect of a command only through the
//! events it causes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    body::{BodyKind, BodySpec},
    math::Pose,
};

/// Identifies a simulated body. Never reused while the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

// JSON object keys arrive as strings, and tagged enums buffer them before the
// key type sees them, so ids accept both numbers and decimal strings.
impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = EntityId;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-negative integer entity id")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<EntityId, E> {
                Ok(EntityId(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<EntityId, E> {
                u64::try_from(v)
                    .map(EntityId)
                    .map_err(|_| E::invalid_value(serde::de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<EntityId, E> {
                v.parse()
                    .map(EntityId)
                    .map_err(|_| E::invalid_value(serde::de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

impl EntityId {
    /// Reserved for the ground entity.
    pub const GROUND: Self = EntityId(0);
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    CreateBody {
        #[serde(rename = "bodyData")]
        body: BodySpec,
    },
    RemoveBody {
        #[serde(rename = "bodyId", alias = "id")]
        id: EntityId,
    },
    ResetWorld,
    Pause,
    Resume,
}

impl ClientCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::CreateBody { .. } => "createBody",
            ClientCommand::RemoveBody { .. } => "removeBody",
            ClientCommand::ResetWorld => "resetWorld",
            ClientCommand::Pause => "pause",
            ClientCommand::Resume => "resume",
        }
    }
}

/// Replicated state of one body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    #[serde(rename = "type")]
    pub kind: BodyKind,
}

impl BodyState {
    pub fn new(kind: BodyKind, pose: Pose) -> Self {
        Self {
            position: pose.position.to_array(),
            quaternion: pose.orientation.to_array(),
            kind,
        }
    }
}

/// Ordered id -> state mapping taken at one instant.
pub type Bodies = BTreeMap<EntityId, BodyState>;

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Sent once, privately, when a session joins.
    InitialState { bodies: Bodies },
    /// Periodic full snapshot.
    WorldState { bodies: Bodies },
    BodyCreated {
        #[serde(rename = "bodyId")]
        id: EntityId,
        #[serde(rename = "bodyType")]
        kind: BodyKind,
        position: [f32; 3],
        quaternion: [f32; 4],
    },
    BodyRemoved {
        #[serde(rename = "bodyId")]
        id: EntityId,
    },
    WorldReset,
    Pause,
    Resume,
}

impl ServerEvent {
    pub fn body_created(id: EntityId, kind: BodyKind, pose: Pose) -> Self {
        ServerEvent::BodyCreated {
            id,
            kind,
            position: pose.position.to_array(),
            quaternion: pose.orientation.to_array(),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::InitialState { .. } => "initialState",
            ServerEvent::WorldState { .. } => "worldState",
            ServerEvent::BodyCreated { .. } => "bodyCreated",
            ServerEvent::BodyRemoved { .. } => "bodyRemoved",
            ServerEvent::WorldReset => "worldReset",
            ServerEvent::Pause => "pause",
            ServerEvent::Resume => "resume",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[source] serde_json::Error),
    #[error("encode event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode event: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Parses one inbound text frame. Unknown discriminators, missing fields and
/// invalid body parameters are all reported as `InvalidCommand`.
pub fn decode_command(text: &str) -> Result<ClientCommand, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::InvalidCommand)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

pub fn decode_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Builds the JSON text of a command. Clients use this; the server only ever
/// decodes commands.
pub fn encode_command(command: &ClientCommand) -> String {
    let value = match command {
        ClientCommand::CreateBody { body } => serde_json::json!({
            "type": "createBody",
            "bodyData": crate::body::BodyData::from(*body),
        }),
        ClientCommand::RemoveBody { id } => serde_json::json!({
            "type": "removeBody",
            "bodyId": id,
        }),
        other => serde_json::json!({ "type": other.name() }),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::ShapeParams,
        math::{Quat, Vec3},
    };

    #[test]
    fn decodes_create_body_wire_example() {
        let text = r#"{"type":"createBody","bodyData":{"type":"box","mass":5,"position":{"x":0,"y":10,"z":0},"rotation":{"x":0,"y":0,"z":0,"w":1},"scale":{"x":1,"y":1,"z":1}}}"#;
        let ClientCommand::CreateBody { body } = decode_command(text).unwrap() else {
            panic!("expected createBody");
        };
        assert_eq!(body.kind(), BodyKind::Box);
        assert_eq!(body.mass(), 5.0);
        assert_eq!(body.pose().position, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(
            body.shape(),
            ShapeParams::Box {
                half_extents: Vec3::ONE
            }
        );
    }

    #[test]
    fn decodes_unit_commands_and_remove_aliases() {
        assert_eq!(decode_command(r#"{"type":"pause"}"#).unwrap(), ClientCommand::Pause);
        assert_eq!(decode_command(r#"{"type":"resume"}"#).unwrap(), ClientCommand::Resume);
        assert_eq!(
            decode_command(r#"{"type":"resetWorld"}"#).unwrap(),
            ClientCommand::ResetWorld
        );
        assert_eq!(
            decode_command(r#"{"type":"removeBody","bodyId":7}"#).unwrap(),
            ClientCommand::RemoveBody { id: EntityId(7) }
        );
        assert_eq!(
            decode_command(r#"{"type":"removeBody","id":7}"#).unwrap(),
            ClientCommand::RemoveBody { id: EntityId(7) }
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        for text in [
            "not json",
            r#"{"type":"explode"}"#,
            r#"{"bodyId":3}"#,
            r#"{"type":"removeBody"}"#,
            r#"{"type":"createBody","bodyData":{"type":"cone","mass":1,"position":{"x":0,"y":0,"z":0}}}"#,
            r#"{"type":"createBody","bodyData":{"type":"box","mass":-1,"position":{"x":0,"y":0,"z":0}}}"#,
            r#"{"type":"createBody","bodyData":{"type":"box","mass":1,"position":{"x":0,"y":1e39,"z":0}}}"#,
            r#"{"type":"createBody","bodyData":{"type":"box","mass":1}}"#,
        ] {
            assert!(
                matches!(decode_command(text), Err(ProtocolError::InvalidCommand(_))),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn world_state_uses_string_keys_and_array_poses() {
        let mut bodies = Bodies::new();
        bodies.insert(
            EntityId(3),
            BodyState::new(
                BodyKind::Box,
                Pose::new(Vec3::new(0.0, 9.5, 0.0), Quat::IDENTITY),
            ),
        );
        let text = encode_event(&ServerEvent::WorldState { bodies }).unwrap();
        assert_eq!(
            text,
            r#"{"type":"worldState","bodies":{"3":{"position":[0.0,9.5,0.0],"quaternion":[0.0,0.0,0.0,1.0],"type":"box"}}}"#
        );
        assert!(matches!(
            decode_event(&text).unwrap(),
            ServerEvent::WorldState { bodies } if bodies.contains_key(&EntityId(3))
        ));
    }

    #[test]
    fn body_created_wire_field_names() {
        let event = ServerEvent::body_created(EntityId(4), BodyKind::Sphere, Pose::default());
        let text = encode_event(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "bodyCreated");
        assert_eq!(value["bodyId"], 4);
        assert_eq!(value["bodyType"], "sphere");
        assert_eq!(value["quaternion"][3], 1.0);
    }

    #[test]
    fn encoded_commands_decode_back() {
        let body = BodySpec::new(
            BodyKind::Cylinder,
            2.0,
            Vec3::new(1.0, 2.0, 3.0),
            Quat::IDENTITY,
            ShapeParams::Cylinder {
                radius: 0.5,
                height: 1.0,
            },
        )
        .unwrap();
        let command = ClientCommand::CreateBody { body };
        assert_eq!(decode_command(&encode_command(&command)).unwrap(), command);
        let command = ClientCommand::RemoveBody { id: EntityId(9) };
        assert_eq!(decode_command(&encode_command(&command)).unwrap(), command);
    }
}
