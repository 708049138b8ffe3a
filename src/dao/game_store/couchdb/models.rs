use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::{
    dao::models::{SessionEntity, SessionResultEntity, StoredStatus},
    engine::{Difficulty, GameMode},
    state::UserId,
};

pub const SESSION_PREFIX: &str = "session::";

/// CouchDB representation of a [`SessionEntity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(flatten)]
    pub session: SessionBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBody {
    pub session_id: Uuid,
    pub mode: GameMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    pub player1_id: UserId,
    pub player2_id: Option<UserId>,
    pub status: StoredStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    #[serde(default)]
    pub result: Option<SessionResultEntity>,
}

impl CouchSessionDocument {
    pub fn from_entity(entity: SessionEntity) -> Self {
        Self {
            id: session_doc_id(entity.id),
            rev: None,
            doc_type: "session".into(),
            session: SessionBody {
                session_id: entity.id,
                mode: entity.mode,
                difficulty: entity.difficulty,
                player1_id: entity.player1_id,
                player2_id: entity.player2_id,
                status: entity.status,
                created_at: entity.created_at,
                updated_at: entity.updated_at,
                result: entity.result,
            },
        }
    }

    pub fn into_entity(self) -> SessionEntity {
        let body = self.session;
        SessionEntity {
            id: body.session_id,
            mode: body.mode,
            difficulty: body.difficulty,
            player1_id: body.player1_id,
            player2_id: body.player2_id,
            status: body.status,
            created_at: body.created_at,
            updated_at: body.updated_at,
            result: body.result,
        }
    }
}

pub fn session_doc_id(id: Uuid) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_keeps_couch_metadata_at_top_level() {
        let now = SystemTime::now();
        let id = Uuid::new_v4();
        let doc = CouchSessionDocument::from_entity(SessionEntity {
            id,
            mode: GameMode::SinglePlayer,
            difficulty: Some(Difficulty::Hard),
            player1_id: 7,
            player2_id: None,
            status: StoredStatus::Playing,
            created_at: now,
            updated_at: now,
            result: None,
        });

        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["_id"], format!("session::{id}"));
        assert!(value.get("_rev").is_none());
        assert_eq!(value["type"], "session");
        assert_eq!(value["mode"], "single_player");
        assert_eq!(value["difficulty"], "hard");
        assert_eq!(value["status"], "playing");
    }
}
