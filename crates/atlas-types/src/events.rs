use serde::{Deserialize, Serialize};

use crate::models::{Artifact, ArtifactId, MessageView};

/// Events pushed over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Sent once when the socket is accepted
    Ready { heartbeat_secs: u64 },

    /// A message was posted to an artifact thread
    MessageCreate { message: MessageView },

    ArtifactCreate { artifact: Artifact },

    ArtifactUpdate { artifact: Artifact },

    /// An artifact and its whole thread were removed
    ArtifactDelete { id: ArtifactId },
}

impl GatewayEvent {
    /// Returns the artifact thread this event is scoped to.
    /// Events that return `None` are global and go to every connection.
    pub fn thread_id(&self) -> Option<ArtifactId> {
        match self {
            Self::MessageCreate { message } => Some(message.artifact_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving message events for these artifact threads.
    Subscribe { artifact_ids: Vec<ArtifactId> },

    Unsubscribe { artifact_ids: Vec<ArtifactId> },
}
