use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub type UserId = i64;
pub type ArtifactId = i64;
pub type MessageId = i64;

pub const LATITUDE_LIMIT: f64 = 90.0;
pub const LONGITUDE_LIMIT: f64 = 180.0;

/// Access tier of an account. New accounts are always researchers; admins are
/// provisioned out of band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Researcher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "researcher" => Ok(Self::Researcher),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The {id, username, role} triple carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

/// User projection that is safe to hand to clients (no password hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

impl From<Identity> for PublicUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            role: identity.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
}

/// The mutable fields of an artifact, as submitted for create and update.
///
/// Coordinates are accepted either as JSON numbers or as numeric strings,
/// since form inputs commonly post them as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub name: String,
    #[serde(deserialize_with = "coordinate")]
    pub latitude: f64,
    #[serde(deserialize_with = "coordinate")]
    pub longitude: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    #[error("Name is required")]
    EmptyName,
    #[error("Latitude must be between -90 and 90 (got {0})")]
    LatitudeOutOfRange(f64),
    #[error("Longitude must be between -180 and 180 (got {0})")]
    LongitudeOutOfRange(f64),
    #[error("Message content cannot be empty")]
    EmptyContent,
}

impl ArtifactDraft {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks the name and coordinate ranges. NaN and infinities fail the
    /// range checks.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.name.trim().is_empty() {
            return Err(DraftError::EmptyName);
        }
        if !(-LATITUDE_LIMIT..=LATITUDE_LIMIT).contains(&self.latitude) {
            return Err(DraftError::LatitudeOutOfRange(self.latitude));
        }
        if !(-LONGITUDE_LIMIT..=LONGITUDE_LIMIT).contains(&self.longitude) {
            return Err(DraftError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

/// Rejects empty and whitespace-only message bodies.
pub fn validate_content(content: &str) -> Result<(), DraftError> {
    if content.trim().is_empty() {
        Err(DraftError::EmptyContent)
    } else {
        Ok(())
    }
}

/// A chat message joined with its author's username for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub artifact_id: ArtifactId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

fn coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse::<f64>().map_err(|_| {
            serde::de::Error::custom(format!("`{}` is not a numeric coordinate", s))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_its_own_display() {
        for role in [Role::Researcher, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Researcher);
    }

    #[test]
    fn draft_accepts_range_edges() {
        assert!(ArtifactDraft::new("Edge", 90.0, -180.0).validate().is_ok());
        assert!(ArtifactDraft::new("Edge", -90.0, 180.0).validate().is_ok());
    }

    #[test]
    fn draft_rejects_out_of_range_latitude() {
        assert_eq!(
            ArtifactDraft::new("Axe", 91.0, 0.0).validate(),
            Err(DraftError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            ArtifactDraft::new("Axe", -100.0, 0.0).validate(),
            Err(DraftError::LatitudeOutOfRange(-100.0))
        );
        assert!(ArtifactDraft::new("Axe", f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn draft_rejects_blank_name_and_bad_longitude() {
        assert_eq!(
            ArtifactDraft::new("   ", 0.0, 0.0).validate(),
            Err(DraftError::EmptyName)
        );
        assert_eq!(
            ArtifactDraft::new("Axe", 0.0, 180.5).validate(),
            Err(DraftError::LongitudeOutOfRange(180.5))
        );
    }

    #[test]
    fn coordinates_accept_numbers_and_numeric_strings() {
        let draft: ArtifactDraft = serde_json::from_str(
            r#"{"name":"Axe","latitude":"45.5","longitude":25,"description":"bronze"}"#,
        )
        .unwrap();
        assert_eq!(draft.latitude, 45.5);
        assert_eq!(draft.longitude, 25.0);
        assert_eq!(draft.description.as_deref(), Some("bronze"));

        let err = serde_json::from_str::<ArtifactDraft>(
            r#"{"name":"Axe","latitude":"north","longitude":25}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn whitespace_only_content_is_rejected() {
        assert_eq!(validate_content(" \n\t"), Err(DraftError::EmptyContent));
        assert!(validate_content("hello").is_ok());
    }
}
