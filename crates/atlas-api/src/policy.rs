//! Access control.
//!
//! [`allow`] is the only place where roles are turned into decisions. Handlers
//! never compare roles themselves; they describe what they are about to do
//! and ask the policy through [`Caller::authorize`](crate::middleware::Caller::authorize).

use atlas_types::models::{ArtifactId, Identity, Role, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadArtifacts,
    CreateArtifact,
    UpdateArtifact,
    DeleteArtifact,
    ReadMessages,
    CreateMessage,
}

/// What an action is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The artifact collection as a whole.
    Catalog,
    Artifact(ArtifactId),
    /// The message thread of an artifact.
    Thread(ArtifactId),
    /// A message about to be posted, with the user it will be attributed to.
    Post {
        artifact_id: ArtifactId,
        author_id: Option<UserId>,
    },
}

/// | action          | anonymous | researcher        | admin |
/// |-----------------|-----------|-------------------|-------|
/// | read_artifacts  | yes       | yes               | yes   |
/// | create_artifact | no        | yes               | yes   |
/// | update_artifact | no        | no                | yes   |
/// | delete_artifact | no        | no                | yes   |
/// | read_messages   | yes       | yes               | yes   |
/// | create_message  | no        | own user_id only  | yes   |
pub fn allow(identity: Option<&Identity>, action: Action, resource: &Resource) -> bool {
    use Action::*;

    let Some(identity) = identity else {
        return matches!(action, ReadArtifacts | ReadMessages);
    };

    match (identity.role, action) {
        (_, ReadArtifacts | ReadMessages) => true,
        (Role::Admin, _) => true,
        (Role::Researcher, CreateArtifact) => true,
        (Role::Researcher, UpdateArtifact | DeleteArtifact) => false,
        (Role::Researcher, CreateMessage) => matches!(
            resource,
            Resource::Post { author_id: Some(author), .. } if *author == identity.id
        ),
    }
}

/// True when the action needs no identity at all.
pub fn is_public(action: Action, resource: &Resource) -> bool {
    allow(None, action, resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Action::*;

    fn who(id: UserId, role: Role) -> Identity {
        Identity {
            id,
            username: format!("user{id}"),
            role,
        }
    }

    const ALL: [Action; 6] = [
        ReadArtifacts,
        CreateArtifact,
        UpdateArtifact,
        DeleteArtifact,
        ReadMessages,
        CreateMessage,
    ];

    fn resource_for(action: Action, author_id: Option<UserId>) -> Resource {
        match action {
            ReadArtifacts | CreateArtifact => Resource::Catalog,
            UpdateArtifact | DeleteArtifact => Resource::Artifact(1),
            ReadMessages => Resource::Thread(1),
            CreateMessage => Resource::Post {
                artifact_id: 1,
                author_id,
            },
        }
    }

    #[test]
    fn anonymous_can_only_read() {
        let allowed: Vec<_> = ALL
            .into_iter()
            .filter(|a| allow(None, *a, &resource_for(*a, None)))
            .collect();
        assert_eq!(allowed, vec![ReadArtifacts, ReadMessages]);
    }

    #[test]
    fn researcher_row_matches_table() {
        let me = who(3, Role::Researcher);
        let allowed: Vec<_> = ALL
            .into_iter()
            .filter(|a| allow(Some(&me), *a, &resource_for(*a, Some(3))))
            .collect();
        assert_eq!(
            allowed,
            vec![ReadArtifacts, CreateArtifact, ReadMessages, CreateMessage]
        );
    }

    #[test]
    fn admin_may_do_everything() {
        let admin = who(1, Role::Admin);
        for action in ALL {
            assert!(allow(Some(&admin), action, &resource_for(action, Some(1))));
        }
    }

    #[test]
    fn researcher_cannot_post_as_someone_else() {
        let me = who(3, Role::Researcher);
        assert!(!allow(Some(&me), CreateMessage, &resource_for(CreateMessage, Some(4))));
        assert!(!allow(Some(&me), CreateMessage, &resource_for(CreateMessage, None)));
        assert!(!allow(Some(&me), CreateMessage, &Resource::Thread(1)));
    }

    #[test]
    fn public_actions_are_the_reads() {
        assert!(is_public(ReadArtifacts, &Resource::Catalog));
        assert!(is_public(ReadMessages, &Resource::Thread(2)));
        assert!(!is_public(CreateArtifact, &Resource::Catalog));
    }
}
