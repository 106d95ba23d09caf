use atlas_types::models::{
    Artifact, ArtifactDraft, ArtifactId, MessageId, MessageView, Role, UserId, validate_content,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ffi, types::Type};

use crate::error::constraint_code;
use crate::models::UserRow;
use crate::{Database, Result, StoreError};

const USER_COLUMNS: &str = "id, username, password_hash, role";
const ARTIFACT_COLUMNS: &str = "id, name, latitude, longitude, description";

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<UserRow> {
        self.with_conn(|conn| {
            insert_user(conn, username, password_hash, role)?;
            let id = conn.last_insert_rowid();
            query_user(conn, "id = ?1", id)?.ok_or(StoreError::NotFound("User"))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Changes a stored role. Tokens already issued keep the role they were
    /// signed with until the user logs in again.
    pub fn set_user_role(&self, id: UserId, role: Role) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                (role.as_str(), id),
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("User"));
            }
            Ok(())
        })
    }

    /// Creates or promotes an admin account with the given credentials.
    pub fn ensure_admin(&self, username: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1, password_hash = ?2 WHERE username = ?3",
                (Role::Admin.as_str(), password_hash, username),
            )?;
            if changed == 0 {
                insert_user(conn, username, password_hash, Role::Admin)?;
            }
            query_user(conn, "username = ?1", username)?.ok_or(StoreError::NotFound("User"))
        })
    }

    // -- Artifacts --

    /// Full scan in storage order.
    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts ORDER BY id"))?;
            let rows = stmt
                .query_map([], artifact_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>> {
        self.with_conn(|conn| query_artifact(conn, id))
    }

    pub fn create_artifact(&self, draft: &ArtifactDraft) -> Result<Artifact> {
        draft.validate()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO artifacts (name, latitude, longitude, description) VALUES (?1, ?2, ?3, ?4)",
                (&draft.name, draft.latitude, draft.longitude, &draft.description),
            )?;
            let id = conn.last_insert_rowid();
            query_artifact(conn, id)?.ok_or(StoreError::NotFound("Artifact"))
        })
    }

    /// Replaces every mutable field. Last write wins.
    pub fn update_artifact(&self, id: ArtifactId, draft: &ArtifactDraft) -> Result<Artifact> {
        draft.validate()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE artifacts SET name = ?1, latitude = ?2, longitude = ?3, description = ?4 WHERE id = ?5",
                (&draft.name, draft.latitude, draft.longitude, &draft.description, id),
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("Artifact"));
            }
            query_artifact(conn, id)?.ok_or(StoreError::NotFound("Artifact"))
        })
    }

    /// Deletes the artifact; its messages go with it (ON DELETE CASCADE).
    pub fn delete_artifact(&self, id: ArtifactId) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM artifacts WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::NotFound("Artifact"));
            }
            Ok(())
        })
    }

    // -- Messages --

    /// Thread for one artifact, oldest first. An unknown artifact has an
    /// empty thread.
    pub fn list_messages(&self, artifact_id: ArtifactId) -> Result<Vec<MessageView>> {
        self.with_conn(|conn| {
            // JOIN users to fetch the username in a single query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.artifact_id, m.user_id, u.username, m.content, m.created_at
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.artifact_id = ?1
                 ORDER BY m.created_at ASC, m.id ASC",
            )?;
            let rows = stmt
                .query_map([artifact_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Appends to a thread. `created_at` is always assigned by the database.
    pub fn create_message(
        &self,
        artifact_id: ArtifactId,
        user_id: UserId,
        content: &str,
    ) -> Result<MessageView> {
        validate_content(content)?;
        self.with_conn(|conn| {
            if query_artifact(conn, artifact_id)?.is_none() {
                return Err(StoreError::NotFound("Artifact"));
            }

            conn.execute(
                "INSERT INTO messages (artifact_id, user_id, content) VALUES (?1, ?2, ?3)",
                (artifact_id, user_id, content),
            )
            .map_err(|e| match constraint_code(&e) {
                Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::NotFound("User"),
                _ => e.into(),
            })?;

            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or(StoreError::NotFound("Message"))
        })
    }
}

fn insert_user(conn: &Connection, username: &str, password_hash: &str, role: Role) -> Result<()> {
    conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
        (username, password_hash, role.as_str()),
    )
    .map_err(|e| match constraint_code(&e) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::DuplicateUsername,
        _ => e.into(),
    })?;
    Ok(())
}

fn query_user<P: rusqlite::ToSql>(conn: &Connection, filter: &str, value: P) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}"))?;

    let row = stmt
        .query_row([value], |row| {
            let role: String = row.get(3)?;
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                role: role
                    .parse()
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_artifact(conn: &Connection, id: ArtifactId) -> Result<Option<Artifact>> {
    let row = conn
        .query_row(
            &format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = ?1"),
            [id],
            artifact_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, id: MessageId) -> Result<Option<MessageView>> {
    let row = conn
        .query_row(
            "SELECT m.id, m.artifact_id, m.user_id, u.username, m.content, m.created_at
             FROM messages m
             JOIN users u ON m.user_id = u.id
             WHERE m.id = ?1",
            [id],
            message_from_row,
        )
        .optional()?;
    Ok(row)
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: row.get(0)?,
        name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        description: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageView> {
    let created_at: String = row.get(5)?;
    Ok(MessageView {
        id: row.get(0)?,
        artifact_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
    })
}
