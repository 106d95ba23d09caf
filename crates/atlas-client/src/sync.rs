use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use atlas_types::models::{Artifact, ArtifactDraft, ArtifactId, MessageId, MessageView};

use crate::client::AtlasClient;
use crate::error::ClientError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// -- Artifacts --

/// Cached artifact list. Writes go to the server and are followed by a
/// fresh read of the whole list; the cache is never edited locally.
#[derive(Debug)]
pub struct ArtifactCatalog {
    client: AtlasClient,
    artifacts: Vec<Artifact>,
}

impl ArtifactCatalog {
    pub fn new(client: AtlasClient) -> Self {
        Self {
            client,
            artifacts: Vec::new(),
        }
    }

    pub fn client(&self) -> &AtlasClient {
        &self.client
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn get(&self, id: ArtifactId) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    pub async fn refresh(&mut self) -> Result<&[Artifact], ClientError> {
        self.artifacts = self.client.list_artifacts().await?;
        Ok(&self.artifacts)
    }

    pub async fn create(&mut self, draft: &ArtifactDraft) -> Result<Artifact, ClientError> {
        let artifact = self.client.create_artifact(draft).await?;
        self.refresh_after_write().await;
        Ok(artifact)
    }

    pub async fn update(
        &mut self,
        id: ArtifactId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact, ClientError> {
        let artifact = self.client.update_artifact(id, draft).await?;
        self.refresh_after_write().await;
        Ok(artifact)
    }

    pub async fn delete(&mut self, id: ArtifactId) -> Result<(), ClientError> {
        self.client.delete_artifact(id).await?;
        self.refresh_after_write().await;
        Ok(())
    }

    /// The write already succeeded; a failed re-read leaves the old list
    /// in place until the next refresh.
    async fn refresh_after_write(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!("Catalog refresh after write failed: {}", e);
        }
    }
}

// -- Messages --

/// One artifact's chat thread, ordered by `(created_at, id)`.
#[derive(Debug, Clone, Default)]
pub struct MessageThread {
    artifact_id: ArtifactId,
    messages: Vec<MessageView>,
    seen: HashSet<MessageId>,
}

impl MessageThread {
    pub fn new(artifact_id: ArtifactId) -> Self {
        Self {
            artifact_id,
            ..Default::default()
        }
    }

    pub fn artifact_id(&self) -> ArtifactId {
        self.artifact_id
    }

    pub fn messages(&self) -> &[MessageView] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Adds the messages not seen before and returns them in thread order.
    /// Messages for other artifacts are ignored. Used for pushed messages;
    /// nothing is ever removed here.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = MessageView>) -> Vec<MessageView> {
        let mut fresh: Vec<MessageView> = batch
            .into_iter()
            .filter(|m| m.artifact_id == self.artifact_id && self.seen.insert(m.id))
            .collect();
        if fresh.is_empty() {
            return fresh;
        }

        sort_thread(&mut fresh);
        self.messages.extend(fresh.iter().cloned());
        sort_thread(&mut self.messages);
        fresh
    }

    /// Replaces the thread with `listing`, the full thread as the server
    /// returned it. Messages missing from it (deleted with their artifact)
    /// are dropped.
    pub fn replace(&mut self, listing: Vec<MessageView>) -> ThreadChange {
        let mut messages: Vec<MessageView> = listing
            .into_iter()
            .filter(|m| m.artifact_id == self.artifact_id)
            .collect();
        sort_thread(&mut messages);

        let seen: HashSet<MessageId> = messages.iter().map(|m| m.id).collect();
        let added = messages
            .iter()
            .filter(|m| !self.seen.contains(&m.id))
            .cloned()
            .collect();
        let removed = self
            .messages
            .iter()
            .map(|m| m.id)
            .filter(|id| !seen.contains(id))
            .collect();

        self.messages = messages;
        self.seen = seen;
        ThreadChange { added, removed }
    }

    pub async fn refresh(&mut self, client: &AtlasClient) -> Result<ThreadChange, ClientError> {
        let listing = client.list_messages(self.artifact_id).await?;
        Ok(self.replace(listing))
    }
}

fn sort_thread(messages: &mut [MessageView]) {
    messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
}

/// What a refresh changed: messages new to the thread, in thread order, and
/// ids the server no longer lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadChange {
    pub added: Vec<MessageView>,
    pub removed: Vec<MessageId>,
}

impl ThreadChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Polls a thread in the background and yields every change to it.
/// Polling stops when the poller is dropped.
pub struct ThreadPoller {
    artifact_id: ArtifactId,
    rx: mpsc::Receiver<ThreadChange>,
    task: JoinHandle<()>,
}

impl ThreadPoller {
    pub fn start(client: AtlasClient, artifact_id: ArtifactId) -> Self {
        Self::start_with_interval(client, artifact_id, DEFAULT_POLL_INTERVAL)
    }

    pub fn start_with_interval(client: AtlasClient, artifact_id: ArtifactId, period: Duration) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(poll_thread(client, artifact_id, period, tx));
        Self {
            artifact_id,
            rx,
            task,
        }
    }

    pub fn artifact_id(&self) -> ArtifactId {
        self.artifact_id
    }

    /// Next change to the thread. Each message is reported as added once.
    pub async fn recv(&mut self) -> Option<ThreadChange> {
        self.rx.recv().await
    }
}

impl Drop for ThreadPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_thread(
    client: AtlasClient,
    artifact_id: ArtifactId,
    period: Duration,
    tx: mpsc::Sender<ThreadChange>,
) {
    let mut thread = MessageThread::new(artifact_id);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // A failed poll is skipped; the next tick tries again.
        let change = match thread.refresh(&client).await {
            Ok(change) => change,
            Err(e) => {
                debug!("Poll of artifact {} failed: {}", artifact_id, e);
                continue;
            }
        };

        if !change.is_empty() && tx.send(change).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: MessageId, artifact_id: ArtifactId, secs: i64) -> MessageView {
        MessageView {
            id,
            artifact_id,
            user_id: 1,
            username: "alice".into(),
            content: format!("message {}", id),
            created_at: at(secs),
        }
    }

    #[test]
    fn merge_skips_duplicates() {
        let mut thread = MessageThread::new(3);
        assert_eq!(thread.merge(vec![msg(1, 3, 0), msg(2, 3, 1)]).len(), 2);

        let fresh = thread.merge(vec![msg(1, 3, 0), msg(2, 3, 1), msg(3, 3, 2)]);
        assert_eq!(fresh.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(thread.len(), 3);

        assert!(thread.merge(vec![msg(3, 3, 2)]).is_empty());
    }

    #[test]
    fn merge_orders_by_time_then_id() {
        let mut thread = MessageThread::new(3);
        thread.merge(vec![msg(5, 3, 10)]);
        thread.merge(vec![msg(9, 3, 5), msg(4, 3, 10), msg(2, 3, 20)]);

        let ids: Vec<_> = thread.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![9, 4, 5, 2]);
    }

    #[test]
    fn merge_ignores_other_threads() {
        let mut thread = MessageThread::new(3);
        assert!(thread.merge(vec![msg(1, 4, 0)]).is_empty());
        assert!(thread.is_empty());
    }

    #[test]
    fn replace_drops_messages_the_server_no_longer_lists() {
        let mut thread = MessageThread::new(3);
        let change = thread.replace(vec![msg(1, 3, 0), msg(2, 3, 1)]);
        assert_eq!(change.added.len(), 2);
        assert!(change.removed.is_empty());

        let change = thread.replace(vec![msg(2, 3, 1), msg(4, 3, 2)]);
        assert_eq!(change.added.iter().map(|m| m.id).collect::<Vec<_>>(), vec![4]);
        assert_eq!(change.removed, vec![1]);
        assert_eq!(thread.messages().iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 4]);

        let change = thread.replace(Vec::new());
        assert_eq!(change.removed, vec![2, 4]);
        assert!(thread.is_empty());

        // unchanged listing reports nothing
        assert!(thread.replace(Vec::new()).is_empty());
    }

    #[test]
    fn replace_sorts_and_skips_other_threads() {
        let mut thread = MessageThread::new(3);
        let change = thread.replace(vec![msg(7, 3, 9), msg(8, 4, 0), msg(6, 3, 1)]);
        assert_eq!(change.added.iter().map(|m| m.id).collect::<Vec<_>>(), vec![6, 7]);
        assert_eq!(thread.len(), 2);
    }
}
