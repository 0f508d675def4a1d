//! Data-change events emitted after every successful index mutation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::{HouseholdId, IndexName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Archived,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChangeEvent {
    /// e.g. `valid_ingredient_created`.
    pub topic: String,
    pub kind: ChangeKind,
    pub index: IndexName,
    pub user_id: String,
    pub household_id: Option<HouseholdId>,
    pub record: Value,
}

impl DataChangeEvent {
    pub fn new(
        topic_prefix: &str,
        kind: ChangeKind,
        index: IndexName,
        user_id: impl Into<String>,
        household_id: Option<HouseholdId>,
        record: Value,
    ) -> Self {
        DataChangeEvent {
            topic: format!("{}_{}", topic_prefix, kind.as_str()),
            kind,
            index,
            user_id: user_id.into(),
            household_id,
            record,
        }
    }

    /// `id` member of the carried record.
    pub fn record_id(&self) -> Option<&str> {
        self.record.get("id").and_then(Value::as_str)
    }
}

pub trait EventPublisher: Send + Sync + 'static {
    fn publish(&self, event: DataChangeEvent) -> Result<()>;
}

/// In-process bus backed by a tokio broadcast channel. Publishing with no
/// subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<DataChangeEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastPublisher { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChangeEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: DataChangeEvent) -> Result<()> {
        let topic = event.topic.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(topic = %topic, receivers, "data change published");
                Ok(())
            }
            Err(_) => {
                tracing::debug!(topic = %topic, "data change dropped, no subscribers");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: DataChangeEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: ChangeKind) -> DataChangeEvent {
        DataChangeEvent::new(
            "valid_ingredient",
            kind,
            IndexName::VALID_INGREDIENTS,
            "user-1",
            Some(3),
            json!({"id": "ing-1", "name": "onion"}),
        )
    }

    #[test]
    fn topic_joins_prefix_and_kind() {
        assert_eq!(event(ChangeKind::Archived).topic, "valid_ingredient_archived");
        assert_eq!(event(ChangeKind::Created).record_id(), Some("ing-1"));
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = BroadcastPublisher::new(8);
        let mut rx = bus.subscribe();
        bus.publish(event(ChangeKind::Updated)).unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.topic, "valid_ingredient_updated");
        assert_eq!(got.household_id, Some(3));
    }

    #[test]
    fn publishing_without_subscribers_is_ok() {
        let bus = BroadcastPublisher::new(1);
        bus.publish(event(ChangeKind::Created)).unwrap();
        NoopPublisher.publish(event(ChangeKind::Created)).unwrap();
    }
}
