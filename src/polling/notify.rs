use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::ProductRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewProducts,
    ModifiedProducts,
    DeletedProducts,
}

/// The part of a product that is pushed to dashboard clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub model: String,
    pub category: String,
}

impl From<&ProductRecord> for ProductSummary {
    fn from(p: &ProductRecord) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            model: p.model.clone(),
            category: p.category.clone(),
        }
    }
}

/// Websocket message: `{ type, count, products, timestamp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub count: usize,
    pub products: Vec<ProductSummary>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, products: &[ProductRecord]) -> Self {
        Self {
            kind,
            count: products.len(),
            products: products.iter().map(ProductSummary::from).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives change notifications from the polling service.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Fans notifications out to every subscribed websocket client.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for NotificationHub {
    fn notify(&self, notification: Notification) {
        let kind = notification.kind;
        let count = notification.count;
        match self.tx.send(notification) {
            Ok(receivers) => info!(?kind, count, receivers, "Broadcast notification"),
            Err(_) => debug!(?kind, count, "No subscribers for notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_wire_shape() {
        let record = ProductRecord {
            id: "Acme_M3".into(),
            name: "Widget".into(),
            model: "M3".into(),
            category: "Gadgets".into(),
            ..ProductRecord::default()
        };
        let n = Notification::new(NotificationKind::NewProducts, &[record]);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "new_products");
        assert_eq!(json["count"], 1);
        assert_eq!(json["products"][0]["model"], "M3");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn hub_delivers_to_subscribers() {
        let hub = NotificationHub::new(4);
        let mut rx = hub.subscribe();
        hub.notify(Notification::new(NotificationKind::DeletedProducts, &[]));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::DeletedProducts);
        assert_eq!(received.count, 0);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let hub = NotificationHub::default();
        assert_eq!(hub.subscriber_count(), 0);
        let rx = hub.subscribe();
        let _other = hub.clone().subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 1);
    }
}
