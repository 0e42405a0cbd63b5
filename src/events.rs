use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted by the fulfillment services after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    LineItemSplit {
        line_item_id: Uuid,
        warehouse_qty: Decimal,
        manufacturer_qty: Decimal,
    },
    PickedQuantityUpdated {
        line_item_id: Uuid,
        picked_qty: Decimal,
        ready_to_ship: bool,
    },
    AssignmentAdded {
        fulfillment_order_id: Uuid,
        user_id: Uuid,
        role: String,
    },
    ManufacturerFulfilled {
        fulfillment_order_id: Uuid,
        line_item_ids: Vec<Uuid>,
    },
    ShipmentRequestLinked {
        fulfillment_order_id: Uuid,
        shipment_request_id: Uuid,
    },
    BackorderCancelled {
        fulfillment_order_id: Uuid,
        line_item_ids: Vec<Uuid>,
        reason: String,
    },
    DocumentUploaded {
        fulfillment_order_id: Uuid,
        document_id: Uuid,
        storage_key: String,
    },
    OrderStatusChanged {
        fulfillment_order_id: Uuid,
        old_status: String,
        new_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; failure to deliver is not a service failure.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }
}

/// Creates a channel pair with the standard buffer size.
pub fn channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(1024);
    (EventSender::new(tx), rx)
}

/// Consumer loop: logs events. Runs until all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("event processor started");
    while let Some(event) = receiver.recv().await {
        debug!("event: {:?}", event);
    }
    info!("event processor stopped");
}
