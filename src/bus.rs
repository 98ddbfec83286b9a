//! Domain event publishing over NATS.
use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventBus { nats: Option<async_nats::Client> }

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self { nats: None } }

    /// Publishes each event on its subject. Failures are logged and dropped.
    pub async fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            tracing::debug!(subject = event.subject(), ?event, "Domain event");
            let Some(nats) = &self.nats else { continue };
            let payload = match serde_json::to_vec(event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode domain event");
                    continue;
                }
            };
            if let Err(e) = nats.publish(event.subject().to_string(), payload.into()).await {
                tracing::warn!(subject = event.subject(), error = %e, "Failed to publish domain event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_disabled_bus_accepts_events() {
        let bus = EventBus::disabled();
        bus.publish(&[DomainEvent::Order(OrderEvent::Paid { order_id: Uuid::new_v4() })]).await;
    }

    #[test]
    fn test_event_json_shape() {
        let id = Uuid::nil();
        let json = serde_json::to_value(DomainEvent::Order(OrderEvent::Paid { order_id: id })).unwrap();
        assert_eq!(json["kind"], "order");
        assert_eq!(json["event"], "paid");
        assert_eq!(json["order_id"], id.to_string());
    }
}
