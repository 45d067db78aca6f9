//! Best-effort domain event publishing over NATS.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    /// Failures are logged and otherwise ignored.
    pub async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.nats else { return };
        let subject = event.subject();
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, subject = %subject, "Failed to encode domain event");
                return;
            }
        };
        match client.publish(subject.clone(), payload.into()).await {
            Ok(()) => tracing::debug!(subject = %subject, "Published domain event"),
            Err(e) => tracing::warn!(error = %e, subject = %subject, "Failed to publish domain event"),
        }
    }
}
