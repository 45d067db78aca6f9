//! Domain events
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Discount(DiscountEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Option<Uuid>, guest_id: Option<String>, total_amount: Decimal, discount_code: Option<String>, items: usize },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Deleted { order_id: Uuid, restocked_lines: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountEvent {
    Issued { email: String, code: String },
}

impl DomainEvent {
    pub const SUBJECT_PREFIX: &'static str = "bzcart";

    /// Message bus subject, e.g. `bzcart.order.placed`.
    pub fn subject(&self) -> String {
        let suffix = match self {
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Order(OrderEvent::Deleted { .. }) => "order.deleted",
            Self::Discount(DiscountEvent::Issued { .. }) => "discount.issued",
        };
        format!("{}.{}", Self::SUBJECT_PREFIX, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_and_payload() {
        let event = DomainEvent::Order(OrderEvent::StatusChanged { order_id: Uuid::nil(), from: OrderStatus::Pending, to: OrderStatus::Shipped });
        assert_eq!(event.subject(), "bzcart.order.status_changed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "shipped");
        let issued = DomainEvent::Discount(DiscountEvent::Issued { email: "a@x.com".into(), code: "ABCD1234".into() });
        assert_eq!(issued.subject(), "bzcart.discount.issued");
    }
}
