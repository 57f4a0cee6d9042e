use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub sms_consent: Option<bool>,
    pub email_consent: Option<bool>,
    pub loyalty_points: i32,
    pub vip: bool,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub vaccination_expires_at: Option<NaiveDate>,
    pub boarding_count: i32,
    pub special_needs: bool,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub pet_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub assigned_staff_id: Option<Uuid>,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: String,
    pub kennel_number: Option<i32>,
    pub total_amount: Option<Decimal>,
    pub reminder_count: i32,
    pub confirmed: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub invoice_number: String,
    pub total_amount: Decimal,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: Option<String>,
    pub status: String,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardingTask {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub record_type: Option<String>,
    pub record_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: String,
    pub created_by_system: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_dynamic: bool,
    pub member_count: i32,
    pub created_at: DateTime<Utc>,
}

/// The kind of business record a workflow operates on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Pet,
    Booking,
    Owner,
    Staff,
    Invoice,
    Payment,
    Task,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pet => "pet",
            Self::Booking => "booking",
            Self::Owner => "owner",
            Self::Staff => "staff",
            Self::Invoice => "invoice",
            Self::Payment => "payment",
            Self::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pet" => Some(Self::Pet),
            "booking" => Some(Self::Booking),
            "owner" => Some(Self::Owner),
            "staff" => Some(Self::Staff),
            "invoice" => Some(Self::Invoice),
            "payment" => Some(Self::Payment),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed catalog of domain events the CRUD services emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    #[serde(rename = "booking.created")]
    BookingCreated,
    #[serde(rename = "booking.updated")]
    BookingUpdated,
    #[serde(rename = "booking.checked_in")]
    BookingCheckedIn,
    #[serde(rename = "booking.checked_out")]
    BookingCheckedOut,
    #[serde(rename = "booking.cancelled")]
    BookingCancelled,
    #[serde(rename = "pet.created")]
    PetCreated,
    #[serde(rename = "pet.updated")]
    PetUpdated,
    #[serde(rename = "pet.vaccination_expiring")]
    PetVaccinationExpiring,
    #[serde(rename = "owner.created")]
    OwnerCreated,
    #[serde(rename = "owner.updated")]
    OwnerUpdated,
    #[serde(rename = "payment.received")]
    PaymentReceived,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.overdue")]
    InvoiceOverdue,
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "workflow.enroll_action")]
    WorkflowEnrollAction,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingCreated => "booking.created",
            Self::BookingUpdated => "booking.updated",
            Self::BookingCheckedIn => "booking.checked_in",
            Self::BookingCheckedOut => "booking.checked_out",
            Self::BookingCancelled => "booking.cancelled",
            Self::PetCreated => "pet.created",
            Self::PetUpdated => "pet.updated",
            Self::PetVaccinationExpiring => "pet.vaccination_expiring",
            Self::OwnerCreated => "owner.created",
            Self::OwnerUpdated => "owner.updated",
            Self::PaymentReceived => "payment.received",
            Self::PaymentFailed => "payment.failed",
            Self::InvoiceCreated => "invoice.created",
            Self::InvoiceOverdue => "invoice.overdue",
            Self::TaskCreated => "task.created",
            Self::TaskCompleted => "task.completed",
            Self::WorkflowEnrollAction => "workflow.enroll_action",
        }
    }

    /// The record kind this event is about.
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Self::BookingCreated
            | Self::BookingUpdated
            | Self::BookingCheckedIn
            | Self::BookingCheckedOut
            | Self::BookingCancelled => RecordKind::Booking,
            Self::PetCreated | Self::PetUpdated | Self::PetVaccinationExpiring => RecordKind::Pet,
            Self::OwnerCreated | Self::OwnerUpdated => RecordKind::Owner,
            Self::PaymentReceived | Self::PaymentFailed => RecordKind::Payment,
            Self::InvoiceCreated | Self::InvoiceOverdue => RecordKind::Invoice,
            Self::TaskCreated | Self::TaskCompleted => RecordKind::Task,
            Self::WorkflowEnrollAction => RecordKind::Task,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of a domain event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    System,
    User(Uuid),
    Api,
    Scheduler,
    Integration(String),
}

/// Inbound event envelope emitted by the CRUD services onto the durable
/// queue. Field names are part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_type: EventType,
    pub record_id: Uuid,
    pub record_type: RecordKind,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub event_data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
}

impl DomainEvent {
    pub fn new(
        event_type: EventType,
        record_id: Uuid,
        record_type: RecordKind,
        tenant_id: Uuid,
        event_data: serde_json::Value,
        source: EventSource,
    ) -> Self {
        Self {
            event_type,
            record_id,
            record_type,
            tenant_id,
            event_data,
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn booking_created(tenant_id: Uuid, booking_id: Uuid, pet_id: Option<Uuid>) -> Self {
        Self::new(
            EventType::BookingCreated,
            booking_id,
            RecordKind::Booking,
            tenant_id,
            serde_json::json!({ "pet_id": pet_id }),
            EventSource::Api,
        )
    }

    pub fn vaccination_expiring(tenant_id: Uuid, pet_id: Uuid, days_until_expiry: i32) -> Self {
        Self::new(
            EventType::PetVaccinationExpiring,
            pet_id,
            RecordKind::Pet,
            tenant_id,
            serde_json::json!({ "days_until_expiry": days_until_expiry }),
            EventSource::Scheduler,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&EventType::BookingCreated).unwrap();
        assert_eq!(json, "\"booking.created\"");

        let parsed: EventType = serde_json::from_str("\"pet.vaccination_expiring\"").unwrap();
        assert_eq!(parsed, EventType::PetVaccinationExpiring);
    }

    #[test]
    fn test_domain_event_envelope_is_camel_case() {
        let event = DomainEvent::booking_created(Uuid::new_v4(), Uuid::new_v4(), None);
        let value = serde_json::to_value(&event).unwrap();

        assert!(value.get("eventType").is_some());
        assert!(value.get("recordId").is_some());
        assert!(value.get("tenantId").is_some());
        assert_eq!(value["recordType"], "booking");
    }

    #[test]
    fn test_record_kind_parse_round_trip() {
        for kind in [
            RecordKind::Pet,
            RecordKind::Booking,
            RecordKind::Owner,
            RecordKind::Staff,
            RecordKind::Invoice,
            RecordKind::Payment,
            RecordKind::Task,
        ] {
            assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RecordKind::parse("spaceship"), None);
    }
}
