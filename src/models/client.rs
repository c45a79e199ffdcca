//! Client model: the customer organization and its routing email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::ServiceCategory;

/// A customer organization/contact record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Surrogate identifier.
    pub id: i64,
    /// Organization display name.
    pub organization_name: String,
    /// Contact first name.
    pub first_name: String,
    /// Contact last name.
    pub last_name: String,
    /// Unique business key used for inbound-email routing.
    pub email: String,
    /// Optional phone number.
    pub phone: Option<String>,
    /// Subscribed service categories, in insertion order without repeats.
    pub services: Vec<ServiceCategory>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    /// Organization display name.
    pub organization_name: String,
    /// Contact first name.
    pub first_name: String,
    /// Contact last name.
    pub last_name: String,
    /// Routing email.
    pub email: String,
    /// Optional phone number.
    pub phone: Option<String>,
    /// Subscribed service categories.
    pub services: Vec<ServiceCategory>,
}

/// Partial client update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPatch {
    /// New organization name.
    pub organization_name: Option<String>,
    /// New first name.
    pub first_name: Option<String>,
    /// New last name.
    pub last_name: Option<String>,
    /// New routing email.
    pub email: Option<String>,
    /// New phone; `Some(None)` clears it.
    pub phone: Option<Option<String>>,
    /// Replacement service list.
    pub services: Option<Vec<ServiceCategory>>,
}

/// Drop repeated categories while keeping first-seen order.
#[must_use]
pub fn ordered_services(services: &[ServiceCategory]) -> Vec<ServiceCategory> {
    let mut out: Vec<ServiceCategory> = Vec::with_capacity(services.len());
    for service in services {
        if !out.contains(service) {
            out.push(*service);
        }
    }
    out
}
