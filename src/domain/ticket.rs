//! Ticket data model and the charge formula

use crate::domain::types::{Demand, SizeClass, SpotKey, TicketId};
use chrono::{DateTime, Utc};
use serde::Serialize;

const SECS_PER_HOUR: i64 = 3600;

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Closed => "closed",
        }
    }
}

/// Billable hours for a stay: partial hours round up, minimum one hour.
/// Negative durations (clock skew between panels) bill the minimum.
pub fn billable_hours(issued_at: DateTime<Utc>, closed_at: DateTime<Utc>) -> u64 {
    let secs = (closed_at - issued_at).num_seconds().max(0);
    let hours = (secs + SECS_PER_HOUR - 1) / SECS_PER_HOUR;
    hours.max(1) as u64
}

/// Charge for a stay on a spot of the given size class
pub fn compute_charge(size: SizeClass, issued_at: DateTime<Utc>, closed_at: DateTime<Utc>) -> u64 {
    billable_hours(issued_at, closed_at) * size.hourly_rate()
}

/// Binds a demand to an allocated spot for a time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: TicketId,
    pub spot: SpotKey,
    pub size: SizeClass,
    pub demand: Demand,
    pub issued_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub charge: Option<u64>,
    pub status: TicketStatus,
}

impl Ticket {
    pub(crate) fn open(
        id: TicketId,
        spot: SpotKey,
        size: SizeClass,
        demand: Demand,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            spot,
            size,
            demand,
            issued_at,
            closed_at: None,
            charge: None,
            status: TicketStatus::Open,
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// Close the ticket and fix its charge. Callers check `is_open` first.
    pub(crate) fn close(&mut self, closed_at: DateTime<Utc>) -> u64 {
        let charge = compute_charge(self.size, self.issued_at, closed_at);
        self.closed_at = Some(closed_at);
        self.charge = Some(charge);
        self.status = TicketStatus::Closed;
        charge
    }

    /// Stay duration in whole seconds, `None` while open
    pub fn duration_secs(&self) -> Option<i64> {
        self.closed_at.map(|closed| (closed - self.issued_at).num_seconds())
    }

    /// Convert to a JSON line for egress
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Convert to a JSON line with the site included
    pub fn to_json_with_site(&self, site_id: &str) -> String {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut obj)) => {
                obj.insert("site".to_string(), serde_json::Value::String(site_id.to_string()));
                serde_json::Value::Object(obj).to_string()
            }
            _ => self.to_json(),
        }
    }
}
