//! Error taxonomy for allocation, ticketing and facility setup
//!
//! Running out of spots is not in here: `reserve` returns `None` and the entry
//! gateway reports `EntryDecision::Rejected`. Everything below is misuse that
//! propagates to the immediate caller without retry.

use crate::domain::types::{DemandId, PanelId, SpotKey, TicketId};
use thiserror::Error;

pub type LotResult<T> = Result<T, LotError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotError {
    #[error("spot {0} is already registered")]
    DuplicateSpot(SpotKey),
    #[error("spot {0} is not registered")]
    UnknownSpot(SpotKey),
    #[error("ticket {0} does not exist")]
    UnknownTicket(TicketId),
    #[error("ticket {0} is already closed")]
    AlreadyClosed(TicketId),
    #[error("demand {demand} already holds open ticket {ticket}")]
    DemandAlreadyParked { demand: DemandId, ticket: TicketId },
    #[error("panel {0} is already registered")]
    DuplicatePanel(PanelId),
}

impl LotError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LotError::DuplicateSpot(_) => "duplicate_spot",
            LotError::UnknownSpot(_) => "unknown_spot",
            LotError::UnknownTicket(_) => "unknown_ticket",
            LotError::AlreadyClosed(_) => "already_closed",
            LotError::DemandAlreadyParked { .. } => "demand_already_parked",
            LotError::DuplicatePanel(_) => "duplicate_panel",
        }
    }
}
