//! Ticket ledger - append-only record of every allocation
//!
//! Ticket IDs come from one atomic counter starting at 1, independent of the
//! issue timestamp, so concurrent issuance never collides. Tickets are never
//! removed; closing is the only mutation and the only place a charge is
//! computed.

use crate::domain::error::{LotError, LotResult};
use crate::domain::spot::Spot;
use crate::domain::ticket::Ticket;
use crate::domain::types::{Demand, DemandId, TicketId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct LedgerState {
    tickets: FxHashMap<TicketId, Ticket>,
    /// Open ticket per demand, so the same vehicle cannot hold two spots
    open_by_demand: FxHashMap<DemandId, TicketId>,
    revenue: u64,
}

#[derive(Debug)]
pub struct TicketLedger {
    next_id: AtomicU64,
    state: RwLock<LedgerState>,
}

impl TicketLedger {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), state: RwLock::new(LedgerState::default()) }
    }

    /// Issue an open ticket binding `demand` to `spot`.
    ///
    /// Fails with `DemandAlreadyParked` if the demand still holds an open ticket.
    pub fn issue(&self, demand: &Demand, spot: &Spot, issued_at: DateTime<Utc>) -> LotResult<Ticket> {
        let mut state = self.state.write();

        if let Some(&ticket) = state.open_by_demand.get(&demand.id) {
            return Err(LotError::DemandAlreadyParked { demand: demand.id.clone(), ticket });
        }

        let id = TicketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let ticket = Ticket::open(id, spot.key, spot.size, demand.clone(), issued_at);

        state.open_by_demand.insert(demand.id.clone(), id);
        state.tickets.insert(id, ticket.clone());

        info!(
            ticket_id = %id,
            demand = %demand.id,
            vehicle = %demand.vehicle_type,
            spot = %spot.key,
            size = %spot.size,
            "ticket_issued"
        );
        Ok(ticket)
    }

    /// Close an open ticket, fixing its charge. Returns the closed ticket.
    pub fn close(&self, id: TicketId, closed_at: DateTime<Utc>) -> LotResult<Ticket> {
        let mut state = self.state.write();

        let ticket = state.tickets.get_mut(&id).ok_or(LotError::UnknownTicket(id))?;
        if !ticket.is_open() {
            warn!(ticket_id = %id, "ticket_already_closed");
            return Err(LotError::AlreadyClosed(id));
        }

        let charge = ticket.close(closed_at);
        let closed = ticket.clone();

        state.open_by_demand.remove(&closed.demand.id);
        state.revenue += charge;

        info!(
            ticket_id = %id,
            spot = %closed.spot,
            charge = %charge,
            duration_secs = %closed.duration_secs().unwrap_or_default(),
            "ticket_closed"
        );
        Ok(closed)
    }

    pub fn get(&self, id: TicketId) -> Option<Ticket> {
        self.state.read().tickets.get(&id).cloned()
    }

    pub fn open_count(&self) -> usize {
        self.state.read().open_by_demand.len()
    }

    pub fn len(&self) -> usize {
        self.state.read().tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of charges over all closed tickets
    pub fn closed_revenue(&self) -> u64 {
        self.state.read().revenue
    }

    /// All open tickets, ordered by ID
    pub fn open_tickets(&self) -> Vec<Ticket> {
        let state = self.state.read();
        let mut open: Vec<Ticket> = state.tickets.values().filter(|t| t.is_open()).cloned().collect();
        open.sort_by_key(|t| t.id);
        open
    }
}

impl Default for TicketLedger {
    fn default() -> Self {
        Self::new()
    }
}
