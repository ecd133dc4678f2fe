//! Entry and exit gateways - the two booth workflows
//!
//! Entry: reserve a spot, then issue a ticket. If issuance fails the spot is
//! released before the error is returned, so a failed entry never strands a
//! reserved spot without a ticket.
//!
//! Exit: close the ticket (fixing the charge), then release the spot. The
//! ticket is closed before the spot becomes free, so no observer sees a free
//! spot still referenced by an open ticket. A failed close releases nothing.

use crate::domain::error::LotResult;
use crate::domain::ticket::Ticket;
use crate::domain::types::{Demand, PanelId, SizeClass, TicketId};
use crate::infra::metrics::Metrics;
use crate::services::clock::Clock;
use crate::services::ledger::TicketLedger;
use crate::services::strategy::AllocationStrategy;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Why an entry was turned away. Not an error: a full lot is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoCapacity(SizeClass),
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoCapacity(_) => "no_capacity",
        }
    }
}

/// Result of a successful entry request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    Issued(Ticket),
    Rejected(RejectReason),
}

impl EntryDecision {
    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            EntryDecision::Issued(ticket) => Some(ticket),
            EntryDecision::Rejected(_) => None,
        }
    }

    pub fn into_ticket(self) -> Option<Ticket> {
        match self {
            EntryDecision::Issued(ticket) => Some(ticket),
            EntryDecision::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, EntryDecision::Rejected(_))
    }
}

/// Collaborators shared by every panel of a facility
#[derive(Clone)]
pub struct GatewayContext {
    pub strategy: Arc<dyn AllocationStrategy>,
    pub ledger: Arc<TicketLedger>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

pub struct EntryGateway {
    id: PanelId,
    ctx: GatewayContext,
}

impl EntryGateway {
    pub fn new(id: PanelId, ctx: GatewayContext) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    /// Allocate a spot and issue a ticket for `demand`
    pub fn request_entry(&self, demand: &Demand) -> LotResult<EntryDecision> {
        let size = demand.size_class();

        let start = Instant::now();
        let reserved = self.ctx.strategy.reserve(size);
        self.ctx.metrics.record_reserve_latency(start.elapsed().as_micros() as u64);

        let Some(spot) = reserved else {
            self.ctx.metrics.record_rejection(size);
            debug!(
                panel = %self.id,
                demand = %demand.id,
                vehicle = %demand.vehicle_type,
                size = %size,
                "entry_rejected_no_capacity"
            );
            return Ok(EntryDecision::Rejected(RejectReason::NoCapacity(size)));
        };

        match self.ctx.ledger.issue(demand, &spot, self.ctx.clock.now()) {
            Ok(ticket) => {
                self.ctx.metrics.record_entry(size);
                info!(
                    panel = %self.id,
                    ticket_id = %ticket.id,
                    demand = %demand.id,
                    spot = %spot.key,
                    "entry_granted"
                );
                Ok(EntryDecision::Issued(ticket))
            }
            Err(e) => {
                // Compensate: the reserved spot goes back before the error surfaces
                if let Err(release_err) = self.ctx.strategy.release(spot.key) {
                    error!(
                        panel = %self.id,
                        spot = %spot.key,
                        error = %release_err,
                        "entry_compensation_failed"
                    );
                }
                self.ctx.metrics.record_compensation();
                self.ctx.metrics.record_error();
                warn!(
                    panel = %self.id,
                    demand = %demand.id,
                    spot = %spot.key,
                    error = %e,
                    kind = e.kind(),
                    "entry_failed_spot_released"
                );
                Err(e)
            }
        }
    }
}

pub struct ExitGateway {
    id: PanelId,
    ctx: GatewayContext,
}

impl ExitGateway {
    pub fn new(id: PanelId, ctx: GatewayContext) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    /// Close a ticket and free its spot. The returned ticket carries the charge.
    pub fn request_exit(&self, ticket_id: TicketId) -> LotResult<Ticket> {
        let closed = match self.ctx.ledger.close(ticket_id, self.ctx.clock.now()) {
            Ok(ticket) => ticket,
            Err(e) => {
                self.ctx.metrics.record_error();
                warn!(panel = %self.id, ticket_id = %ticket_id, error = %e, kind = e.kind(), "exit_refused");
                return Err(e);
            }
        };

        if let Err(e) = self.ctx.strategy.release(closed.spot) {
            // Ticket spots come from the strategy, so this is a broken invariant
            self.ctx.metrics.record_error();
            error!(panel = %self.id, ticket_id = %ticket_id, spot = %closed.spot, error = %e, "exit_release_failed");
            return Err(e);
        }

        let charge = closed.charge.unwrap_or_default();
        self.ctx.metrics.record_exit(charge);
        info!(
            panel = %self.id,
            ticket_id = %ticket_id,
            spot = %closed.spot,
            charge = %charge,
            "exit_completed"
        );
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::LotError;
    use crate::domain::spot::SpotSpec;
    use crate::domain::types::{SpotKey, VehicleType};
    use crate::services::clock::ManualClock;
    use crate::services::strategy::NormalStrategy;
    use chrono::{Duration, TimeZone, Utc};

    struct Booths {
        entry: EntryGateway,
        exit: ExitGateway,
        clock: Arc<ManualClock>,
        ctx: GatewayContext,
    }

    fn booths(specs: &[SpotSpec]) -> Booths {
        let strategy = Arc::new(NormalStrategy::new());
        for spec in specs {
            strategy.add_spot(*spec).unwrap();
        }
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()));
        let ctx = GatewayContext {
            strategy,
            ledger: Arc::new(TicketLedger::new()),
            clock: clock.clone(),
            metrics: Arc::new(Metrics::new()),
        };
        Booths {
            entry: EntryGateway::new(PanelId(1), ctx.clone()),
            exit: ExitGateway::new(PanelId(1), ctx.clone()),
            clock,
            ctx,
        }
    }

    #[test]
    fn test_entry_issues_ticket_on_matching_size() {
        let b = booths(&[SpotSpec::new(1, 1, SizeClass::Large), SpotSpec::new(1, 2, SizeClass::Medium)]);

        let ticket = b.entry.request_entry(&Demand::new("CAR-1", VehicleType::Car)).unwrap().into_ticket().unwrap();

        assert_eq!(ticket.spot, SpotKey::new(1, 2));
        assert_eq!(ticket.size, SizeClass::Medium);
        assert!(!b.ctx.strategy.is_available(SizeClass::Medium));
        assert!(b.ctx.strategy.is_available(SizeClass::Large));
    }

    #[test]
    fn test_entry_rejected_without_capacity() {
        let b = booths(&[SpotSpec::new(1, 1, SizeClass::Medium)]);

        let decision = b.entry.request_entry(&Demand::new("VAN-1", VehicleType::Van)).unwrap();

        assert_eq!(decision, EntryDecision::Rejected(RejectReason::NoCapacity(SizeClass::XLarge)));
        assert_eq!(b.ctx.ledger.len(), 0);
        assert_eq!(b.ctx.metrics.rejections_total(), 1);
    }

    #[test]
    fn test_failed_issue_releases_spot() {
        let b = booths(&[SpotSpec::new(1, 1, SizeClass::Medium), SpotSpec::new(1, 2, SizeClass::Medium)]);
        let demand = Demand::new("KA05MR2311", VehicleType::Car);

        let first = b.entry.request_entry(&demand).unwrap().into_ticket().unwrap();
        let err = b.entry.request_entry(&demand).unwrap_err();

        assert_eq!(err, LotError::DemandAlreadyParked { demand: demand.id.clone(), ticket: first.id });
        // The second spot was reserved then handed back
        let snap = b.ctx.strategy.snapshot();
        assert_eq!(snap.available(SizeClass::Medium), 1);
        assert!(b.ctx.strategy.spot(SpotKey::new(1, 2)).unwrap().available);
        assert_eq!(b.ctx.metrics.compensations_total(), 1);
    }

    #[test]
    fn test_exit_bills_and_frees_spot() {
        let b = booths(&[SpotSpec::new(1, 1, SizeClass::Small)]);
        let ticket = b
            .entry
            .request_entry(&Demand::new("BIKE-1", VehicleType::MotorBike))
            .unwrap()
            .into_ticket()
            .unwrap();

        b.clock.advance(Duration::minutes(90));
        let closed = b.exit.request_exit(ticket.id).unwrap();

        assert_eq!(closed.charge, Some(20));
        assert!(b.ctx.strategy.is_available(SizeClass::Small));
        assert_eq!(b.ctx.metrics.revenue_total(), 20);
    }

    #[test]
    fn test_exit_twice_fails_without_second_release() {
        let b = booths(&[SpotSpec::new(1, 1, SizeClass::Small)]);
        let first = b
            .entry
            .request_entry(&Demand::new("BIKE-1", VehicleType::MotorBike))
            .unwrap()
            .into_ticket()
            .unwrap();
        b.exit.request_exit(first.id).unwrap();

        // Someone else parks on the freed spot
        let second = b
            .entry
            .request_entry(&Demand::new("BIKE-2", VehicleType::MotorBike))
            .unwrap()
            .into_ticket()
            .unwrap();
        assert_eq!(second.spot, first.spot);

        // Rescanning the first ticket must not free the occupied spot
        assert_eq!(b.exit.request_exit(first.id), Err(LotError::AlreadyClosed(first.id)));
        assert!(!b.ctx.strategy.is_available(SizeClass::Small));
    }

    #[test]
    fn test_exit_unknown_ticket() {
        let b = booths(&[SpotSpec::new(1, 1, SizeClass::Small)]);
        assert_eq!(b.exit.request_exit(TicketId(99)), Err(LotError::UnknownTicket(TicketId(99))));
        assert_eq!(b.ctx.metrics.errors_total(), 1);
    }
}
