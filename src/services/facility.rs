//! Facility - composition root for one parking site
//!
//! Owns the single allocation strategy and ticket ledger and hands the same
//! instances to every registered panel. No allocation logic lives here.

use crate::domain::error::{LotError, LotResult};
use crate::domain::spot::SpotSpec;
use crate::domain::ticket::Ticket;
use crate::domain::types::{PanelId, TicketId, VehicleType};
use crate::infra::config::Config;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::clock::Clock;
use crate::services::gateway::{EntryGateway, ExitGateway, GatewayContext};
use crate::services::inventory::OccupancySnapshot;
use crate::services::ledger::TicketLedger;
use crate::services::strategy::AllocationStrategy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

pub struct Facility {
    site_id: String,
    address: Option<String>,
    ctx: GatewayContext,
    entry_gateways: RwLock<Vec<Arc<EntryGateway>>>,
    exit_gateways: RwLock<Vec<Arc<ExitGateway>>>,
}

impl Facility {
    pub fn new(site_id: &str, strategy: Arc<dyn AllocationStrategy>, clock: Arc<dyn Clock>) -> Self {
        let ctx = GatewayContext {
            strategy,
            ledger: Arc::new(TicketLedger::new()),
            clock,
            metrics: Arc::new(Metrics::new()),
        };
        Self {
            site_id: site_id.to_string(),
            address: None,
            ctx,
            entry_gateways: RwLock::new(Vec::new()),
            exit_gateways: RwLock::new(Vec::new()),
        }
    }

    /// Build the configured strategy, register every spot and panel
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> LotResult<Self> {
        let mut facility = Self::new(config.site_id(), config.strategy().build(), clock);
        facility.address = config.site_address().map(str::to_string);

        for spec in config.spots() {
            facility.add_spot(*spec)?;
        }
        for &id in config.entry_panels() {
            facility.add_entry_gateway(PanelId(id))?;
        }
        for &id in config.exit_panels() {
            facility.add_exit_gateway(PanelId(id))?;
        }

        let occupancy = facility.occupancy();
        info!(
            site = %facility.site_id,
            address = %facility.address.as_deref().unwrap_or("-"),
            strategy = facility.ctx.strategy.name(),
            spots = %occupancy.total_capacity(),
            entry_panels = %config.entry_panels().len(),
            exit_panels = %config.exit_panels().len(),
            "facility_ready"
        );
        Ok(facility)
    }

    pub fn add_spot(&self, spec: SpotSpec) -> LotResult<()> {
        self.ctx.strategy.add_spot(spec)
    }

    pub fn add_entry_gateway(&self, id: PanelId) -> LotResult<Arc<EntryGateway>> {
        let mut panels = self.entry_gateways.write();
        if panels.iter().any(|p| p.id() == id) {
            return Err(LotError::DuplicatePanel(id));
        }
        let gateway = Arc::new(EntryGateway::new(id, self.ctx.clone()));
        panels.push(gateway.clone());
        info!(panel = %id, "entry_panel_registered");
        Ok(gateway)
    }

    pub fn add_exit_gateway(&self, id: PanelId) -> LotResult<Arc<ExitGateway>> {
        let mut panels = self.exit_gateways.write();
        if panels.iter().any(|p| p.id() == id) {
            return Err(LotError::DuplicatePanel(id));
        }
        let gateway = Arc::new(ExitGateway::new(id, self.ctx.clone()));
        panels.push(gateway.clone());
        info!(panel = %id, "exit_panel_registered");
        Ok(gateway)
    }

    pub fn entry_gateway(&self, id: PanelId) -> Option<Arc<EntryGateway>> {
        self.entry_gateways.read().iter().find(|p| p.id() == id).cloned()
    }

    pub fn exit_gateway(&self, id: PanelId) -> Option<Arc<ExitGateway>> {
        self.exit_gateways.read().iter().find(|p| p.id() == id).cloned()
    }

    pub fn entry_gateways(&self) -> Vec<Arc<EntryGateway>> {
        self.entry_gateways.read().clone()
    }

    pub fn exit_gateways(&self) -> Vec<Arc<ExitGateway>> {
        self.exit_gateways.read().clone()
    }

    /// Whether a vehicle of this type could be admitted right now.
    /// Advisory only: another panel may take the spot before entry.
    pub fn can_accept(&self, vehicle_type: VehicleType) -> bool {
        self.ctx.strategy.is_available(vehicle_type.size_class())
    }

    pub fn occupancy(&self) -> OccupancySnapshot {
        self.ctx.strategy.snapshot()
    }

    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.ctx.ledger.get(id)
    }

    pub fn report(&self) -> MetricsSummary {
        self.ctx.metrics.report(self.occupancy(), self.ctx.ledger.open_count())
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn strategy(&self) -> &Arc<dyn AllocationStrategy> {
        &self.ctx.strategy
    }

    pub fn ledger(&self) -> &Arc<TicketLedger> {
        &self.ctx.ledger
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }
}
