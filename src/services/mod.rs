//! Services - allocation engine and booth workflows
//!
//! This module contains the core business logic services:
//! - `inventory` - Spot arena and per-size availability
//! - `strategy` - Pluggable allocation policies (normal, proximity)
//! - `ledger` - Append-only ticket ledger and charge computation
//! - `gateway` - Entry and exit booth workflows
//! - `facility` - Composition root owning the shared strategy and ledger
//! - `clock` - Injectable time sources
//! - `traffic` - Synthetic arrivals and departures driving the simulator

pub mod clock;
pub mod facility;
pub mod gateway;
pub mod inventory;
pub mod ledger;
pub mod strategy;
pub mod traffic;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, ScaledClock, SystemClock};
pub use facility::Facility;
pub use gateway::{EntryDecision, EntryGateway, ExitGateway, GatewayContext, RejectReason};
pub use inventory::{OccupancySnapshot, SpotInventory};
pub use ledger::TicketLedger;
pub use strategy::{AllocationStrategy, NormalStrategy, ProximityStrategy, StrategyKind};
pub use traffic::{run_entry_panel, run_exit_panel, Departure, TrafficProfile};
