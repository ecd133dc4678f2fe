//! Domain models - core types for spots, demands and tickets
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - identifiers, `SizeClass`, `VehicleType`, `Demand`
//! - `spot` - `Spot` and its registration request `SpotSpec`
//! - `ticket` - `Ticket` lifecycle and the charge formula
//! - `error` - `LotError` taxonomy

pub mod error;
pub mod spot;
pub mod ticket;
pub mod types;

pub use error::{LotError, LotResult};
pub use spot::{Spot, SpotSpec};
pub use ticket::{Ticket, TicketStatus};
pub use types::{Demand, DemandId, PanelId, SizeClass, SpotId, SpotKey, TicketId, UnitId, VehicleType};
