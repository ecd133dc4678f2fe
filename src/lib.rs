//! Lot gateway library
//!
//! Parking allocation engine: spot inventory, pluggable allocation strategy,
//! ticket ledger and the entry/exit booth workflows that drive them.
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
