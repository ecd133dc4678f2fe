//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `egress` - Closed ticket output to file (JSONL format) for payment/reporting
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress;
pub mod prometheus;

// Re-export commonly used types
pub use egress::{create_egress_worker, EgressWorker, TicketEgress};
pub use prometheus::start_metrics_server;
