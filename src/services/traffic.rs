//! Traffic generator - synthetic arrivals and departures for the simulator
//!
//! Each entry panel runs `run_entry_panel`, drawing exponential inter-arrival
//! gaps and a vehicle mix from `rand`. Issued tickets are handed to an exit
//! panel as a `Departure` due after the (time-scaled) stay. Each exit panel
//! keeps its pending departures in a min-heap and closes them when due.

use crate::domain::ticket::Ticket;
use crate::domain::types::{Demand, TicketId, VehicleType};
use crate::services::gateway::{EntryDecision, EntryGateway, ExitGateway};
use rand::Rng;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Vehicle mix in percent: motorbike, car, truck, van, bus
const VEHICLE_MIX: [(VehicleType, u32); 5] = [
    (VehicleType::MotorBike, 20),
    (VehicleType::Car, 55),
    (VehicleType::Truck, 10),
    (VehicleType::Van, 10),
    (VehicleType::Bus, 5),
];

/// Arrival and stay parameters shared by all panels
#[derive(Debug, Clone, Copy)]
pub struct TrafficProfile {
    /// Mean arrivals per real second, per entry panel
    pub arrivals_per_sec: f64,
    /// Mean stay in simulated seconds
    pub mean_stay_secs: u64,
    /// Simulated seconds per real second
    pub time_scale: f64,
}

impl TrafficProfile {
    /// Real-time gap before the next arrival
    pub fn next_arrival_gap<R: Rng>(&self, rng: &mut R) -> Duration {
        let mean = 1.0 / self.arrivals_per_sec.max(0.01);
        Duration::from_secs_f64(sample_exponential(rng, mean))
    }

    /// Real-time stay for one vehicle
    pub fn next_stay<R: Rng>(&self, rng: &mut R) -> Duration {
        let simulated = sample_exponential(rng, self.mean_stay_secs as f64);
        Duration::from_secs_f64(simulated / self.time_scale.max(1e-3))
    }
}

/// Exponentially distributed sample with the given mean
pub fn sample_exponential<R: Rng>(rng: &mut R, mean: f64) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }
    let u: f64 = rng.gen();
    -mean * (1.0 - u).ln()
}

/// Draw a vehicle from the configured mix with a fresh plate
pub fn random_demand<R: Rng>(rng: &mut R) -> Demand {
    let total: u32 = VEHICLE_MIX.iter().map(|(_, w)| w).sum();
    let mut roll = rng.gen_range(0..total);
    let mut vehicle_type = VehicleType::Car;
    for (candidate, weight) in VEHICLE_MIX {
        if roll < weight {
            vehicle_type = candidate;
            break;
        }
        roll -= weight;
    }
    Demand::new(Uuid::now_v7().simple().to_string(), vehicle_type)
}

/// A ticket scheduled to leave through an exit panel
#[derive(Debug, Clone, Copy)]
pub struct Departure {
    pub ticket_id: TicketId,
    pub due: Instant,
}

/// Generate arrivals at one entry panel until shutdown
///
/// Returns the number of tickets issued.
pub async fn run_entry_panel<R: Rng + Send>(
    entry: Arc<EntryGateway>,
    exits: Vec<mpsc::Sender<Departure>>,
    profile: TrafficProfile,
    mut rng: R,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    info!(panel = %entry.id(), exits = %exits.len(), "entry_panel_started");
    let mut issued = 0u64;

    loop {
        let gap = profile.next_arrival_gap(&mut rng);
        tokio::select! {
            _ = tokio::time::sleep(gap) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let demand = random_demand(&mut rng);
        let ticket = match entry.request_entry(&demand) {
            Ok(EntryDecision::Issued(ticket)) => ticket,
            Ok(EntryDecision::Rejected(_)) => continue,
            Err(_) => continue,
        };
        issued += 1;

        if exits.is_empty() {
            continue;
        }
        let departure = Departure {
            ticket_id: ticket.id,
            due: Instant::now() + profile.next_stay(&mut rng),
        };
        let exit = &exits[rng.gen_range(0..exits.len())];
        if exit.send(departure).await.is_err() {
            warn!(panel = %entry.id(), ticket_id = %ticket.id, "departure_channel_closed");
            break;
        }
    }

    info!(panel = %entry.id(), issued = %issued, "entry_panel_stopped");
    issued
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending::<()>().await,
    }
}

/// Close departing tickets at one exit panel until shutdown or until every
/// entry panel has hung up and nothing is pending.
///
/// Closed tickets are forwarded to `egress`. Returns the number of exits.
pub async fn run_exit_panel(
    exit: Arc<ExitGateway>,
    mut departures: mpsc::Receiver<Departure>,
    egress: mpsc::Sender<Ticket>,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    info!(panel = %exit.id(), "exit_panel_started");
    let mut pending: BinaryHeap<Reverse<(Instant, TicketId)>> = BinaryHeap::new();
    let mut closed = 0u64;
    let mut inbound_open = true;

    loop {
        if !inbound_open && pending.is_empty() {
            break;
        }
        let next_due = pending.peek().map(|Reverse((due, _))| *due);

        tokio::select! {
            departure = departures.recv(), if inbound_open => match departure {
                Some(d) => pending.push(Reverse((d.due, d.ticket_id))),
                None => inbound_open = false,
            },
            _ = sleep_until_due(next_due) => {
                let now = Instant::now();
                while let Some(&Reverse((due, ticket_id))) = pending.peek() {
                    if due > now {
                        break;
                    }
                    pending.pop();
                    if let Ok(ticket) = exit.request_exit(ticket_id) {
                        closed += 1;
                        if egress.send(ticket).await.is_err() {
                            debug!(panel = %exit.id(), ticket_id = %ticket_id, "egress_channel_closed");
                        }
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(panel = %exit.id(), closed = %closed, still_parked = %pending.len(), "exit_panel_stopped");
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::spot::SpotSpec;
    use crate::domain::types::{PanelId, SizeClass};
    use crate::services::clock::SystemClock;
    use crate::services::facility::Facility;
    use crate::services::strategy::StrategyKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_exponential_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let sum: f64 = (0..n).map(|_| sample_exponential(&mut rng, 10.0)).sum();
        let mean = sum / n as f64;
        assert!((mean - 10.0).abs() < 0.5, "mean was {mean}");
    }

    #[test]
    fn test_sample_exponential_zero_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_exponential(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn test_random_demand_mix() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = [0u32; SizeClass::COUNT];
        for _ in 0..2_000 {
            let demand = random_demand(&mut rng);
            assert_eq!(demand.id.as_str().len(), 32);
            seen[demand.size_class().index()] += 1;
        }
        // Every size class shows up, cars dominate
        assert!(seen.iter().all(|&n| n > 0));
        assert!(seen[SizeClass::Medium.index()] > seen[SizeClass::Small.index()]);
    }

    #[test]
    fn test_stay_is_time_scaled() {
        let profile = TrafficProfile { arrivals_per_sec: 1.0, mean_stay_secs: 3600, time_scale: 3600.0 };
        let mut rng = StdRng::seed_from_u64(3);
        let n = 5_000;
        let total: f64 = (0..n).map(|_| profile.next_stay(&mut rng).as_secs_f64()).sum();
        let mean = total / n as f64;
        assert!((mean - 1.0).abs() < 0.1, "mean real stay was {mean}");
    }

    #[tokio::test]
    async fn test_exit_panel_closes_due_departures() {
        let lot = Facility::new("test", StrategyKind::Normal.build(), Arc::new(SystemClock));
        lot.add_spot(SpotSpec::new(1, 1, SizeClass::Medium)).unwrap();
        let entry = lot.add_entry_gateway(PanelId(1)).unwrap();
        let exit = lot.add_exit_gateway(PanelId(2)).unwrap();

        let ticket = entry
            .request_entry(&Demand::new("CAR-1", VehicleType::Car))
            .unwrap()
            .into_ticket()
            .unwrap();

        let (dep_tx, dep_rx) = mpsc::channel(4);
        let (egress_tx, mut egress_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_exit_panel(exit, dep_rx, egress_tx, shutdown_rx));
        dep_tx
            .send(Departure { ticket_id: ticket.id, due: Instant::now() + Duration::from_millis(20) })
            .await
            .unwrap();
        drop(dep_tx);

        let closed = egress_rx.recv().await.unwrap();
        assert_eq!(closed.id, ticket.id);
        assert_eq!(closed.charge, Some(20));
        assert_eq!(handle.await.unwrap(), 1);
        assert!(lot.can_accept(VehicleType::Car));
    }

    #[tokio::test]
    async fn test_entry_panel_stops_on_shutdown() {
        let lot = Facility::new("test", StrategyKind::Normal.build(), Arc::new(SystemClock));
        lot.add_spot(SpotSpec::new(1, 1, SizeClass::Medium)).unwrap();
        let entry = lot.add_entry_gateway(PanelId(1)).unwrap();

        let profile = TrafficProfile { arrivals_per_sec: 200.0, mean_stay_secs: 60, time_scale: 1.0 };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_entry_panel(
            entry,
            Vec::new(),
            profile,
            StdRng::seed_from_u64(9),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        // One spot and no exits: at most one ticket can ever be issued
        assert!(handle.await.unwrap() <= 1);
        assert_eq!(lot.ledger().len() as u64, lot.metrics().entries_total());
    }
}
