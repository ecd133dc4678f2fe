//! Ticket egress - writes closed tickets to file
//!
//! Closed tickets are written in JSONL format (one JSON object per line) to
//! the file specified in config. This is the hand-off to the payment
//! processor and reporting; nothing here executes payment.
//!
//! Exit booths enqueue tickets on a bounded channel so file I/O stays off the
//! booth path; a single worker drains the channel on a blocking thread and
//! appends through one file handle held open for its lifetime.

use crate::domain::ticket::Ticket;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Egress writer for closed tickets
pub struct TicketEgress {
    file_path: String,
    site_id: String,
    /// Opened on first write, dropped after a failed write so the next one reopens
    file: Option<File>,
}

impl TicketEgress {
    pub fn new(file_path: &str, site_id: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string(), site_id: site_id.to_string(), file: None }
    }

    /// Write a ticket to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_ticket(&mut self, ticket: &Ticket) -> bool {
        let json = ticket.to_json_with_site(&self.site_id);

        match self.append_line(&json) {
            Ok(()) => {
                debug!(
                    ticket_id = %ticket.id,
                    charge = %ticket.charge.unwrap_or_default(),
                    "ticket_egressed"
                );
                true
            }
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "ticket_egress_failed");
                false
            }
        }
    }

    fn open(&self) -> std::io::Result<File> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Append a line to the egress file
    fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => self.file.insert(self.open()?),
        };
        let result = writeln!(file, "{}", line);
        if result.is_err() {
            self.file = None;
        }
        result
    }

    /// Write multiple tickets, returning how many succeeded
    pub fn write_tickets(&mut self, tickets: &[Ticket]) -> usize {
        tickets.iter().filter(|t| self.write_ticket(t)).count()
    }
}

/// Worker that drains closed tickets into the egress file
pub struct EgressWorker {
    egress: TicketEgress,
    rx: mpsc::Receiver<Ticket>,
}

impl EgressWorker {
    /// Run until every sender is dropped. Returns the number of tickets written.
    ///
    /// File writes happen on tokio's blocking pool, never on a runtime worker.
    pub async fn run(self) -> usize {
        match tokio::task::spawn_blocking(move || self.drain()).await {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "egress_worker_panicked");
                0
            }
        }
    }

    fn drain(mut self) -> usize {
        info!("egress_worker_started");
        let mut written = 0usize;
        while let Some(ticket) = self.rx.blocking_recv() {
            if self.egress.write_ticket(&ticket) {
                written += 1;
            }
        }
        info!(written = %written, "egress_worker_stopped");
        written
    }
}

/// Create an egress channel and worker
///
/// Returns the sender (for exit booths) and the worker (to be spawned)
pub fn create_egress_worker(
    file_path: &str,
    site_id: &str,
    buffer_size: usize,
) -> (mpsc::Sender<Ticket>, EgressWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let worker = EgressWorker { egress: TicketEgress::new(file_path, site_id), rx };
    (tx, worker)
}
