//! Prometheus metrics HTTP endpoint
//!
//! Serves the facility's `MetricsSummary` in Prometheus text format at
//! `/metrics`, plus a `/health` probe for load balancers. Every sample carries
//! the site label; per-size samples add a `size` label.

use crate::domain::types::SizeClass;
use crate::infra::metrics::{MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::facility::Facility;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Text exposition writer bound to one site label
struct Exposition<'a> {
    out: String,
    site: &'a str,
}

impl<'a> Exposition<'a> {
    fn new(site: &'a str) -> Self {
        Self { out: String::with_capacity(4096), site }
    }

    fn header(&mut self, name: &str, kind: &str, help: &str) {
        let _ = writeln!(self.out, "# HELP {name} {help}");
        let _ = writeln!(self.out, "# TYPE {name} {kind}");
    }

    fn sample(&mut self, name: &str, extra_labels: &str, value: u64) {
        let _ = writeln!(self.out, "{name}{{site=\"{}\"{extra_labels}}} {value}", self.site);
    }

    fn counter(&mut self, name: &str, help: &str, value: u64) {
        self.header(name, "counter", help);
        self.sample(name, "", value);
    }

    fn gauge(&mut self, name: &str, help: &str, value: u64) {
        self.header(name, "gauge", help);
        self.sample(name, "", value);
    }

    fn per_size(&mut self, name: &str, kind: &str, help: &str, value: impl Fn(SizeClass) -> u64) {
        self.header(name, kind, help);
        for size in SizeClass::ALL {
            self.sample(name, &format!(",size=\"{size}\""), value(size));
        }
    }

    /// Cumulative histogram from per-bucket counts
    fn histogram(&mut self, name: &str, help: &str, buckets: &[u64; METRICS_NUM_BUCKETS], sum: u64) {
        self.header(name, "histogram", help);
        let bucket_name = format!("{name}_bucket");
        let mut running = 0u64;
        for (count, bound) in buckets.iter().zip(METRICS_BUCKET_BOUNDS) {
            running += count;
            self.sample(&bucket_name, &format!(",le=\"{bound}\""), running);
        }
        let total: u64 = buckets.iter().sum();
        self.sample(&bucket_name, ",le=\"+Inf\"", total);
        self.sample(&format!("{name}_sum"), "", sum);
        self.sample(&format!("{name}_count"), "", total);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Escape a label value per the text exposition format
fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Render a summary in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, site: &str, address: Option<&str>) -> String {
    let mut exp = Exposition::new(site);

    exp.header("lot_site_info", "gauge", "Static site metadata");
    exp.sample("lot_site_info", &format!(",address=\"{}\"", escape_label(address.unwrap_or(""))), 1);

    exp.counter("lot_entries_total", "Tickets issued", summary.entries_total);
    exp.per_size("lot_entries_by_size_total", "counter", "Tickets issued per size class", |size| {
        summary.entries_by_size[size.index()]
    });
    exp.per_size("lot_rejections_total", "counter", "Entries turned away for lack of capacity", |size| {
        summary.rejections_by_size[size.index()]
    });
    exp.counter("lot_exits_total", "Tickets closed", summary.exits_total);
    exp.counter("lot_revenue_total", "Sum of charges billed at exit", summary.revenue_total);
    exp.counter("lot_errors_total", "Misuse errors returned to panels", summary.errors_total);
    exp.counter("lot_compensations_total", "Spots released after a failed issuance", summary.compensations_total);

    exp.gauge("lot_open_tickets", "Tickets currently open", summary.open_tickets as u64);
    exp.per_size("lot_capacity_spots", "gauge", "Registered spots", |size| summary.occupancy.capacity(size) as u64);
    exp.per_size("lot_available_spots", "gauge", "Free spots", |size| summary.occupancy.available(size) as u64);

    exp.histogram(
        "lot_reserve_latency_us",
        "Reserve latency in microseconds since the previous report",
        &summary.reserve_buckets,
        summary.reserve_sum_us,
    );
    exp.gauge("lot_reserve_latency_p50_us", "Median reserve latency bucket bound", summary.reserve_p50_us);
    exp.gauge("lot_reserve_latency_max_us", "Slowest reserve since the previous report", summary.reserve_max_us);

    exp.finish()
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    facility: Arc<Facility>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&facility.report(), facility.site_id(), facility.address());
            text_response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => text_response(StatusCode::OK, "text/plain", "ok".to_string()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

/// Serve HTTP/1 requests on one accepted connection
async fn serve_connection(stream: TcpStream, facility: Arc<Facility>) {
    let service = service_fn(move |req| handle_request(req, facility.clone()));
    if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
        debug!(error = %e, "prometheus_connection_closed_with_error");
    }
}

/// Start the Prometheus metrics HTTP server; returns once shutdown is signalled
pub async fn start_metrics_server(
    port: u16,
    facility: Arc<Facility>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(port = %port, site = %facility.site_id(), "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => {
                    tokio::spawn(serve_connection(stream, facility.clone()));
                }
                Err(e) => error!(error = %e, "prometheus_accept_error"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
