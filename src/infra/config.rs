//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::spot::SpotSpec;
use crate::domain::types::{SizeClass, SpotKey};
use crate::services::strategy::StrategyKind;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "phoenix-mall")
    #[serde(default = "default_site_id")]
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
}

fn default_site_id() -> String {
    "lot".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id(), address: None }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StrategyConfig {
    #[serde(default)]
    pub kind: StrategyKind,
}

/// A single spot as listed by the location registry
#[derive(Debug, Clone, Deserialize)]
pub struct SpotEntry {
    pub unit: u32,
    pub id: u32,
    pub size: SizeClass,
    #[serde(default)]
    pub elevator_distance: u32,
}

/// A run of consecutive spot IDs of one size on one unit
#[derive(Debug, Clone, Deserialize)]
pub struct SpotBlock {
    pub unit: u32,
    pub size: SizeClass,
    pub count: u32,
    pub first_id: u32,
    /// Distance of the first spot; each following spot is one step further
    #[serde(default)]
    pub elevator_distance: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelsConfig {
    #[serde(default = "default_panel_ids")]
    pub entry: Vec<u32>,
    #[serde(default = "default_panel_ids")]
    pub exit: Vec<u32>,
}

fn default_panel_ids() -> Vec<u32> {
    vec![1]
}

impl Default for PanelsConfig {
    fn default() -> Self {
        Self { entry: default_panel_ids(), exit: default_panel_ids() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for closed ticket egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "tickets.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Mean arrivals per second, per entry panel
    #[serde(default = "default_arrivals_per_sec")]
    pub arrivals_per_sec: f64,
    /// Mean simulated stay length
    #[serde(default = "default_mean_stay_secs")]
    pub mean_stay_secs: u64,
    /// Simulated seconds per real second
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Real seconds to run before shutting down (0 runs until Ctrl+C)
    #[serde(default)]
    pub duration_secs: u64,
}

fn default_arrivals_per_sec() -> f64 {
    2.0
}

fn default_mean_stay_secs() -> u64 {
    5400
}

fn default_time_scale() -> f64 {
    600.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arrivals_per_sec: default_arrivals_per_sec(),
            mean_stay_secs: default_mean_stay_secs(),
            time_scale: default_time_scale(),
            duration_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub spots: Vec<SpotEntry>,
    #[serde(default)]
    pub blocks: Vec<SpotBlock>,
    #[serde(default)]
    pub panels: PanelsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    site_address: Option<String>,
    strategy: StrategyKind,
    spots: Vec<SpotSpec>,
    entry_panels: Vec<u32>,
    exit_panels: Vec<u32>,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    egress_file: String,
    sim_arrivals_per_sec: f64,
    sim_mean_stay_secs: u64,
    sim_time_scale: f64,
    sim_duration_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            site_address: None,
            strategy: StrategyKind::Normal,
            spots: Self::default_spots(),
            entry_panels: default_panel_ids(),
            exit_panels: default_panel_ids(),
            metrics_interval_secs: default_metrics_interval(),
            prometheus_port: default_prometheus_port(),
            egress_file: default_egress_file(),
            sim_arrivals_per_sec: default_arrivals_per_sec(),
            sim_mean_stay_secs: default_mean_stay_secs(),
            sim_time_scale: default_time_scale(),
            sim_duration_secs: 0,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Two floors: 4 small, 6 medium, 2 large, 1 xlarge each
    fn default_spots() -> Vec<SpotSpec> {
        let layout = [
            (SizeClass::Small, 4),
            (SizeClass::Medium, 6),
            (SizeClass::Large, 2),
            (SizeClass::XLarge, 1),
        ];
        let mut spots = Vec::new();
        for unit in 1..=2u32 {
            let mut next_id = 1u32;
            for (size, count) in layout {
                for i in 0..count {
                    spots.push(SpotSpec::new(unit, next_id, size).with_elevator_distance(i));
                    next_id += 1;
                }
            }
        }
        spots
    }

    /// Expand individual entries and blocks into spot registrations, entries first
    fn expand_spots(entries: Vec<SpotEntry>, blocks: Vec<SpotBlock>) -> anyhow::Result<Vec<SpotSpec>> {
        let mut spots: Vec<SpotSpec> = entries
            .into_iter()
            .map(|e| SpotSpec {
                key: SpotKey::new(e.unit, e.id),
                size: e.size,
                elevator_distance: e.elevator_distance,
            })
            .collect();

        for block in blocks {
            for offset in 0..block.count {
                let (Some(id), Some(distance)) =
                    (block.first_id.checked_add(offset), block.elevator_distance.checked_add(offset))
                else {
                    anyhow::bail!(
                        "block of {} {} spots on unit {} starting at id {} overflows u32",
                        block.count,
                        block.size,
                        block.unit,
                        block.first_id
                    );
                };
                spots.push(SpotSpec::new(block.unit, id, block.size).with_elevator_distance(distance));
            }
        }
        Ok(spots)
    }

    /// Pick the config file: explicit path, then `CONFIG_FILE`, then the dev default
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        Self::resolve_with_env(cli_path, env::var("CONFIG_FILE").ok())
    }

    fn resolve_with_env(cli_path: Option<&str>, env_path: Option<String>) -> String {
        cli_path
            .map(str::to_string)
            .or_else(|| env_path.filter(|p| !p.is_empty()))
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| format!("Failed to parse config {}", source))?;

        let spots = Self::expand_spots(toml_config.spots, toml_config.blocks)
            .with_context(|| format!("Invalid spot layout in {}", source))?;

        Ok(Self {
            site_id: toml_config.site.id,
            site_address: toml_config.site.address,
            strategy: toml_config.strategy.kind,
            spots,
            entry_panels: toml_config.panels.entry,
            exit_panels: toml_config.panels.exit,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            egress_file: toml_config.egress.file,
            sim_arrivals_per_sec: toml_config.simulation.arrivals_per_sec,
            sim_mean_stay_secs: toml_config.simulation.mean_stay_secs,
            sim_time_scale: toml_config.simulation.time_scale,
            sim_duration_secs: toml_config.simulation.duration_secs,
            config_file: source.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(cli_path: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(cli_path))
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn site_address(&self) -> Option<&str> {
        self.site_address.as_deref()
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn spots(&self) -> &[SpotSpec] {
        &self.spots
    }

    pub fn entry_panels(&self) -> &[u32] {
        &self.entry_panels
    }

    pub fn exit_panels(&self) -> &[u32] {
        &self.exit_panels
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn sim_arrivals_per_sec(&self) -> f64 {
        self.sim_arrivals_per_sec
    }

    pub fn sim_mean_stay_secs(&self) -> u64 {
        self.sim_mean_stay_secs
    }

    pub fn sim_time_scale(&self) -> f64 {
        self.sim_time_scale
    }

    pub fn sim_duration_secs(&self) -> u64 {
        self.sim_duration_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to replace the spot layout
    pub fn with_spots(mut self, spots: Vec<SpotSpec>) -> Self {
        self.spots = spots;
        self
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "lot");
        assert_eq!(config.strategy(), StrategyKind::Normal);
        assert_eq!(config.spots().len(), 26);
        assert_eq!(config.entry_panels(), &[1]);
        assert_eq!(config.exit_panels(), &[1]);
        assert_eq!(config.metrics_interval_secs(), 10);
        assert_eq!(config.egress_file(), "tickets.jsonl");
    }

    #[test]
    fn test_default_spots_unique() {
        let config = Config::default();
        let keys: std::collections::HashSet<SpotKey> = config.spots().iter().map(|s| s.key).collect();
        assert_eq!(keys.len(), config.spots().len());
    }

    #[test]
    fn test_expand_blocks() {
        let config = Config::from_toml_str(
            r#"
[[spots]]
unit = 1
id = 100
size = "large"

[[blocks]]
unit = 2
size = "small"
count = 3
first_id = 10
elevator_distance = 4
"#,
            "inline",
        )
        .unwrap();

        let spots = config.spots();
        assert_eq!(spots.len(), 4);
        assert_eq!(spots[0].key, SpotKey::new(1, 100));
        assert_eq!(spots[0].size, SizeClass::Large);
        assert_eq!(spots[3].key, SpotKey::new(2, 12));
        assert_eq!(spots[3].elevator_distance, 6);
    }

    #[test]
    fn test_empty_toml_uses_section_defaults() {
        let config = Config::from_toml_str("", "empty").unwrap();
        assert_eq!(config.site_id(), "lot");
        assert!(config.spots().is_empty());
        assert_eq!(config.prometheus_port(), 9090);
        assert_eq!(config.sim_time_scale(), 600.0);
    }

    #[test]
    fn test_invalid_size_rejected() {
        let result = Config::from_toml_str(
            r#"
[[spots]]
unit = 1
id = 1
size = "huge"
"#,
            "inline",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_prefers_cli_path() {
        let path = Config::resolve_with_env(Some("config/mall.toml"), Some("config/env.toml".to_string()));
        assert_eq!(path, "config/mall.toml");
    }

    #[test]
    fn test_resolve_falls_back_to_env() {
        let path = Config::resolve_with_env(None, Some("config/env.toml".to_string()));
        assert_eq!(path, "config/env.toml");
    }

    #[test]
    fn test_resolve_default_path() {
        assert_eq!(Config::resolve_with_env(None, None), "config/dev.toml");
        assert_eq!(Config::resolve_with_env(None, Some(String::new())), "config/dev.toml");
    }

    #[test]
    fn test_block_id_overflow_is_an_error() {
        let result = Config::from_toml_str(
            "[[blocks]]\nunit = 1\nsize = \"small\"\ncount = 2\nfirst_id = 4294967295\n",
            "inline",
        );
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("overflows u32"));
    }

    #[test]
    fn test_block_distance_overflow_is_an_error() {
        let result = Config::from_toml_str(
            "[[blocks]]\nunit = 1\nsize = \"large\"\ncount = 3\nfirst_id = 1\nelevator_distance = 4294967294\n",
            "inline",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_block_ending_at_max_id_is_accepted() {
        let config = Config::from_toml_str(
            "[[blocks]]\nunit = 1\nsize = \"small\"\ncount = 2\nfirst_id = 4294967294\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.spots()[1].key, SpotKey::new(1, u32::MAX));
    }
}
