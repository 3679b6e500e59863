use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::{Components, System};
use tracing::debug;

use super::command_output;

/// Point-in-time host metrics. Every field falls back to zero (or `false`)
/// when its source is unavailable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub cpu_temp: f64,
    pub battery_percent: f64,
    pub is_plugged: bool,
}

#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Never fails; missing readings are reported as zero.
    async fn snapshot(&self) -> SystemStats;
}

/// Live metrics from `sysinfo`, battery from `upower`.
#[derive(Clone)]
pub struct HostStats {
    system: Arc<Mutex<System>>,
}

impl HostStats {
    /// Takes an initial CPU sample so the first snapshot has a baseline.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }
}

impl Default for HostStats {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatsSource for HostStats {
    async fn snapshot(&self) -> SystemStats {
        let system = Arc::clone(&self.system);
        let sampled = tokio::task::spawn_blocking(move || {
            let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
            sample_host(&mut sys)
        })
        .await;

        let mut stats = match sampled {
            Ok(stats) => stats,
            Err(e) => {
                debug!(error = %e, "host sampling task failed");
                SystemStats::default()
            }
        };

        let (battery_percent, is_plugged) = battery().await;
        stats.battery_percent = battery_percent;
        stats.is_plugged = is_plugged;
        stats
    }
}

fn sample_host(sys: &mut System) -> SystemStats {
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpu_usage = clamp_percent(f64::from(sys.global_cpu_info().cpu_usage()));
    let total = sys.total_memory();
    let ram_usage = if total > 0 {
        clamp_percent(sys.used_memory() as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    let components = Components::new_with_refreshed_list();
    let readings: Vec<(String, f32)> = components
        .list()
        .iter()
        .map(|c| (c.label().to_owned(), c.temperature()))
        .collect();

    SystemStats {
        cpu_usage,
        ram_usage,
        cpu_temp: pick_temperature(&readings),
        ..SystemStats::default()
    }
}

/// Prefer `coretemp`, then `cpu_thermal`, then the first usable sensor.
pub fn pick_temperature(readings: &[(String, f32)]) -> f64 {
    let usable = |t: &f32| t.is_finite() && *t > 0.0;
    let chip_is = |label: &str, chip: &str| {
        label
            .split_whitespace()
            .next()
            .is_some_and(|first| first.eq_ignore_ascii_case(chip))
    };

    ["coretemp", "cpu_thermal"]
        .iter()
        .find_map(|chip| {
            readings
                .iter()
                .find(|(label, t)| chip_is(label, chip) && usable(t))
        })
        .or_else(|| readings.iter().find(|(_, t)| usable(t)))
        .map(|(_, t)| f64::from(*t))
        .unwrap_or(0.0)
}

async fn battery() -> (f64, bool) {
    let devices = match command_output("upower", &["-e"]).await {
        Ok(out) => out,
        Err(e) => {
            debug!(error = %e, "upower unavailable");
            return (0.0, false);
        }
    };
    let Some(device) = devices
        .lines()
        .map(str::trim)
        .find(|line| line.contains("battery"))
    else {
        return (0.0, false);
    };
    match command_output("upower", &["-i", device]).await {
        Ok(info) => parse_upower_info(&info),
        Err(e) => {
            debug!(error = %e, device, "upower device query failed");
            (0.0, false)
        }
    }
}

/// Extract `(percentage, plugged)` from `upower -i <device>` output.
pub fn parse_upower_info(info: &str) -> (f64, bool) {
    let mut percent = 0.0;
    let mut plugged = false;
    for line in info.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "percentage" => {
                percent = value
                    .trim_end_matches('%')
                    .trim()
                    .parse::<f64>()
                    .map(clamp_percent)
                    .unwrap_or(0.0);
            }
            "state" => plugged = matches!(value, "charging" | "fully-charged"),
            _ => {}
        }
    }
    (percent, plugged)
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
