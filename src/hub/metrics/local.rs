//! Metrics for the machine the hub runs on.
//!
//! Used when no connected remote session is available. CPU utilization is
//! approximated from the one-minute load average divided by the core count,
//! which needs no sampling interval.

use std::path::Path;

use sysinfo::{Disks, System};

use super::probes::{percent, to_gib};
use crate::hub::now_millis;
use crate::hub::types::{MetricsSnapshot, MetricsSource};

pub(crate) fn snapshot() -> MetricsSnapshot {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_all();

    let cores = system.cpus().len().max(1);
    let load = System::load_average();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let (disk_total, disk_used) = root_disk_usage();

    let os_name = match (System::name(), System::os_version()) {
        (Some(name), Some(version)) if !version.is_empty() => Some(format!("{} {}", name, version)),
        (name, _) => name,
    };

    MetricsSnapshot {
        cpu: load_to_cpu_percent(load.one, cores),
        memory: percent(memory_used, memory_total),
        memory_used: to_gib(memory_used),
        memory_total: to_gib(memory_total),
        disk: percent(disk_used, disk_total),
        disk_used: to_gib(disk_used),
        disk_total: to_gib(disk_total),
        load_average: [load.one, load.five, load.fifteen],
        timestamp: now_millis(),
        source: MetricsSource::Local,
        os_name,
        uptime: Some(format_uptime(System::uptime())),
        cpu_model: system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty()),
        cpu_cores: u32::try_from(cores).ok(),
        hostname: System::host_name(),
        kernel: System::kernel_version(),
    }
}

/// `(total, used)` bytes of the root filesystem, or of the largest disk when
/// nothing is mounted at `/`.
fn root_disk_usage() -> (u64, u64) {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));

    match disk {
        Some(disk) => {
            let total = disk.total_space();
            (total, total.saturating_sub(disk.available_space()))
        }
        None => (0, 0),
    }
}

/// Load average as a share of available cores, rounded and capped at 100.
pub(crate) fn load_to_cpu_percent(load_one: f64, cores: usize) -> u32 {
    if !load_one.is_finite() || cores == 0 {
        return 0;
    }
    (load_one / cores as f64 * 100.0).round().clamp(0.0, 100.0) as u32
}

/// Renders seconds the way `uptime -p` does, e.g. `up 3 days, 4 hours, 5 minutes`.
pub(crate) fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{} {}", n, unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(plural(minutes, "minute"));
    }
    format!("up {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_to_cpu_percent() {
        assert_eq!(load_to_cpu_percent(2.0, 4), 50);
        assert_eq!(load_to_cpu_percent(0.0, 8), 0);
        assert_eq!(load_to_cpu_percent(1.234, 1), 100);
        assert_eq!(load_to_cpu_percent(f64::NAN, 4), 0);
        assert_eq!(load_to_cpu_percent(1.0, 0), 0);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "up 0 minutes");
        assert_eq!(format_uptime(60), "up 1 minute");
        assert_eq!(format_uptime(3 * 86_400 + 4 * 3_600 + 5 * 60), "up 3 days, 4 hours, 5 minutes");
        assert_eq!(format_uptime(86_400 + 3_600), "up 1 day, 1 hour");
    }

    #[test]
    fn test_snapshot_is_local_and_bounded() {
        let snapshot = snapshot();
        assert_eq!(snapshot.source, MetricsSource::Local);
        assert!(snapshot.cpu <= 100);
        assert!(snapshot.memory <= 100);
        assert!(snapshot.disk <= 100);
        assert!(snapshot.cpu_cores.unwrap_or(1) >= 1);
        assert!(snapshot.timestamp > 0);
    }
}
