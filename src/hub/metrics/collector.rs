//! Metrics collection with a short-lived per-connection cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, warn};

use super::local;
use super::probes::{self, descriptive};
use crate::hub::error::HubError;
use crate::hub::now_millis;
use crate::hub::transport::Transport;
use crate::hub::types::{MetricsSnapshot, MetricsSource};

#[derive(Debug, Clone)]
struct Cached {
    snapshot: MetricsSnapshot,
    captured_at: Instant,
}

impl Cached {
    fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot,
            captured_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.captured_at.elapsed() < ttl
    }
}

/// Per-connection collection gate.
#[derive(Default)]
struct Gate {
    lock: tokio::sync::Mutex<()>,
    /// Bumped by `clear`; results started under an older epoch are dropped.
    epoch: AtomicU64,
}

pub struct MetricsCollector {
    remote: DashMap<String, Cached>,
    local: DashMap<String, Cached>,
    in_flight: DashMap<String, Arc<Gate>>,
    ttl: Duration,
}

impl MetricsCollector {
    pub fn new(ttl: Duration) -> Self {
        Self {
            remote: DashMap::new(),
            local: DashMap::new(),
            in_flight: DashMap::new(),
            ttl,
        }
    }

    /// Per-id gate so at most one collection runs for a connection.
    fn gate(&self, connection_id: &str) -> Arc<Gate> {
        Arc::clone(
            self.in_flight
                .entry(connection_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Runs the probe battery now and refreshes the cache.
    pub async fn collect(
        &self,
        connection_id: &str,
        transport: &dyn Transport,
    ) -> Result<MetricsSnapshot, HubError> {
        let gate = self.gate(connection_id);
        let _permit = gate.lock.lock().await;
        self.collect_and_cache(connection_id, transport, &gate).await
    }

    /// Returns the cached snapshot while it is fresh, otherwise collects.
    ///
    /// Concurrent callers for the same id wait for the one running
    /// collection and then reuse its result.
    pub async fn collect_or_cached(
        &self,
        connection_id: &str,
        transport: &dyn Transport,
    ) -> Result<MetricsSnapshot, HubError> {
        let gate = self.gate(connection_id);
        let _permit = gate.lock.lock().await;

        if let Some(snapshot) = self.fresh(connection_id) {
            debug!("Using cached metrics for {}", connection_id);
            return Ok(snapshot);
        }
        self.collect_and_cache(connection_id, transport, &gate).await
    }

    /// Caller must hold `gate.lock`.
    async fn collect_and_cache(
        &self,
        connection_id: &str,
        transport: &dyn Transport,
        gate: &Gate,
    ) -> Result<MetricsSnapshot, HubError> {
        let epoch = gate.epoch.load(Ordering::SeqCst);
        let snapshot = collect_remote(connection_id, transport).await?;

        // The shard stays locked between the epoch check and the insert
        let entry = self.remote.entry(connection_id.to_string());
        if gate.epoch.load(Ordering::SeqCst) == epoch {
            entry.insert(Cached::new(snapshot.clone()));
        } else {
            debug!("Discarding metrics for {} collected before a clear", connection_id);
        }
        Ok(snapshot)
    }

    /// Last remote snapshot regardless of age.
    pub fn cached(&self, connection_id: &str) -> Option<MetricsSnapshot> {
        self.remote.get(connection_id).map(|c| c.snapshot.clone())
    }

    /// Last remote snapshot if still within the cache window.
    pub fn fresh(&self, connection_id: &str) -> Option<MetricsSnapshot> {
        self.remote
            .get(connection_id)
            .filter(|c| c.is_fresh(self.ttl))
            .map(|c| c.snapshot.clone())
    }

    /// Snapshot of the machine running the hub, cached per id.
    ///
    /// The sysinfo refresh runs on the blocking pool.
    pub async fn local_status(&self, connection_id: &str) -> Result<MetricsSnapshot, HubError> {
        if let Some(cached) = self.local.get(connection_id)
            && cached.is_fresh(self.ttl)
        {
            return Ok(cached.snapshot.clone());
        }

        let snapshot = tokio::task::spawn_blocking(local::snapshot)
            .await
            .map_err(|e| HubError::Transport(format!("Local metrics task failed: {}", e)))?;
        self.local
            .insert(connection_id.to_string(), Cached::new(snapshot.clone()));
        Ok(snapshot)
    }

    /// Drops cached snapshots for a connection. A collection still running
    /// keeps its gate, and its result is not cached.
    pub fn clear(&self, connection_id: &str) {
        if let Some(gate) = self.in_flight.get(connection_id) {
            gate.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.remove_if(connection_id, |_, gate| Arc::strong_count(gate) == 1);
        self.remote.remove(connection_id);
        self.local.remove(connection_id);
    }

    pub fn clear_all(&self) {
        for gate in self.in_flight.iter() {
            gate.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.retain(|_, gate| Arc::strong_count(gate) > 1);
        self.remote.clear();
        self.local.clear();
    }
}

/// `CommandFailed` degrades a required probe to empty output; anything else
/// aborts the collection.
fn required(name: &str, result: Result<String, HubError>) -> Result<String, HubError> {
    match result {
        Ok(output) => Ok(output),
        Err(e) if e.is_command_failure() => {
            warn!("Metrics probe '{}' failed, reporting 0: {}", name, e);
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

fn optional(name: &str, result: Result<String, HubError>) -> Option<String> {
    match result {
        Ok(output) => descriptive(&output),
        Err(e) => {
            debug!("Metrics probe '{}' unavailable: {}", name, e);
            None
        }
    }
}

/// Runs the whole probe battery concurrently.
pub(crate) async fn collect_remote(
    connection_id: &str,
    transport: &dyn Transport,
) -> Result<MetricsSnapshot, HubError> {
    let commands = [
        probes::CPU_COMMAND,
        probes::MEMORY_COMMAND,
        probes::DISK_COMMAND,
        probes::LOAD_COMMAND,
        probes::OS_COMMAND,
        probes::UPTIME_COMMAND,
        probes::CPU_MODEL_COMMAND,
        probes::CORES_COMMAND,
        probes::HOSTNAME_COMMAND,
        probes::KERNEL_COMMAND,
    ];

    let mut results = join_all(commands.iter().map(|cmd| transport.execute(cmd)))
        .await
        .into_iter();
    let mut next = || {
        results
            .next()
            .unwrap_or_else(|| Err(HubError::Transport("missing probe result".to_string())))
    };

    let cpu = required("cpu", next())?;
    let memory = required("memory", next())?;
    let disk = required("disk", next())?;
    let load = required("load", next())?;
    let os_name = optional("os", next());
    let uptime = optional("uptime", next());
    let cpu_model = optional("cpu model", next());
    let cores = optional("cores", next());
    let hostname = optional("hostname", next());
    let kernel = optional("kernel", next());

    let (memory_total, memory_used) = probes::parse_total_used(&memory);
    let (disk_total, disk_used) = probes::parse_total_used(&disk);

    let snapshot = MetricsSnapshot {
        cpu: probes::parse_cpu(&cpu),
        memory: probes::percent(memory_used, memory_total),
        memory_used: probes::to_gib(memory_used),
        memory_total: probes::to_gib(memory_total),
        disk: probes::percent(disk_used, disk_total),
        disk_used: probes::to_gib(disk_used),
        disk_total: probes::to_gib(disk_total),
        load_average: probes::parse_load_average(&load),
        timestamp: now_millis(),
        source: MetricsSource::Remote,
        os_name,
        uptime,
        cpu_model,
        cpu_cores: Some(cores.as_deref().map_or(1, probes::parse_cores)),
        hostname,
        kernel,
    };

    debug!(
        "Collected metrics for {}: cpu={}%, memory={}%, disk={}%",
        connection_id, snapshot.cpu, snapshot.memory, snapshot.disk
    );
    Ok(snapshot)
}
