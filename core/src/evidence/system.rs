//! Host evidence gathered through `sysinfo`

use super::EvidenceCollector;
use crate::telemetry::{MetricsRecorder, SYSTEM_INFO_COLLECTION_DURATION};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Networks, System};
use tracing::{debug, warn};

/// Device, process, memory, cpu and network sections for the current host
pub struct SystemEvidenceCollector {
    metrics: Arc<dyn MetricsRecorder>,
}

impl SystemEvidenceCollector {
    pub fn new(metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self { metrics }
    }

    /// Blocking snapshot of the host
    pub fn snapshot() -> Map<String, Value> {
        let mut system = System::new_all();
        system.refresh_all();

        let mut evidence = Map::new();
        evidence.insert("device".into(), device_section());
        evidence.insert("process".into(), process_section(&system));
        evidence.insert("memory".into(), memory_section(&system));
        evidence.insert("cpu".into(), cpu_section(&system));
        evidence.insert("network".into(), network_section());
        evidence
    }
}

#[async_trait]
impl EvidenceCollector for SystemEvidenceCollector {
    async fn collect(&self) -> Map<String, Value> {
        let started = Instant::now();
        let evidence = match tokio::task::spawn_blocking(Self::snapshot).await {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!("[SystemEvidenceCollector] Snapshot task failed: {}", e);
                Map::new()
            }
        };
        self.metrics
            .record_duration(SYSTEM_INFO_COLLECTION_DURATION, started.elapsed());
        debug!("[SystemEvidenceCollector] Collected {} sections", evidence.len());
        evidence
    }
}

fn device_section() -> Value {
    let hostname = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
        .or_else(System::host_name)
        .unwrap_or_else(|| String::from("Unknown"));

    json!({
        "os_name": System::name().unwrap_or_else(|| String::from("Unknown")),
        "os_version": System::os_version().unwrap_or_else(|| String::from("Unknown")),
        "kernel_version": System::kernel_version().unwrap_or_else(|| String::from("Unknown")),
        "hostname": hostname,
        "arch": std::env::consts::ARCH,
        "family": std::env::consts::FAMILY,
        "boot_time": System::boot_time(),
        "uptime": System::uptime(),
    })
}

fn process_section(system: &System) -> Value {
    let pid = std::process::id();
    let process = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| system.process(pid));

    json!({
        "pid": pid,
        "name": process.map(|p| p.name().to_string()),
        "memory": process.map(|p| p.memory()),
        "start_time": process.map(|p| p.start_time()),
        "exe": std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string())),
    })
}

fn memory_section(system: &System) -> Value {
    json!({
        "total": system.total_memory(),
        "used": system.used_memory(),
        "available": system.available_memory(),
        "total_swap": system.total_swap(),
        "used_swap": system.used_swap(),
    })
}

fn cpu_section(system: &System) -> Value {
    let global = system.global_cpu_info();
    json!({
        "brand": global.brand(),
        "vendor_id": global.vendor_id(),
        "logical_cores": system.cpus().len(),
        "physical_cores": system.physical_core_count(),
        "usage": global.cpu_usage(),
    })
}

fn network_section() -> Value {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<String> = networks.iter().map(|(name, _)| name.clone()).collect();
    interfaces.sort();
    json!({ "interfaces": interfaces })
}
