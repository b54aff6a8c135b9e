/// Host statistics: CPU, memory, load and static system info
use crate::errors::{DashError, DashResult};
use crate::modules::{CollectContext, Module, Sample};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

pub const HOST_TOPIC: &str = "host";

/// Re-send the static `info` sample every this many ticks
const INFO_EVERY_TICKS: u64 = 20;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadStats {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostInfo {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub uptime_secs: u64,
    pub physical_cores: usize,
    pub logical_cores: usize,
}

#[derive(Debug, Clone)]
struct HostReading {
    cpu_percent: u32,
    memory: MemoryStats,
    load: LoadStats,
    info: HostInfo,
}

pub struct HostModule {
    system: Arc<Mutex<System>>,
}

impl HostModule {
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        Self {
            system: Arc::new(Mutex::new(System::new_with_specifics(refresh))),
        }
    }

    fn read(system: &mut System) -> HostReading {
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        let load = System::load_average();

        HostReading {
            cpu_percent: system.global_cpu_usage().round().clamp(0.0, 100.0) as u32,
            memory: MemoryStats {
                total,
                used,
                free: system.free_memory(),
                available: system.available_memory(),
                swap_total: system.total_swap(),
                swap_used: system.used_swap(),
                used_percent: percent(used, total),
            },
            load: LoadStats {
                load1: load.one,
                load5: load.five,
                load15: load.fifteen,
            },
            info: HostInfo {
                hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
                os_name: System::name().unwrap_or_else(|| "unknown".to_string()),
                os_version: System::os_version().unwrap_or_default(),
                kernel_version: System::kernel_version().unwrap_or_default(),
                uptime_secs: System::uptime(),
                physical_cores: System::physical_core_count().unwrap_or(0),
                logical_cores: system.cpus().len(),
            },
        }
    }
}

impl Default for HostModule {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 10_000.0).round() / 100.0
}

#[async_trait]
impl Module for HostModule {
    fn name(&self) -> &'static str {
        "Host"
    }

    fn route_root(&self) -> &'static str {
        "host"
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![HOST_TOPIC]
    }

    async fn should_enable(&self) -> DashResult<bool> {
        Ok(sysinfo::IS_SUPPORTED_SYSTEM)
    }

    async fn collect(&self, ctx: &CollectContext) -> DashResult<Vec<Sample>> {
        let system = Arc::clone(&self.system);
        let reading = tokio::task::spawn_blocking(move || {
            let mut system = system.lock();
            HostModule::read(&mut system)
        })
        .await
        .map_err(|e| DashError::Collect(format!("host stats task failed: {}", e)))?;

        let mut samples = vec![
            Sample::new(HOST_TOPIC, "cpu", reading.cpu_percent)?,
            Sample::new(HOST_TOPIC, "mem", &reading.memory)?,
            Sample::new(HOST_TOPIC, "load", &reading.load)?,
        ];
        if ctx.tick <= 1 || ctx.tick % INFO_EVERY_TICKS == 0 {
            samples.push(Sample::new(HOST_TOPIC, "info", &reading.info)?);
        }
        Ok(samples)
    }
}
