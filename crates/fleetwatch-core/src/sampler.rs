//! Host resource sampling.
//!
//! `SysinfoSampler` reads the local OS; `FixedSampler` returns a canned
//! sample for tests.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, ProcessesToUpdate, System};

use crate::error::ProbeError;

/// One reading of host-level resource usage. Usages are fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostSample {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    /// One-minute load average (0 where the OS does not report it).
    pub load_average: f64,
    pub process_count: u64,
}

/// Source of host resource samples.
pub trait HostSampler: Send + Sync {
    fn sample(&self) -> Result<HostSample, ProbeError>;
}

/// Samples the local machine through `sysinfo`.
///
/// CPU usage needs two refreshes to be meaningful, so the first sample
/// after construction reports whatever `sysinfo` has (usually zero).
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&self) -> Result<HostSample, ProbeError> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_cpu_usage();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let total_memory = system.total_memory();
        if total_memory == 0 {
            return Err(ProbeError::Sampler("total memory reported as zero".into()));
        }
        let memory_usage = system.used_memory() as f64 / total_memory as f64;
        let cpu_usage = (f64::from(system.global_cpu_usage()) / 100.0).clamp(0.0, 1.0);
        let process_count = system.processes().len() as u64;
        drop(system);

        let disks = Disks::new_with_refreshed_list();
        let (total_space, available_space) = disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, avail), d| {
                (total + d.total_space(), avail + d.available_space())
            });
        let disk_usage = if total_space > 0 {
            1.0 - available_space as f64 / total_space as f64
        } else {
            0.0
        };

        Ok(HostSample {
            cpu_usage,
            memory_usage: memory_usage.clamp(0.0, 1.0),
            disk_usage: disk_usage.clamp(0.0, 1.0),
            load_average: System::load_average().one,
            process_count,
        })
    }
}

/// Always returns the same sample (or the same error).
#[derive(Debug, Clone)]
pub struct FixedSampler {
    result: Result<HostSample, ProbeError>,
}

impl FixedSampler {
    pub fn new(sample: HostSample) -> Self {
        Self { result: Ok(sample) }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self { result: Err(error) }
    }
}

impl Default for FixedSampler {
    fn default() -> Self {
        Self::new(HostSample {
            cpu_usage: 0.25,
            memory_usage: 0.50,
            disk_usage: 0.30,
            load_average: 0.8,
            process_count: 150,
        })
    }
}

impl HostSampler for FixedSampler {
    fn sample(&self) -> Result<HostSample, ProbeError> {
        self.result.clone()
    }
}
