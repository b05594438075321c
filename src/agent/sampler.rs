//! System metric sampling

use std::collections::BTreeMap;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Reads host and process gauges from the operating system
pub struct Sampler {
    sys: System,
    pid: Option<Pid>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        Self {
            sys,
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Refresh and return every gauge, keyed by metric name
    ///
    /// CPU figures are usage since the previous call, so the first sample
    /// reports zero.
    pub fn sample(&mut self) -> BTreeMap<String, f64> {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();

        let mut gauges = BTreeMap::new();

        gauges.insert("TotalMemory".to_string(), self.sys.total_memory() as f64);
        gauges.insert("FreeMemory".to_string(), self.sys.free_memory() as f64);
        gauges.insert("UsedMemory".to_string(), self.sys.used_memory() as f64);
        gauges.insert("TotalSwap".to_string(), self.sys.total_swap() as f64);
        gauges.insert("UsedSwap".to_string(), self.sys.used_swap() as f64);

        for (index, cpu) in self.sys.cpus().iter().enumerate() {
            gauges.insert(
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            );
        }

        gauges.insert("LoadAverage1".to_string(), System::load_average().one);

        if let Some(pid) = self.pid {
            self.sys
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

            if let Some(process) = self.sys.process(pid) {
                gauges.insert(
                    "ProcessResidentMemory".to_string(),
                    process.memory() as f64,
                );
                gauges.insert(
                    "ProcessVirtualMemory".to_string(),
                    process.virtual_memory() as f64,
                );
                gauges.insert(
                    "ProcessCPUUsage".to_string(),
                    f64::from(process.cpu_usage()),
                );
            }
        }

        gauges.insert("RandomValue".to_string(), rand::random::<f64>());

        gauges
    }
}
