//! Host and process metric sampling for heartbeat telemetry
//!
//! Every call samples the instant it is invoked; nothing is cached. The
//! sample struct is the single impure input to the otherwise pure heartbeat
//! payload builder.

use sysinfo::System;

/// Point-in-time snapshot of the metrics carried by a heartbeat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSample {
    /// Host uptime in seconds
    pub uptime_secs: u64,
    /// 1/5/15 minute load averages (zeros on platforms without loadavg)
    pub load_avg: [f64; 3],
    /// Total physical memory in bytes
    pub mem_total: u64,
    /// Free physical memory in bytes
    pub mem_free: u64,
    /// Process id of this agent
    pub pid: u32,
}

impl SystemSample {
    pub fn take() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let load = System::load_average();

        Self {
            uptime_secs: System::uptime(),
            load_avg: [load.one, load.five, load.fifteen],
            mem_total: sys.total_memory(),
            mem_free: sys.free_memory(),
            pid: std::process::id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_plausible() {
        let sample = SystemSample::take();

        assert!(sample.mem_total > 0);
        assert!(sample.mem_free <= sample.mem_total);
        assert_eq!(sample.pid, std::process::id());
        assert!(sample.load_avg.iter().all(|l| l.is_finite() && *l >= 0.0));
    }

    #[test]
    fn test_samples_are_fresh() {
        // Two samples are independent reads, not a cached singleton
        let a = SystemSample::take();
        let b = SystemSample::take();
        assert!(b.uptime_secs >= a.uptime_secs);
    }
}
