//! Resource usage probes.
//!
//! Host-level sampling is out of scope for the core; the scheduler ships a
//! derived probe that estimates usage from its own counters. Deployments with
//! real CPU/RSS sampling can implement [`ResourceProbe`] against the host.

/// Scheduler-side observations a probe derives usage from.
#[derive(Debug, Clone, Copy)]
pub struct UsageInputs {
    /// Workers currently inside a task function.
    pub active: usize,
    /// Current worker pool size.
    pub pool_size: usize,
    /// Tasks waiting in the queue.
    pub queue_size: usize,
}

/// Source of CPU and memory usage estimates for ceiling enforcement.
pub trait ResourceProbe: Send + Sync {
    /// CPU usage in percent, `[0, 100]`.
    fn cpu_usage(&self, inputs: &UsageInputs) -> f64;
    /// Memory usage in bytes.
    fn memory_usage(&self, inputs: &UsageInputs) -> u64;
}

/// Default probe deriving usage from pool and queue occupancy.
///
/// CPU is modeled as the fraction of busy workers; memory as 1 KiB per queued
/// task plus 1 MiB per worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedProbe;

impl ResourceProbe for DerivedProbe {
    fn cpu_usage(&self, inputs: &UsageInputs) -> f64 {
        if inputs.pool_size == 0 {
            return 0.0;
        }
        (100.0 * inputs.active as f64 / inputs.pool_size as f64).clamp(0.0, 100.0)
    }

    fn memory_usage(&self, inputs: &UsageInputs) -> u64 {
        inputs.queue_size as u64 * 1024 + inputs.pool_size as u64 * 1024 * 1024
    }
}
