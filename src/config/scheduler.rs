//! Scheduler configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;

/// Worker-pool scaling policy applied by the load monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingStrategy {
    /// No automatic scaling.
    RoundRobin,
    /// Scale purely on the load factor thresholds.
    LeastLoaded,
    /// Load factor thresholds plus queue-backlog and idle-worker heuristics.
    Adaptive,
    /// Scale on the amount of critical/high-priority backlog.
    PriorityBased,
}

fn default_max_cpu_usage() -> f64 {
    100.0
}

fn default_max_memory_usage() -> u64 {
    u64::MAX
}

fn default_max_queue_length() -> usize {
    100_000
}

/// Default per-task hard ceiling: one hour.
fn default_max_task_duration_ms() -> u64 {
    3_600_000
}

/// Hard ceilings on derived resource metrics.
///
/// Crossing any ceiling quiesces submission until every metric falls back
/// below its limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Ceiling for the derived CPU metric, in percent.
    #[serde(default = "default_max_cpu_usage")]
    pub max_cpu_usage: f64,
    /// Ceiling for the derived memory metric, in bytes.
    #[serde(default = "default_max_memory_usage")]
    pub max_memory_usage: u64,
    /// Hard queue-size ceiling.
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,
    /// Hard per-task duration ceiling in milliseconds; caps individual task
    /// timeouts.
    #[serde(default = "default_max_task_duration_ms")]
    pub max_task_duration_ms: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_usage: default_max_cpu_usage(),
            max_memory_usage: default_max_memory_usage(),
            max_queue_length: default_max_queue_length(),
            max_task_duration_ms: default_max_task_duration_ms(),
        }
    }
}

impl ResourceLimits {
    /// The per-task duration ceiling as a `Duration`.
    #[must_use]
    pub fn max_task_duration(&self) -> Duration {
        Duration::from_millis(self.max_task_duration_ms)
    }
}

fn default_scale_up_threshold() -> f64 {
    0.75
}

fn default_scale_down_threshold() -> f64 {
    0.25
}

fn default_scale_step() -> usize {
    1
}

fn default_cooldown_ms() -> u64 {
    1_000
}

/// Tuning knobs for the autoscaling controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancingConfig {
    /// Load factor above which the pool grows.
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,
    /// Load factor below which the pool shrinks.
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,
    /// Threads added per scale-up action.
    #[serde(default = "default_scale_step")]
    pub scale_up_step: usize,
    /// Threads removed per scale-down action.
    #[serde(default = "default_scale_step")]
    pub scale_down_step: usize,
    /// Minimum spacing between two scaling actions, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            scale_up_step: default_scale_step(),
            scale_down_step: default_scale_step(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl LoadBalancingConfig {
    /// The scaling cooldown as a `Duration`.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

fn default_min_threads() -> usize {
    2
}

fn default_max_threads() -> usize {
    16
}

fn default_max_queue_size() -> usize {
    1_000
}

/// Default per-task timeout: 30 seconds.
fn default_timeout_ms() -> u64 {
    30_000
}

fn default_enable_load_balancing() -> bool {
    true
}

fn default_strategy() -> ScalingStrategy {
    ScalingStrategy::Adaptive
}

fn default_monitor_interval_ms() -> u64 {
    1_000
}

/// Top-level scheduler configuration.
///
/// # Example
///
/// ```rust
/// use taskmill::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .with_thread_range(4, 32)
///     .with_default_timeout_ms(10_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Floor for the worker pool size.
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,
    /// Ceiling for the worker pool size.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Advisory soft cap on queue depth, surfaced through resource ceilings.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Per-task timeout applied when a task does not carry its own, in
    /// milliseconds. Twice this value bounds how long a task may sit queued.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Master switch for the autoscaling controller.
    #[serde(default = "default_enable_load_balancing")]
    pub enable_load_balancing: bool,
    /// Scaling policy.
    #[serde(default = "default_strategy")]
    pub strategy: ScalingStrategy,
    /// Load monitor wake period in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Hard resource ceilings.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// Autoscaler tuning.
    #[serde(default)]
    pub load_balancing: LoadBalancingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            max_queue_size: default_max_queue_size(),
            default_timeout_ms: default_timeout_ms(),
            enable_load_balancing: default_enable_load_balancing(),
            strategy: default_strategy(),
            monitor_interval_ms: default_monitor_interval_ms(),
            resource_limits: ResourceLimits::default(),
            load_balancing: LoadBalancingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration sized for the current host: the pool may grow to twice
    /// the number of logical CPUs.
    #[must_use]
    pub fn sized_for_host() -> Self {
        let cpus = num_cpus::get();
        Self::default().with_thread_range(default_min_threads().min(cpus), cpus * 2)
    }

    /// Set both pool bounds at once.
    #[must_use]
    pub fn with_thread_range(mut self, min_threads: usize, max_threads: usize) -> Self {
        self.min_threads = min_threads;
        self.max_threads = max_threads;
        self
    }

    /// Set the default per-task timeout in milliseconds.
    #[must_use]
    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable the autoscaling controller.
    #[must_use]
    pub fn with_load_balancing(mut self, enabled: bool) -> Self {
        self.enable_load_balancing = enabled;
        self
    }

    /// Set the scaling policy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ScalingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the load monitor wake period in milliseconds.
    #[must_use]
    pub fn with_monitor_interval_ms(mut self, interval_ms: u64) -> Self {
        self.monitor_interval_ms = interval_ms;
        self
    }

    /// Replace the resource ceilings.
    #[must_use]
    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    /// Replace the autoscaler tuning.
    #[must_use]
    pub fn with_load_balancing_config(mut self, config: LoadBalancingConfig) -> Self {
        self.load_balancing = config;
        self
    }

    /// The default per-task timeout as a `Duration`.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// The monitor wake period as a `Duration`.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Validate configuration values.
    ///
    /// A `min_threads` of zero is allowed: it disables workers entirely,
    /// which is useful for queue-only operation and tests.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` describing the first invalid
    /// field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_threads < self.min_threads {
            return Err(SchedulerError::InvalidConfig(
                "max_threads must be >= min_threads".into(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "default_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.monitor_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "monitor_interval_ms must be greater than 0".into(),
            ));
        }
        let lb = &self.load_balancing;
        if !(0.0..=1.0).contains(&lb.scale_up_threshold)
            || !(0.0..=1.0).contains(&lb.scale_down_threshold)
        {
            return Err(SchedulerError::InvalidConfig(
                "scaling thresholds must lie in [0, 1]".into(),
            ));
        }
        if lb.scale_down_threshold >= lb.scale_up_threshold {
            return Err(SchedulerError::InvalidConfig(
                "scale_down_threshold must be below scale_up_threshold".into(),
            ));
        }
        if lb.scale_up_step == 0 || lb.scale_down_step == 0 {
            return Err(SchedulerError::InvalidConfig(
                "scaling steps must be greater than 0".into(),
            ));
        }
        let limits = &self.resource_limits;
        if limits.max_cpu_usage <= 0.0 || limits.max_cpu_usage > 100.0 {
            return Err(SchedulerError::InvalidConfig(
                "max_cpu_usage must lie in (0, 100]".into(),
            ));
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let config: SchedulerConfig = serde_json::from_str(input)
            .map_err(|e| SchedulerError::InvalidConfig(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}
