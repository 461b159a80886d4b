//! Configuration models for the scheduler, resource ceilings, and autoscaler.

pub mod scheduler;

pub use scheduler::{LoadBalancingConfig, ResourceLimits, SchedulerConfig, ScalingStrategy};
