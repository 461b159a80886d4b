//! Load monitor: metrics refresh, resource ceilings, and pool autoscaling.
//!
//! A single background thread wakes every `monitor_interval` and, in order,
//! refreshes derived metrics, enforces the configured resource ceilings
//! (quiescing submission while any ceiling is crossed), and applies the
//! configured scaling strategy within `[min_threads, max_threads]`, spaced
//! by the cooldown period.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{LoadBalancingConfig, SchedulerConfig, ScalingStrategy};
use crate::core::metrics::LoadSnapshot;
use crate::core::probe::{ResourceProbe, UsageInputs};
use crate::core::task::Priority;
use crate::scheduler::SchedulerCore;

/// Monitor thread body; returns when the scheduler stops running.
pub(crate) fn run(core: Arc<SchedulerCore>) {
    debug!("load monitor started");
    while core.running.load(Ordering::Acquire) {
        tick(&core);
        let interval = core.config.read().monitor_interval();
        sleep_while_running(&core, interval);
    }
    debug!("load monitor stopped");
}

/// Sleep for `total`, waking early if the scheduler shuts down.
fn sleep_while_running(core: &SchedulerCore, total: Duration) {
    let deadline = Instant::now() + total;
    while core.running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

/// One monitor pass: metrics, ceilings, scaling.
pub(crate) fn tick(core: &SchedulerCore) {
    core.registry.refresh_average_execution();

    let config = core.config.read().clone();
    let inputs = UsageInputs {
        active: core.pool.active_count(),
        pool_size: core.pool.pool_size(),
        queue_size: core.queue.len(),
    };
    let cpu_usage = core.probe.cpu_usage(&inputs);
    let memory_usage = core.probe.memory_usage(&inputs);
    let load = load_factor(&inputs);
    core.registry.record_usage(cpu_usage, memory_usage, load);

    enforce_ceilings(core, &config, cpu_usage, memory_usage, inputs.queue_size);
    maybe_scale(core, &config, &inputs, load);
}

/// Combined utilization/backlog scalar in `[0, 1]`:
/// `min(1, active/pool + 0.5 * min(1, queue/pool))`.
pub(crate) fn load_factor(inputs: &UsageInputs) -> f64 {
    if inputs.pool_size == 0 {
        return if inputs.queue_size > 0 { 1.0 } else { 0.0 };
    }
    let pool = inputs.pool_size as f64;
    let utilization = inputs.active as f64 / pool;
    let backlog = (inputs.queue_size as f64 / pool).min(1.0);
    (utilization + 0.5 * backlog).min(1.0)
}

fn enforce_ceilings(
    core: &SchedulerCore,
    config: &SchedulerConfig,
    cpu_usage: f64,
    memory_usage: u64,
    queue_size: usize,
) {
    let limits = &config.resource_limits;
    let exceeded = cpu_usage > limits.max_cpu_usage
        || memory_usage > limits.max_memory_usage
        || queue_size > limits.max_queue_length;
    core.resource_exceeded.store(exceeded, Ordering::Release);

    if exceeded {
        if !core.paused.load(Ordering::Acquire) {
            warn!(
                cpu_usage,
                memory_usage, queue_size, "resource ceiling exceeded, pausing scheduling"
            );
            core.resource_paused.store(true, Ordering::Release);
            core.pause();
        }
    } else if core.resource_paused.swap(false, Ordering::AcqRel) {
        info!("resource usage back under ceilings, resuming scheduling");
        core.resume();
    }
}

fn maybe_scale(
    core: &SchedulerCore,
    config: &SchedulerConfig,
    inputs: &UsageInputs,
    load: f64,
) {
    if !config.enable_load_balancing || !core.autoscaling_enabled.load(Ordering::Acquire) {
        return;
    }
    {
        let last = core.last_scaling_action.lock();
        if let Some(at) = *last {
            if at.elapsed() < config.load_balancing.cooldown() {
                return;
            }
        }
    }

    let distribution = core.queue.priority_distribution();
    let urgent_queued = distribution.get(&Priority::Critical).copied().unwrap_or(0)
        + distribution.get(&Priority::High).copied().unwrap_or(0);
    let snapshot = LoadSnapshot {
        active: inputs.active,
        pool_size: inputs.pool_size,
        queue_size: inputs.queue_size,
        urgent_queued,
        load_factor: load,
    };

    let Some(target) = scaling_decision(
        config.strategy,
        &snapshot,
        &config.load_balancing,
        config.min_threads,
        config.max_threads,
    ) else {
        return;
    };

    info!(
        from = snapshot.pool_size,
        to = target,
        strategy = ?config.strategy,
        load_factor = snapshot.load_factor,
        "scaling worker pool"
    );
    core.pool.resize(target);
    *core.last_scaling_action.lock() = Some(Instant::now());
}

/// Pick a new pool size for the snapshot, or `None` to hold steady.
///
/// The returned target is always clamped to `[min_threads, max_threads]` and
/// differs from the current size. Scale-up triggers win over scale-down when
/// both fire.
pub(crate) fn scaling_decision(
    strategy: ScalingStrategy,
    snapshot: &LoadSnapshot,
    lb: &LoadBalancingConfig,
    min_threads: usize,
    max_threads: usize,
) -> Option<usize> {
    let pool = snapshot.pool_size;
    let (up, down) = match strategy {
        ScalingStrategy::RoundRobin => (false, false),
        ScalingStrategy::LeastLoaded => (
            snapshot.load_factor > lb.scale_up_threshold,
            snapshot.load_factor < lb.scale_down_threshold,
        ),
        ScalingStrategy::Adaptive => (
            snapshot.load_factor > lb.scale_up_threshold
                || snapshot.queue_size > pool.saturating_mul(3),
            snapshot.load_factor < lb.scale_down_threshold || snapshot.active < pool / 3,
        ),
        ScalingStrategy::PriorityBased => (
            snapshot.urgent_queued > pool,
            snapshot.urgent_queued == 0 && snapshot.load_factor < 0.2,
        ),
    };

    let target = if up {
        (pool + lb.scale_up_step).min(max_threads)
    } else if down {
        pool.saturating_sub(lb.scale_down_step).max(min_threads)
    } else {
        return None;
    };
    (target != pool).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(active: usize, pool: usize, queue: usize, urgent: usize) -> LoadSnapshot {
        let inputs = UsageInputs {
            active,
            pool_size: pool,
            queue_size: queue,
        };
        LoadSnapshot {
            active,
            pool_size: pool,
            queue_size: queue,
            urgent_queued: urgent,
            load_factor: load_factor(&inputs),
        }
    }

    fn lb() -> LoadBalancingConfig {
        LoadBalancingConfig::default()
    }

    #[test]
    fn load_factor_combines_utilization_and_backlog() {
        assert_eq!(
            load_factor(&UsageInputs {
                active: 2,
                pool_size: 4,
                queue_size: 2
            }),
            0.75
        );
        // Saturates at 1.0.
        assert_eq!(
            load_factor(&UsageInputs {
                active: 4,
                pool_size: 4,
                queue_size: 100
            }),
            1.0
        );
        // Empty pool with backlog reads as fully loaded.
        assert_eq!(
            load_factor(&UsageInputs {
                active: 0,
                pool_size: 0,
                queue_size: 5
            }),
            1.0
        );
        assert_eq!(
            load_factor(&UsageInputs {
                active: 0,
                pool_size: 0,
                queue_size: 0
            }),
            0.0
        );
    }

    #[test]
    fn round_robin_never_scales() {
        let hot = snapshot(4, 4, 50, 10);
        assert!(scaling_decision(ScalingStrategy::RoundRobin, &hot, &lb(), 1, 16).is_none());
        let cold = snapshot(0, 8, 0, 0);
        assert!(scaling_decision(ScalingStrategy::RoundRobin, &cold, &lb(), 1, 16).is_none());
    }

    #[test]
    fn least_loaded_follows_thresholds() {
        let hot = snapshot(4, 4, 4, 0);
        assert_eq!(
            scaling_decision(ScalingStrategy::LeastLoaded, &hot, &lb(), 1, 16),
            Some(5)
        );
        let cold = snapshot(0, 8, 0, 0);
        assert_eq!(
            scaling_decision(ScalingStrategy::LeastLoaded, &cold, &lb(), 1, 16),
            Some(7)
        );
        let steady = snapshot(2, 4, 0, 0);
        assert!(scaling_decision(ScalingStrategy::LeastLoaded, &steady, &lb(), 1, 16).is_none());
    }

    #[test]
    fn adaptive_grows_on_backlog_even_when_load_is_moderate() {
        // 1/8 active keeps the load factor low, but the backlog is deep.
        let backlogged = snapshot(1, 8, 25, 0);
        assert!(backlogged.load_factor < lb().scale_up_threshold);
        assert_eq!(
            scaling_decision(ScalingStrategy::Adaptive, &backlogged, &lb(), 1, 16),
            Some(9)
        );
    }

    #[test]
    fn adaptive_shrinks_on_idle_workers() {
        let idle = snapshot(1, 9, 3, 0);
        assert_eq!(
            scaling_decision(ScalingStrategy::Adaptive, &idle, &lb(), 2, 16),
            Some(8)
        );
    }

    #[test]
    fn priority_based_tracks_urgent_backlog() {
        let urgent = snapshot(2, 4, 10, 6);
        assert_eq!(
            scaling_decision(ScalingStrategy::PriorityBased, &urgent, &lb(), 1, 16),
            Some(5)
        );
        let calm = snapshot(0, 6, 0, 0);
        assert_eq!(
            scaling_decision(ScalingStrategy::PriorityBased, &calm, &lb(), 2, 16),
            Some(5)
        );
        // Urgent work present but not beyond the pool: hold.
        let held = snapshot(3, 4, 4, 2);
        assert!(scaling_decision(ScalingStrategy::PriorityBased, &held, &lb(), 1, 16).is_none());
    }

    #[test]
    fn targets_are_clamped_to_bounds() {
        let hot = snapshot(4, 4, 40, 0);
        // Already at the ceiling: no action even though the trigger fires.
        assert!(scaling_decision(ScalingStrategy::Adaptive, &hot, &lb(), 1, 4).is_none());

        let cold = snapshot(0, 2, 0, 0);
        // Already at the floor.
        assert!(scaling_decision(ScalingStrategy::Adaptive, &cold, &lb(), 2, 16).is_none());
    }

    #[test]
    fn steps_larger_than_one_are_honored() {
        let mut config = lb();
        config.scale_up_step = 4;
        config.scale_down_step = 3;
        let hot = snapshot(4, 4, 0, 0);
        assert_eq!(
            scaling_decision(ScalingStrategy::LeastLoaded, &hot, &config, 1, 16),
            Some(8)
        );
        let cold = snapshot(0, 8, 0, 0);
        assert_eq!(
            scaling_decision(ScalingStrategy::LeastLoaded, &cold, &config, 2, 16),
            Some(5)
        );
    }
}
