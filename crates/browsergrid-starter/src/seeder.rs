//! Startup pool seeder.
//!
//! Launches the configured number of Chrome and Firefox workers once at
//! startup, capped by the container ceiling. Launches are staggered with a
//! random delay so they do not all hit the runtime at the same moment.

use std::time::Duration;

use browsergrid_core::{BrowserType, ProvisionConfig};
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::info;

use crate::provisioner::{ProvisionOutcome, ProvisionRequest};
use crate::tasks::ProvisionTasks;

/// Browser for each startup worker, Chrome first.
pub fn seed_plan(config: &ProvisionConfig) -> Vec<BrowserType> {
    (0..config.startup_containers())
        .map(|i| {
            if i < config.chrome_containers {
                BrowserType::Chrome
            } else {
                BrowserType::Firefox
            }
        })
        .collect()
}

/// Random start delay: between 1 and `count / 2` units, at least one.
pub fn startup_jitter(count: u32, unit: Duration) -> Duration {
    let units = rand::rng().random_range(1..=(count / 2).max(1));
    unit.saturating_mul(units)
}

/// Spawn one forced provisioning task per planned worker.
pub fn seed_pool(
    tasks: &ProvisionTasks,
    config: &ProvisionConfig,
) -> Vec<JoinHandle<ProvisionOutcome>> {
    let plan = seed_plan(config);
    let count = u32::try_from(plan.len()).unwrap_or(u32::MAX);
    info!(
        total = plan.len(),
        chrome = plan.iter().filter(|b| **b == BrowserType::Chrome).count(),
        "seeding worker pool"
    );

    plan.into_iter()
        .map(|browser| {
            let request = ProvisionRequest {
                browser,
                screen_size: config.screen_size,
                time_zone: config.time_zone,
                forced: true,
            };
            tasks.spawn_after(request, startup_jitter(count, config.sleep_interval))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chrome: u32, firefox: u32, max: u32) -> ProvisionConfig {
        ProvisionConfig {
            chrome_containers: chrome,
            firefox_containers: firefox,
            max_containers: max,
            ..ProvisionConfig::default()
        }
    }

    #[test]
    fn plan_splits_chrome_first() {
        use BrowserType::{Chrome, Firefox};
        assert_eq!(seed_plan(&config(2, 3, 10)), vec![Chrome, Chrome, Firefox, Firefox, Firefox]);
        assert_eq!(seed_plan(&config(0, 2, 10)), vec![Firefox, Firefox]);
    }

    #[test]
    fn plan_is_capped_by_ceiling() {
        let plan = seed_plan(&config(3, 3, 4));
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.iter().filter(|b| **b == BrowserType::Chrome).count(), 3);
        assert!(seed_plan(&config(0, 0, 10)).is_empty());
        assert!(seed_plan(&config(5, 5, 0)).is_empty());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let unit = Duration::from_millis(100);
        for _ in 0..100 {
            let jitter = startup_jitter(10, unit);
            assert!(jitter >= unit && jitter <= unit * 5, "{jitter:?}");
        }
        assert_eq!(startup_jitter(1, unit), unit);
        assert_eq!(startup_jitter(0, unit), unit);
        assert_eq!(startup_jitter(8, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn jitter_saturates_on_huge_interval() {
        let unit = Duration::from_millis(u64::MAX);
        let jitter = startup_jitter(10, unit);
        assert!(jitter >= unit);
        assert_eq!(startup_jitter(u32::MAX, Duration::MAX), Duration::MAX);
    }
}
