//! Provisioning configuration, resolved once from environment-style keys.
//!
//! Every value falls back to a documented default when it is unset,
//! malformed, or out of range. Resolution never fails.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::types::{ScreenSize, parse_time_zone};

pub const CHROME_CONTAINERS: &str = "BROWSERGRID_CHROME_CONTAINERS";
pub const FIREFOX_CONTAINERS: &str = "BROWSERGRID_FIREFOX_CONTAINERS";
pub const MAX_CONTAINERS: &str = "BROWSERGRID_MAX_CONTAINERS";
pub const SCREEN_WIDTH: &str = "BROWSERGRID_SCREEN_WIDTH";
pub const SCREEN_HEIGHT: &str = "BROWSERGRID_SCREEN_HEIGHT";
pub const TIME_ZONE: &str = "BROWSERGRID_TZ";
pub const CONTAINER_NAME: &str = "BROWSERGRID_CONTAINER_NAME";
pub const IMAGE: &str = "BROWSERGRID_IMAGE";
pub const SEND_ANONYMOUS_USAGE_INFO: &str = "BROWSERGRID_SEND_ANONYMOUS_USAGE_INFO";
pub const BUILD_URL: &str = "BUILD_URL";
pub const HUB_HOST: &str = "BROWSERGRID_HUB_HOST";
pub const HUB_PORT: &str = "BROWSERGRID_HUB_PORT";
pub const SLEEP_INTERVAL_MS: &str = "BROWSERGRID_SLEEP_INTERVAL_MS";
pub const MAX_PARALLEL_PROVISIONS: &str = "BROWSERGRID_MAX_PARALLEL_PROVISIONS";

pub const DEFAULT_CHROME_CONTAINERS: u32 = 0;
pub const DEFAULT_FIREFOX_CONTAINERS: u32 = 0;
pub const DEFAULT_MAX_CONTAINERS: u32 = 10;
pub const DEFAULT_SCREEN_SIZE: ScreenSize = ScreenSize::from_positive(1900, 1880);
pub const DEFAULT_TIME_ZONE: Tz = Tz::Europe__Berlin;
pub const DEFAULT_CONTAINER_NAME: &str = "browsergrid";
pub const DEFAULT_IMAGE: &str = "elgalu/selenium";
pub const DEFAULT_HUB_PORT: u16 = 4445;
pub const DEFAULT_SLEEP_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_PARALLEL_PROVISIONS: usize = 10;

/// Read access to raw configuration values.
///
/// The typed getters swallow malformed values and return the default.
pub trait ConfigSource: Send + Sync {
    /// Raw value for a key, if set.
    fn get_raw(&self, key: &str) -> Option<String>;

    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get_raw(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                debug!(%key, value = %raw, default, "not an integer, using default");
                default
            }),
            None => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get_raw(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_raw(key) {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    debug!(%key, value = %raw, default, "not a boolean, using default");
                    default
                }
            },
            None => default,
        }
    }
}

/// Configuration read from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get_raw(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory configuration, mainly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigSource for MapSource {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Process-wide provisioning settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionConfig {
    /// Chrome workers launched at startup.
    pub chrome_containers: u32,
    /// Firefox workers launched at startup.
    pub firefox_containers: u32,
    /// Ceiling on concurrently running worker containers.
    pub max_containers: u32,
    /// Screen size used when a request carries no valid override.
    pub screen_size: ScreenSize,
    /// Time zone used when a request carries no valid override.
    pub time_zone: Tz,
    /// Base name for created containers (`<base>_<port>`).
    pub container_name: String,
    /// Worker image name.
    pub image: String,
    pub send_anonymous_usage_info: bool,
    /// Build identifier handed to workers.
    pub build_url: String,
    /// Address workers register back to.
    pub hub_host: String,
    pub hub_port: u16,
    /// Base unit for readiness polling and startup jitter. Zero in tests.
    pub sleep_interval: Duration,
    /// Bound on provisioning tasks running at once.
    pub max_parallel_provisions: usize,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            chrome_containers: DEFAULT_CHROME_CONTAINERS,
            firefox_containers: DEFAULT_FIREFOX_CONTAINERS,
            max_containers: DEFAULT_MAX_CONTAINERS,
            screen_size: DEFAULT_SCREEN_SIZE,
            time_zone: DEFAULT_TIME_ZONE,
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            send_anonymous_usage_info: false,
            build_url: String::new(),
            hub_host: Ipv4Addr::LOCALHOST.to_string(),
            hub_port: DEFAULT_HUB_PORT,
            sleep_interval: Duration::from_millis(DEFAULT_SLEEP_INTERVAL_MS),
            max_parallel_provisions: DEFAULT_MAX_PARALLEL_PROVISIONS,
        }
    }
}

impl ProvisionConfig {
    /// Resolve every setting from a configuration source.
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let chrome_containers = non_negative(source, CHROME_CONTAINERS, DEFAULT_CHROME_CONTAINERS);
        let firefox_containers =
            non_negative(source, FIREFOX_CONTAINERS, DEFAULT_FIREFOX_CONTAINERS);
        let max_containers = match non_negative(source, MAX_CONTAINERS, DEFAULT_MAX_CONTAINERS) {
            0 => {
                debug!(
                    key = MAX_CONTAINERS,
                    default = DEFAULT_MAX_CONTAINERS,
                    "zero container ceiling, using default"
                );
                DEFAULT_MAX_CONTAINERS
            }
            max => max,
        };

        let width = source.get_int(SCREEN_WIDTH, DEFAULT_SCREEN_SIZE.width().into());
        let height = source.get_int(SCREEN_HEIGHT, DEFAULT_SCREEN_SIZE.height().into());
        let screen_size = ScreenSize::new(width, height).unwrap_or_else(|| {
            debug!(width, height, "configured screen size is not positive, using default");
            DEFAULT_SCREEN_SIZE
        });

        let zone_id = source.get_string(TIME_ZONE, DEFAULT_TIME_ZONE.name());
        let time_zone = parse_time_zone(&zone_id).unwrap_or_else(|| {
            warn!(zone = %zone_id, "not a real time zone, using default");
            DEFAULT_TIME_ZONE
        });

        let hub_host = source
            .get_raw(HUB_HOST)
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(detect_host_address);

        let hub_port = u16::try_from(source.get_int(HUB_PORT, DEFAULT_HUB_PORT.into()))
            .ok()
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_HUB_PORT);

        let sleep_ms = u64::try_from(
            source.get_int(SLEEP_INTERVAL_MS, DEFAULT_SLEEP_INTERVAL_MS as i64),
        )
        .unwrap_or(DEFAULT_SLEEP_INTERVAL_MS);

        let max_parallel_provisions = usize::try_from(source.get_int(
            MAX_PARALLEL_PROVISIONS,
            DEFAULT_MAX_PARALLEL_PROVISIONS as i64,
        ))
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_PARALLEL_PROVISIONS);

        Self {
            chrome_containers,
            firefox_containers,
            max_containers,
            screen_size,
            time_zone,
            container_name: source.get_string(CONTAINER_NAME, DEFAULT_CONTAINER_NAME),
            image: source.get_string(IMAGE, DEFAULT_IMAGE),
            send_anonymous_usage_info: source.get_bool(SEND_ANONYMOUS_USAGE_INFO, false),
            build_url: source.get_string(BUILD_URL, ""),
            hub_host,
            hub_port,
            sleep_interval: Duration::from_millis(sleep_ms),
            max_parallel_provisions,
        }
    }

    /// Resolve from the process environment.
    pub fn from_env() -> Self {
        Self::from_source(&EnvSource)
    }

    /// Number of workers the startup seeder launches.
    pub fn startup_containers(&self) -> u32 {
        self.chrome_containers
            .saturating_add(self.firefox_containers)
            .min(self.max_containers)
    }
}

fn non_negative(source: &dyn ConfigSource, key: &str, default: u32) -> u32 {
    let value = source.get_int(key, default.into());
    u32::try_from(value).unwrap_or_else(|_| {
        debug!(%key, value, default, "negative count, using default");
        default
    })
}

/// First non-loopback IPv4 address of this machine.
///
/// Connecting a UDP socket sends no packets; it only selects the route.
fn detect_host_address() -> String {
    let detected = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
            socket.local_addr()
        })
        .ok()
        .map(|addr| addr.ip())
        .filter(|ip| matches!(ip, IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified()));

    match detected {
        Some(ip) => ip.to_string(),
        None => {
            debug!("no routable IPv4 address found, workers will register to localhost");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}
