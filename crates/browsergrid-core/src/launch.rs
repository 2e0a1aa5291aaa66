//! Worker launch specs — everything needed to start one worker container.

use std::collections::HashMap;
use std::time::Duration;

use chrono_tz::Tz;
use rand::Rng;

use crate::config::ProvisionConfig;
use crate::types::{BrowserType, ScreenSize};

/// Offset from the service port to the browser-viewer (noVNC) port.
pub const VIEWER_PORT_GAP: u16 = 10_000;
/// Offset from the service port to the VNC port.
pub const VNC_PORT_GAP: u16 = 20_000;

/// Proxy implementation a worker registers itself as.
pub const WORKER_PROXY_CLASS: &str = "de.zalando.ep.zalenium.proxy.DockerSeleniumRemoteProxy";

/// Placeholder the worker image substitutes with its own address.
const CONTAINER_IP_PLACEHOLDER: &str = "{{CONTAINER_IP}}";

/// The three ports one worker occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortTriple {
    pub service: u16,
    pub viewer: u16,
    pub vnc: u16,
}

impl PortTriple {
    /// Derive the triple for a service port, if all three fit in `u16`.
    pub fn for_service(service: u16) -> Option<Self> {
        Some(Self {
            service,
            viewer: service.checked_add(VIEWER_PORT_GAP)?,
            vnc: service.checked_add(VNC_PORT_GAP)?,
        })
    }

    pub fn ports(&self) -> [u16; 3] {
        [self.service, self.viewer, self.vnc]
    }
}

/// Parameters for one provisioning attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerLaunchSpec {
    pub browser: BrowserType,
    pub screen_size: ScreenSize,
    pub time_zone: Tz,
    pub hub_host: String,
    pub hub_port: u16,
    pub ports: PortTriple,
    /// How often the started worker polls the hub.
    pub node_polling: Duration,
    pub send_anonymous_usage_info: bool,
    pub build_url: String,
}

impl WorkerLaunchSpec {
    /// Build a spec from configuration and a leased port triple.
    pub fn new(
        config: &ProvisionConfig,
        browser: BrowserType,
        screen_size: ScreenSize,
        time_zone: Tz,
        ports: PortTriple,
    ) -> Self {
        Self {
            browser,
            screen_size,
            time_zone,
            hub_host: config.hub_host.clone(),
            hub_port: config.hub_port,
            ports,
            node_polling: random_node_polling(),
            send_anonymous_usage_info: config.send_anonymous_usage_info,
            build_url: config.build_url.clone(),
        }
    }

    /// Container name for this attempt: `<base>_<service port>`.
    pub fn container_name(&self, base: &str) -> String {
        format!("{base}_{}", self.ports.service)
    }

    /// Environment handed to the worker image.
    pub fn env_vars(&self) -> HashMap<String, String> {
        let service_port = self.ports.service.to_string();
        let mut env: HashMap<String, String> = [
            ("ZALENIUM", "true".to_string()),
            ("SELENIUM_HUB_HOST", self.hub_host.clone()),
            ("SELENIUM_HUB_PORT", self.hub_port.to_string()),
            ("SELENIUM_NODE_HOST", CONTAINER_IP_PLACEHOLDER.to_string()),
            ("GRID", "false".to_string()),
            ("WAIT_TIMEOUT", "120s".to_string()),
            ("PICK_ALL_RANDOM_PORTS", "false".to_string()),
            ("VIDEO_STOP_SLEEP_SECS", "1".to_string()),
            ("WAIT_TIME_OUT_VIDEO_STOP", "20s".to_string()),
            ("SEND_ANONYMOUS_USAGE_INFO", self.send_anonymous_usage_info.to_string()),
            ("BUILD_URL", self.build_url.clone()),
            ("NOVNC", "true".to_string()),
            ("NOVNC_PORT", self.ports.viewer.to_string()),
            ("VNC_PORT", self.ports.vnc.to_string()),
            ("SCREEN_WIDTH", self.screen_size.width().to_string()),
            ("SCREEN_HEIGHT", self.screen_size.height().to_string()),
            ("TZ", self.time_zone.name().to_string()),
            ("SELENIUM_NODE_REGISTER_CYCLE", "0".to_string()),
            ("SEL_NODEPOLLING_MS", self.node_polling.as_millis().to_string()),
            ("SELENIUM_NODE_PROXY_PARAMS", WORKER_PROXY_CLASS.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let is_chrome = self.browser == BrowserType::Chrome;
        env.insert("CHROME".to_string(), is_chrome.to_string());
        env.insert("FIREFOX".to_string(), (!is_chrome).to_string());
        let port_key = match self.browser {
            BrowserType::Chrome => "SELENIUM_NODE_CH_PORT",
            BrowserType::Firefox => "SELENIUM_NODE_FF_PORT",
        };
        env.insert(port_key.to_string(), service_port);
        env
    }
}

/// Hub polling interval for a new worker: 90 to 119 seconds, whole seconds.
pub fn random_node_polling() -> Duration {
    Duration::from_secs(rand::rng().random_range(90..120))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(browser: BrowserType) -> WorkerLaunchSpec {
        let config = ProvisionConfig {
            hub_host: "10.1.2.3".to_string(),
            build_url: "ci-42".to_string(),
            ..ProvisionConfig::default()
        };
        WorkerLaunchSpec::new(
            &config,
            browser,
            ScreenSize::new(1280, 760).unwrap(),
            "America/Montreal".parse().unwrap(),
            PortTriple::for_service(40000).unwrap(),
        )
    }

    #[test]
    fn triple_offsets() {
        let triple = PortTriple::for_service(40000).unwrap();
        assert_eq!(triple.ports(), [40000, 50000, 60000]);
    }

    #[test]
    fn triple_rejects_overflow() {
        assert!(PortTriple::for_service(50000).is_none());
        assert!(PortTriple::for_service(u16::MAX).is_none());
    }

    #[test]
    fn container_name_carries_port() {
        assert_eq!(spec(BrowserType::Chrome).container_name("grid"), "grid_40000");
    }

    #[test]
    fn chrome_env() {
        let env = spec(BrowserType::Chrome).env_vars();
        assert_eq!(env["CHROME"], "true");
        assert_eq!(env["FIREFOX"], "false");
        assert_eq!(env["SELENIUM_NODE_CH_PORT"], "40000");
        assert!(!env.contains_key("SELENIUM_NODE_FF_PORT"));
        assert_eq!(env["NOVNC_PORT"], "50000");
        assert_eq!(env["VNC_PORT"], "60000");
        assert_eq!(env["SCREEN_WIDTH"], "1280");
        assert_eq!(env["SCREEN_HEIGHT"], "760");
        assert_eq!(env["TZ"], "America/Montreal");
        assert_eq!(env["SELENIUM_HUB_HOST"], "10.1.2.3");
        assert_eq!(env["SELENIUM_HUB_PORT"], "4445");
        assert_eq!(env["BUILD_URL"], "ci-42");
        assert_eq!(env["SELENIUM_NODE_PROXY_PARAMS"], WORKER_PROXY_CLASS);
    }

    #[test]
    fn firefox_env() {
        let env = spec(BrowserType::Firefox).env_vars();
        assert_eq!(env["CHROME"], "false");
        assert_eq!(env["FIREFOX"], "true");
        assert_eq!(env["SELENIUM_NODE_FF_PORT"], "40000");
    }

    #[test]
    fn node_polling_in_range() {
        for _ in 0..50 {
            let ms: u64 = spec(BrowserType::Chrome).env_vars()["SEL_NODEPOLLING_MS"]
                .parse()
                .unwrap();
            assert!((90_000..120_000).contains(&ms));
            assert_eq!(ms % 1000, 0);
        }
    }
}
