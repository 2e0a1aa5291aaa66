//! Advertised capability catalog.
//!
//! The starter advertises one capability per browser the worker image
//! ships. Versions come from image labels and are looked up once.

use std::sync::{PoisonError, RwLock};

use browsergrid_core::capability::{BROWSER_NAME, MAX_INSTANCES, PLATFORM_KEYS, VERSION};
use browsergrid_core::{BrowserType, CapabilityRequest, WORKER_PLATFORM};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::runtime::ContainerRuntime;

/// Sessions one worker container serves before it is recycled.
pub const WORKER_MAX_INSTANCES: u32 = 1;

/// A browser/platform combination the starter can provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisedCapability {
    pub browser_name: BrowserType,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub max_instances: u32,
}

impl AdvertisedCapability {
    pub fn new(browser: BrowserType, version: Option<String>) -> Self {
        Self {
            browser_name: browser,
            platform: WORKER_PLATFORM.to_string(),
            version,
            max_instances: WORKER_MAX_INSTANCES,
        }
    }

    /// The capability as a request-shaped map, for hub registration.
    pub fn to_request(&self) -> CapabilityRequest {
        let mut request = CapabilityRequest::new()
            .with(BROWSER_NAME, self.browser_name.as_str())
            .with(PLATFORM_KEYS[0], self.platform.as_str())
            .with(MAX_INSTANCES, self.max_instances);
        if let Some(version) = &self.version {
            request.insert(VERSION, version.as_str());
        }
        request
    }
}

/// Process-scoped catalog of advertised capabilities.
#[derive(Debug)]
pub struct CapabilityCatalog {
    capabilities: RwLock<Vec<AdvertisedCapability>>,
    latest_image: OnceCell<String>,
}

impl CapabilityCatalog {
    /// A catalog advertising every browser without a version.
    pub fn new() -> Self {
        Self {
            capabilities: RwLock::new(
                BrowserType::ALL
                    .iter()
                    .map(|b| AdvertisedCapability::new(*b, None))
                    .collect(),
            ),
            latest_image: OnceCell::new(),
        }
    }

    /// Look up browser versions from the newest local image.
    ///
    /// Lookup failures keep the unversioned entries. Only the first
    /// successful image resolution is kept.
    pub async fn load(
        &self,
        runtime: &dyn ContainerRuntime,
        image: &str,
    ) -> Vec<AdvertisedCapability> {
        let latest = self
            .latest_image
            .get_or_try_init(|| runtime.latest_downloaded_image(image))
            .await;
        let latest = match latest {
            Ok(latest) => latest.clone(),
            Err(e) => {
                warn!(
                    %image,
                    error = %e,
                    "could not resolve latest image, advertising unversioned browsers"
                );
                return self.snapshot();
            }
        };

        let mut loaded = Vec::with_capacity(BrowserType::ALL.len());
        for browser in BrowserType::ALL {
            let version = match runtime.label_value(&latest, browser.version_label()).await {
                Ok(version) => version.filter(|v| !v.trim().is_empty()),
                Err(e) => {
                    debug!(%browser, image = %latest, error = %e, "version label lookup failed");
                    None
                }
            };
            loaded.push(AdvertisedCapability::new(browser, version));
        }

        info!(image = %latest, capabilities = loaded.len(), "capability catalog loaded");
        *self.capabilities.write().unwrap_or_else(PoisonError::into_inner) = loaded.clone();
        loaded
    }

    pub fn snapshot(&self) -> Vec<AdvertisedCapability> {
        self.capabilities.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Image the versions were read from, once resolved.
    pub fn latest_image(&self) -> Option<&str> {
        self.latest_image.get().map(String::as_str)
    }
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        Self::new()
    }
}
