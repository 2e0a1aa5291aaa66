//! Admission — decide whether a capability request leads to a new worker.
//!
//! Runs in three steps, all pure:
//!
//! 1. Gate: only Chrome or Firefox on Linux (or any platform) is accepted,
//!    and a requested version must match the advertised one.
//! 2. Normalization: screen size and time zone overrides are validated and
//!    the effective values are written back to the request.
//! 3. Dedup: the same request is offered again and again while it waits for
//!    a node. A per-browser marker on the request counts those offers so
//!    only the first one, and every 30th one after it, launches a worker.
//!
//! The request itself is never touched here. Writes are collected in a
//! [`RequestPatch`] that the caller applies.

use browsergrid_core::capability::{
    SCREEN_RESOLUTION, SCREEN_RESOLUTION_KEYS, TIME_ZONE, dedup_marker_key,
};
use browsergrid_core::{
    BrowserType, CapabilityRequest, ProvisionConfig, RequestPatch, ScreenSize, Tz, parse_time_zone,
    platform_supported,
};
use tracing::debug;

use crate::catalog::AdvertisedCapability;
use crate::provisioner::ProvisionRequest;

/// Offers of the same request after which a forced relaunch happens.
pub const ESCALATION_THRESHOLD: u32 = 30;

/// Why a request was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No browser name in the request.
    MissingBrowser,
    /// Browser, platform, or version this starter cannot serve.
    Unsupported,
}

/// What admission decided for one offer of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    Rejected(Rejection),
    /// First sighting of the request. Subject to the capacity guard.
    Launch(ProvisionRequest),
    /// A launch for this request is already underway.
    Waiting { offers: u32 },
    /// The request waited too long. Launches regardless of capacity.
    Relaunch(ProvisionRequest),
}

impl AdmissionOutcome {
    /// The worker to provision, if any.
    pub fn provision_request(&self) -> Option<&ProvisionRequest> {
        match self {
            AdmissionOutcome::Launch(req) | AdmissionOutcome::Relaunch(req) => Some(req),
            AdmissionOutcome::Rejected(_) | AdmissionOutcome::Waiting { .. } => None,
        }
    }
}

/// Outcome plus the writes the caller must apply to its request.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    pub outcome: AdmissionOutcome,
    pub patch: RequestPatch,
}

/// Gate a request against the advertised capabilities.
pub fn admit(
    request: &CapabilityRequest,
    catalog: &[AdvertisedCapability],
) -> Result<BrowserType, Rejection> {
    let Some(name) = request.browser_name() else {
        return Err(Rejection::MissingBrowser);
    };
    let browser = BrowserType::from_name(&name).ok_or(Rejection::Unsupported)?;

    if !platform_supported(request.platform().as_deref()) {
        return Err(Rejection::Unsupported);
    }

    let advertised = catalog
        .iter()
        .find(|c| c.browser_name == browser)
        .ok_or(Rejection::Unsupported)?;
    if !version_matches(request.version().as_deref(), advertised.version.as_deref()) {
        return Err(Rejection::Unsupported);
    }

    Ok(browser)
}

fn version_matches(requested: Option<&str>, advertised: Option<&str>) -> bool {
    match (requested.map(str::trim), advertised) {
        (None | Some("") | Some("latest"), _) => true,
        (Some(_), None) => true,
        (Some(requested), Some(advertised)) => requested == advertised.trim(),
    }
}

/// Run the full admission pipeline for one offer of a request.
pub fn evaluate(
    request: &CapabilityRequest,
    config: &ProvisionConfig,
    catalog: &[AdvertisedCapability],
) -> AdmissionDecision {
    let mut patch = RequestPatch::new();

    let browser = match admit(request, catalog) {
        Ok(browser) => browser,
        Err(rejection) => {
            debug!(?rejection, capabilities = ?request.as_map(), "request cannot be served here");
            return AdmissionDecision {
                outcome: AdmissionOutcome::Rejected(rejection),
                patch,
            };
        }
    };

    let screen_size = effective_screen_size(request, config.screen_size, &mut patch);
    let time_zone = effective_time_zone(request, config.time_zone, &mut patch);

    let marker = dedup_marker_key(browser);
    let outcome = match request.dedup_marker(browser) {
        None => {
            patch.set(marker, 1);
            AdmissionOutcome::Launch(ProvisionRequest {
                browser,
                screen_size,
                time_zone,
                forced: false,
            })
        }
        Some(offers) if offers >= ESCALATION_THRESHOLD => {
            patch.set(marker, 1);
            AdmissionOutcome::Relaunch(ProvisionRequest {
                browser,
                screen_size,
                time_zone,
                forced: true,
            })
        }
        Some(offers) => {
            let offers = offers + 1;
            patch.set(marker, offers);
            AdmissionOutcome::Waiting { offers }
        }
    };

    AdmissionDecision { outcome, patch }
}

/// Screen size for the worker; always written back as `screenResolution`.
///
/// When several resolution keys are present the last one in
/// [`SCREEN_RESOLUTION_KEYS`] order decides. An invalid value falls back to
/// the default, it does not defer to an earlier key.
fn effective_screen_size(
    request: &CapabilityRequest,
    default: ScreenSize,
    patch: &mut RequestPatch,
) -> ScreenSize {
    let requested = SCREEN_RESOLUTION_KEYS
        .iter()
        .rev()
        .find(|key| request.contains(key))
        .map(|key| (*key, request.text(key)));

    let size = match requested {
        None => default,
        Some((key, Some(raw))) => raw.parse::<ScreenSize>().unwrap_or_else(|e| {
            debug!(%key, error = %e, fallback = %default, "ignoring screen resolution override");
            default
        }),
        Some((key, None)) => {
            debug!(%key, fallback = %default, "screen resolution override is not text");
            default
        }
    };

    patch.set(SCREEN_RESOLUTION, size.to_string());
    size
}

/// Time zone for the worker; always written back as `tz`.
fn effective_time_zone(request: &CapabilityRequest, default: Tz, patch: &mut RequestPatch) -> Tz {
    let time_zone = match request.text(TIME_ZONE) {
        None => default,
        Some(raw) => parse_time_zone(&raw).unwrap_or_else(|| {
            debug!(zone = %raw, fallback = %default.name(), "ignoring unknown time zone");
            default
        }),
    };

    patch.set(TIME_ZONE, time_zone.name());
    time_zone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CapabilityCatalog;
    use serde_json::Value;

    fn catalog() -> Vec<AdvertisedCapability> {
        CapabilityCatalog::new().snapshot()
    }

    fn chrome() -> CapabilityRequest {
        CapabilityRequest::new().with("browserName", "chrome").with("platform", "LINUX")
    }

    fn decide(request: &CapabilityRequest) -> AdmissionDecision {
        evaluate(request, &ProvisionConfig::default(), &catalog())
    }

    #[test]
    fn gate_accepts_known_browsers_on_linux_or_any() {
        let catalog = catalog();
        let firefox_any = CapabilityRequest::new()
            .with("browserName", "firefox")
            .with("platform", "ANY");
        let chrome_no_platform = CapabilityRequest::new().with("browserName", "CHROME");
        assert_eq!(admit(&chrome(), &catalog), Ok(BrowserType::Chrome));
        assert_eq!(admit(&firefox_any, &catalog), Ok(BrowserType::Firefox));
        assert_eq!(admit(&chrome_no_platform, &catalog), Ok(BrowserType::Chrome));
    }

    #[test]
    fn gate_rejects_other_combinations() {
        let catalog = catalog();
        let cases = [
            ("chrome", "WINDOWS"),
            ("firefox", "MAC"),
            ("safari", "MAC"),
            ("MicrosoftEdge", "WIN10"),
            ("internet explorer", "WIN8"),
        ];
        for (browser, platform) in cases {
            let request = CapabilityRequest::new()
                .with("browserName", browser)
                .with("platform", platform);
            assert_eq!(
                admit(&request, &catalog),
                Err(Rejection::Unsupported),
                "{browser} on {platform}"
            );
        }
        assert_eq!(
            admit(&CapabilityRequest::new().with("platform", "LINUX"), &catalog),
            Err(Rejection::MissingBrowser)
        );
    }

    #[test]
    fn gate_checks_version_only_when_advertised() {
        let versioned = vec![AdvertisedCapability::new(
            BrowserType::Chrome,
            Some("69.0".to_string()),
        )];
        assert!(admit(&chrome().with("version", "69.0"), &versioned).is_ok());
        assert!(admit(&chrome().with("version", "latest"), &versioned).is_ok());
        assert_eq!(admit(&chrome().with("version", "41"), &versioned), Err(Rejection::Unsupported));
        assert!(admit(&chrome().with("version", "41"), &catalog()).is_ok());
    }

    #[test]
    fn rejected_requests_get_no_writes() {
        let decision = decide(&CapabilityRequest::new().with("browserName", "safari"));
        assert_eq!(decision.outcome, AdmissionOutcome::Rejected(Rejection::Unsupported));
        assert!(decision.patch.is_empty());
    }

    #[test]
    fn first_sighting_launches_with_defaults() {
        let decision = decide(&chrome());
        let AdmissionOutcome::Launch(req) = &decision.outcome else {
            panic!("expected a launch, got {:?}", decision.outcome);
        };
        assert!(!req.forced);
        assert_eq!(req.browser, BrowserType::Chrome);
        assert_eq!(req.screen_size.to_string(), "1900x1880");
        assert_eq!(req.time_zone.name(), "Europe/Berlin");

        assert_eq!(decision.patch.get("waitingFor_CHROME_Node"), Some(&Value::from(1)));
        assert_eq!(decision.patch.get("screenResolution"), Some(&Value::from("1900x1880")));
        assert_eq!(decision.patch.get("tz"), Some(&Value::from("Europe/Berlin")));
    }

    #[test]
    fn repeat_offers_only_count() {
        let decision = decide(&chrome().with("waitingFor_CHROME_Node", 5));
        assert_eq!(decision.outcome, AdmissionOutcome::Waiting { offers: 6 });
        assert!(decision.outcome.provision_request().is_none());
        assert_eq!(decision.patch.get("waitingFor_CHROME_Node"), Some(&Value::from(6)));
    }

    #[test]
    fn threshold_forces_a_relaunch_and_resets() {
        for offers in [30, 31, 100] {
            let decision = decide(&chrome().with("waitingFor_CHROME_Node", offers));
            let Some(req) = decision.outcome.provision_request() else {
                panic!("expected a relaunch at {offers}");
            };
            assert!(req.forced);
            assert_eq!(decision.patch.get("waitingFor_CHROME_Node"), Some(&Value::from(1)));
        }
        assert_eq!(
            decide(&chrome().with("waitingFor_CHROME_Node", 29)).outcome,
            AdmissionOutcome::Waiting { offers: 30 }
        );
    }

    #[test]
    fn marker_of_other_browser_is_ignored() {
        let decision = decide(&chrome().with("waitingFor_FIREFOX_Node", 12));
        assert!(matches!(decision.outcome, AdmissionOutcome::Launch(_)));
    }

    #[test]
    fn malformed_marker_is_a_first_sighting() {
        let decision = decide(&chrome().with("waitingFor_CHROME_Node", "later"));
        assert!(matches!(decision.outcome, AdmissionOutcome::Launch(_)));
        assert_eq!(decision.patch.get("waitingFor_CHROME_Node"), Some(&Value::from(1)));
    }

    #[test]
    fn valid_resolution_override_is_used() {
        for key in ["screenResolution", "resolution", "screen-resolution"] {
            let decision = decide(&chrome().with(key, "1280x760"));
            let req = decision.outcome.provision_request().unwrap();
            assert_eq!(req.screen_size.to_string(), "1280x760", "{key}");
            assert_eq!(decision.patch.get("screenResolution"), Some(&Value::from("1280x760")));
        }
    }

    #[test]
    fn invalid_resolution_falls_back_to_default() {
        for raw in ["-1300x800", "0x600", "wide", "1280", "1280x"] {
            let decision = decide(&chrome().with("screenResolution", raw));
            let req = decision.outcome.provision_request().unwrap();
            assert_eq!(req.screen_size.to_string(), "1900x1880", "{raw}");
            assert_eq!(decision.patch.get("screenResolution"), Some(&Value::from("1900x1880")));
        }
    }

    #[test]
    fn last_present_resolution_key_wins() {
        let request = chrome()
            .with("screenResolution", "800x600")
            .with("screen-resolution", "1024x768");
        let decision = decide(&request);
        let req = decision.outcome.provision_request().unwrap();
        assert_eq!(req.screen_size.to_string(), "1024x768");
        assert_eq!(decision.patch.get("screenResolution"), Some(&Value::from("1024x768")));

        let request = chrome().with("resolution", "1024x768").with("screen-resolution", "bogus");
        let req = decide(&request).outcome.provision_request().cloned().unwrap();
        assert_eq!(req.screen_size.to_string(), "1900x1880");
    }

    #[test]
    fn time_zone_override() {
        let decision = decide(&chrome().with("tz", "America/Montreal"));
        let req = decision.outcome.provision_request().unwrap();
        assert_eq!(req.time_zone.name(), "America/Montreal");
        assert_eq!(decision.patch.get("tz"), Some(&Value::from("America/Montreal")));

        let decision = decide(&chrome().with("tz", "Mars/Olympus"));
        let req = decision.outcome.provision_request().unwrap();
        assert_eq!(req.time_zone.name(), "Europe/Berlin");
        assert_eq!(decision.patch.get("tz"), Some(&Value::from("Europe/Berlin")));
    }

    #[test]
    fn waiting_requests_are_still_normalized() {
        let decision = decide(&chrome().with("waitingFor_CHROME_Node", 3).with("tz", "Nowhere"));
        assert_eq!(decision.patch.get("tz"), Some(&Value::from("Europe/Berlin")));
        assert_eq!(decision.patch.get("screenResolution"), Some(&Value::from("1900x1880")));
    }
}
