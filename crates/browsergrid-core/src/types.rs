//! Shared types used across BrowserGrid crates.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Browser families a worker container can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Chrome,
    Firefox,
}

impl BrowserType {
    /// All browsers the worker image ships, in advertisement order.
    pub const ALL: [BrowserType; 2] = [BrowserType::Firefox, BrowserType::Chrome];

    /// Match a requested browser name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("chrome") {
            Some(BrowserType::Chrome)
        } else if name.eq_ignore_ascii_case("firefox") {
            Some(BrowserType::Firefox)
        } else {
            None
        }
    }

    /// Canonical lowercase name, as used in capability requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "chrome",
            BrowserType::Firefox => "firefox",
        }
    }

    /// Image label carrying the bundled browser version.
    pub fn version_label(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "selenium_chrome_version",
            BrowserType::Firefox => "selenium_firefox_version",
        }
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform advertised by every worker container.
pub const WORKER_PLATFORM: &str = "LINUX";

/// Whether a requested platform can be served by a worker container.
///
/// An absent platform and the `ANY` wildcard are both accepted.
pub fn platform_supported(platform: Option<&str>) -> bool {
    match platform.map(str::trim) {
        None | Some("") => true,
        Some(p) => p.eq_ignore_ascii_case("ANY") || p.eq_ignore_ascii_case(WORKER_PLATFORM),
    }
}

// ── Screen size ────────────────────────────────────────────────────

/// Screen dimensions in pixels. Both sides are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSize {
    width: u32,
    height: u32,
}

/// Why a `WIDTHxHEIGHT` string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("resolution '{0}' is not of the form WIDTHxHEIGHT")]
    Malformed(String),

    #[error("resolution '{0}' has a non-positive side")]
    NonPositive(String),
}

impl ScreenSize {
    /// Build a screen size, rejecting zero or negative sides.
    pub fn new(width: i64, height: i64) -> Option<Self> {
        if width <= 0 || height <= 0 {
            return None;
        }
        Some(Self {
            width: u32::try_from(width).ok()?,
            height: u32::try_from(height).ok()?,
        })
    }

    /// Caller guarantees both sides are positive.
    pub(crate) const fn from_positive(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl FromStr for ScreenSize {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ResolutionError::Malformed(s.to_string());
        // Only the first two fields count: `1280x760x2` is 1280x760.
        let mut sides = s.trim().split('x');
        let (Some(w), Some(h)) = (sides.next(), sides.next()) else {
            return Err(malformed());
        };
        let width: i64 = w.trim().parse().map_err(|_| malformed())?;
        let height: i64 = h.trim().parse().map_err(|_| malformed())?;
        ScreenSize::new(width, height).ok_or_else(|| ResolutionError::NonPositive(s.to_string()))
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── Time zones ─────────────────────────────────────────────────────

/// Look up an IANA zone id such as `America/Montreal`.
pub fn parse_time_zone(id: &str) -> Option<Tz> {
    id.trim().parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_names_match_case_insensitively() {
        assert_eq!(BrowserType::from_name("chrome"), Some(BrowserType::Chrome));
        assert_eq!(BrowserType::from_name("FireFox"), Some(BrowserType::Firefox));
        assert_eq!(BrowserType::from_name("safari"), None);
        assert_eq!(BrowserType::from_name(""), None);
    }

    #[test]
    fn platform_wildcards() {
        assert!(platform_supported(None));
        assert!(platform_supported(Some("ANY")));
        assert!(platform_supported(Some("linux")));
        assert!(!platform_supported(Some("WINDOWS")));
        assert!(!platform_supported(Some("MAC")));
    }

    #[test]
    fn parse_valid_resolution() {
        let size: ScreenSize = "1280x760".parse().unwrap();
        assert_eq!((size.width(), size.height()), (1280, 760));
        assert_eq!(size.to_string(), "1280x760");
    }

    #[test]
    fn negative_resolution_rejected() {
        assert_eq!(
            "-1300x800".parse::<ScreenSize>(),
            Err(ResolutionError::NonPositive("-1300x800".to_string()))
        );
        assert!(matches!(
            "0x800".parse::<ScreenSize>(),
            Err(ResolutionError::NonPositive(_))
        ));
    }

    #[test]
    fn garbage_resolution_rejected() {
        assert!(matches!(
            "notAValidScreenResolution".parse::<ScreenSize>(),
            Err(ResolutionError::Malformed(_))
        ));
        assert!(matches!(
            "1280x".parse::<ScreenSize>(),
            Err(ResolutionError::Malformed(_))
        ));
        assert!(matches!(
            "x760".parse::<ScreenSize>(),
            Err(ResolutionError::Malformed(_))
        ));
    }

    #[test]
    fn trailing_fields_are_ignored() {
        let size: ScreenSize = "1280x760x2".parse().unwrap();
        assert_eq!(size.to_string(), "1280x760");
        assert!(matches!(
            "1280x-1x2".parse::<ScreenSize>(),
            Err(ResolutionError::NonPositive(_))
        ));
    }

    #[test]
    fn time_zone_lookup() {
        assert_eq!(
            parse_time_zone("America/Montreal").map(|tz| tz.name()),
            Some("America/Montreal")
        );
        assert_eq!(parse_time_zone("ABC_NON_STANDARD_TIME_ZONE"), None);
    }
}
