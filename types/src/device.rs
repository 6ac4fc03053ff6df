//! Device classification for the completing device.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User-agent fragments that identify a phone or tablet.
const MOBILE_MARKERS: &[&str] = &[
    "mobile",
    "android",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "windows phone",
    "iemobile",
    "opera mini",
];

/// Broad class of the device presenting a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    Mobile,
    Desktop,
    /// No user agent was presented.
    Unknown,
}

impl DeviceClass {
    /// Classify a device from its `User-Agent` header.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        match user_agent.map(str::trim) {
            None | Some("") => Self::Unknown,
            Some(ua) => {
                let ua = ua.to_ascii_lowercase();
                if MOBILE_MARKERS.iter().any(|marker| ua.contains(marker)) {
                    Self::Mobile
                } else {
                    Self::Desktop
                }
            }
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Mobile)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mobile => f.write_str("mobile"),
            Self::Desktop => f.write_str("desktop"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
