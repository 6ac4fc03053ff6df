//! Handoff locators: the URL and QR code that carry a session to the
//! completing device.

use std::fmt;

use qrcode::render::svg;
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};

use kyc_types::{KycSession, SessionId, Timestamp};

use crate::SessionError;

/// Path segment under the origin at which the completing device opens a session.
pub const HANDOFF_PATH: &str = "/mobile-kyc/";

/// Type tag carried in the QR payload description.
pub const HANDOFF_KIND: &str = "MOBILE_KYC_VERIFICATION";

pub const HANDOFF_INSTRUCTIONS: &str =
    "Scan this QR code with your mobile phone to complete KYC verification";

/// Smallest edge, in pixels, of a rendered SVG code.
const MIN_SVG_DIMENSION: u32 = 200;

/// Builds locators under one origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandoffIssuer {
    base_origin: String,
}

impl HandoffIssuer {
    /// `base_origin` must be an absolute `http` or `https` origin. Trailing
    /// slashes are dropped.
    pub fn new(base_origin: &str) -> Result<Self, SessionError> {
        let origin = base_origin.trim().trim_end_matches('/');
        let rest = origin
            .strip_prefix("https://")
            .or_else(|| origin.strip_prefix("http://"))
            .ok_or_else(|| {
                SessionError::InvalidLocator(format!("origin must be http(s): {base_origin}"))
            })?;
        if rest.is_empty()
            || rest
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '?' | '#'))
        {
            return Err(SessionError::InvalidLocator(format!(
                "not a usable origin: {base_origin}"
            )));
        }
        Ok(Self {
            base_origin: origin.to_string(),
        })
    }

    pub fn base_origin(&self) -> &str {
        &self.base_origin
    }

    /// The locator URL for `session_id`. Pure function of origin and id.
    pub fn url_for(&self, session_id: &SessionId) -> String {
        format!("{}{HANDOFF_PATH}{session_id}", self.base_origin)
    }

    pub fn issue(&self, session: &KycSession) -> Result<Locator, SessionError> {
        let url = self.url_for(&session.session_id);
        let qr = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::M)
            .map_err(|e| SessionError::InvalidLocator(e.to_string()))?;
        Ok(Locator {
            session_id: session.session_id.clone(),
            url,
            expires_at: session.expires_at,
            qr,
        })
    }

    /// Recover the session id from a locator URL issued under this origin.
    pub fn session_id_from_url(&self, url: &str) -> Result<SessionId, SessionError> {
        let raw = url
            .trim()
            .strip_prefix(self.base_origin.as_str())
            .and_then(|rest| rest.strip_prefix(HANDOFF_PATH))
            .ok_or_else(|| SessionError::InvalidLocator(format!("not a handoff URL: {url}")))?;
        let raw = raw.trim_end_matches('/');
        if raw.contains(['/', '?', '#']) {
            return Err(SessionError::InvalidLocator(format!(
                "unexpected path after session id: {url}"
            )));
        }
        SessionId::parse(raw).map_err(|e| SessionError::InvalidLocator(e.to_string()))
    }
}

/// A session rendered for handoff.
pub struct Locator {
    pub session_id: SessionId,
    pub url: String,
    pub expires_at: Timestamp,
    qr: QrCode,
}

impl Locator {
    /// SVG markup for browsers.
    pub fn qr_svg(&self) -> String {
        self.qr
            .render::<svg::Color<'_>>()
            .min_dimensions(MIN_SVG_DIMENSION, MIN_SVG_DIMENSION)
            .quiet_zone(true)
            .build()
    }

    /// The code as text, two characters per module, for terminals.
    pub fn qr_text(&self) -> String {
        self.qr
            .render::<char>()
            .dark_color('█')
            .light_color(' ')
            .module_dimensions(2, 1)
            .quiet_zone(true)
            .build()
    }

    /// Module matrix in row-major order; `true` is a dark module.
    pub fn qr_modules(&self) -> (usize, Vec<bool>) {
        let modules = self
            .qr
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();
        (self.qr.width(), modules)
    }

    pub fn expires_in_secs(&self, now: Timestamp) -> u64 {
        self.expires_at.remaining_from(now)
    }

    /// The description shown alongside the code.
    pub fn payload(&self, now: Timestamp) -> HandoffPayload {
        HandoffPayload {
            session_id: self.session_id.clone(),
            url: self.url.clone(),
            kind: HANDOFF_KIND.to_string(),
            expires_in: self.expires_in_secs(now),
            instructions: HANDOFF_INSTRUCTIONS.to_string(),
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("session_id", &self.session_id)
            .field("url", &self.url)
            .field("expires_at", &self.expires_at)
            .field("qr_width", &self.qr.width())
            .finish()
    }
}

/// What the initiating device shows next to the code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffPayload {
    pub session_id: SessionId,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Seconds left at the time of issue.
    pub expires_in: u64,
    pub instructions: String,
}
