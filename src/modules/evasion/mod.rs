//! Evasion profile selection.
//!
//! Each lookup attempt draws a fresh `(egress, fingerprint)` pair. The egress
//! side expands a provider template such as `http://user-cr-401:pw@host:8000`
//! into one of its sibling identities (`...-cr-403:...`), the fingerprint side
//! picks one of a few browser signatures. Draws are uniform rather than
//! round-robin so concurrent attempts do not line up on the same profile.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use http::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use thiserror::Error;
use url::Url;

/// `<prefix>-<digits><:credentials@host...>`; digits must sit in the userinfo.
static NUMERIC_EGRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>.+-)(?P<digits>\d+)(?P<suffix>:[^@/]*@.+)$")
        .expect("numeric egress pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvasionError {
    #[error("egress template is not a valid url: {0}")]
    InvalidEgress(String),
    #[error("invalid egress range '{0}' (expected LOW-HIGH with LOW <= HIGH)")]
    InvalidRange(String),
    #[error("unknown fingerprint tag '{0}'")]
    UnknownFingerprint(String),
    #[error("fingerprint pool is empty")]
    EmptyFingerprintPool,
}

/// Client signature presented to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintTag {
    Chrome124,
    Firefox125,
    Safari17,
}

impl FingerprintTag {
    pub const ALL: [FingerprintTag; 3] = [
        FingerprintTag::Chrome124,
        FingerprintTag::Firefox125,
        FingerprintTag::Safari17,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintTag::Chrome124 => "chrome124",
            FingerprintTag::Firefox125 => "firefox125",
            FingerprintTag::Safari17 => "safari17",
        }
    }

    pub fn user_agent(&self) -> &'static str {
        match self {
            FingerprintTag::Chrome124 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            }
            FingerprintTag::Firefox125 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0"
            }
            FingerprintTag::Safari17 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15"
            }
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            FingerprintTag::Chrome124 => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"
            }
            FingerprintTag::Firefox125 => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            }
            FingerprintTag::Safari17 => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        }
    }

    pub fn accept_language(&self) -> &'static str {
        match self {
            FingerprintTag::Chrome124 => "es-CR,es;q=0.9,en-US;q=0.8,en;q=0.7",
            FingerprintTag::Firefox125 => "es-CR,es;q=0.8,en-US;q=0.5,en;q=0.3",
            FingerprintTag::Safari17 => "es-419,es;q=0.9",
        }
    }

    /// Baseline browser headers for this signature.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(self.user_agent()));
        headers.insert(ACCEPT, HeaderValue::from_static(self.accept()));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(self.accept_language()));
        if *self == FingerprintTag::Chrome124 {
            headers.insert(
                HeaderName::from_static("sec-ch-ua"),
                HeaderValue::from_static(
                    "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
                ),
            );
            headers.insert(
                HeaderName::from_static("sec-ch-ua-platform"),
                HeaderValue::from_static("\"Windows\""),
            );
        }
        headers
    }
}

impl fmt::Display for FingerprintTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintTag {
    type Err = EvasionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FingerprintTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| EvasionError::UnknownFingerprint(s.trim().to_string()))
    }
}

/// Inclusive numeric range substituted into a numeric egress template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgressRange {
    pub low: u32,
    pub high: u32,
}

impl EgressRange {
    pub fn new(low: u32, high: u32) -> Result<Self, EvasionError> {
        if low > high {
            return Err(EvasionError::InvalidRange(format!("{low}-{high}")));
        }
        Ok(Self { low, high })
    }

    pub fn as_range(&self) -> RangeInclusive<u32> {
        self.low..=self.high
    }

    pub fn contains(&self, value: u32) -> bool {
        self.as_range().contains(&value)
    }
}

impl Default for EgressRange {
    fn default() -> Self {
        Self { low: 401, high: 406 }
    }
}

impl FromStr for EgressRange {
    type Err = EvasionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EvasionError::InvalidRange(s.to_string());
        let (low, high) = s.trim().split_once('-').ok_or_else(invalid)?;
        let low = low.trim().parse::<u32>().map_err(|_| invalid())?;
        let high = high.trim().parse::<u32>().map_err(|_| invalid())?;
        EgressRange::new(low, high).map_err(|_| invalid())
    }
}

/// Parsed egress template.
#[derive(Debug, Clone)]
enum EgressTemplate {
    /// Sibling identities share `prefix` and `suffix`; only the number varies.
    Numeric {
        prefix: String,
        width: usize,
        suffix: String,
        fallback: Url,
    },
    Fixed(Url),
}

impl EgressTemplate {
    fn parse(template: &str, range: EgressRange) -> Result<Self, EvasionError> {
        let fallback =
            Url::parse(template).map_err(|_| EvasionError::InvalidEgress(template.to_string()))?;

        let Some(caps) = NUMERIC_EGRESS.captures(template) else {
            return Ok(EgressTemplate::Fixed(fallback));
        };

        let parsed = EgressTemplate::Numeric {
            prefix: caps["prefix"].to_string(),
            width: caps["digits"].len(),
            suffix: caps["suffix"].to_string(),
            fallback,
        };

        // Both ends of the range must still yield a usable URL.
        for edge in [range.low, range.high] {
            let candidate = parsed.render(edge);
            Url::parse(&candidate).map_err(|_| EvasionError::InvalidEgress(candidate))?;
        }

        Ok(parsed)
    }

    fn render(&self, number: u32) -> String {
        match self {
            EgressTemplate::Numeric {
                prefix,
                width,
                suffix,
                ..
            } => format!("{prefix}{number:0width$}{suffix}", width = *width),
            EgressTemplate::Fixed(url) => url.to_string(),
        }
    }
}

/// Immutable per-attempt identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvasionProfile {
    /// `None` means a direct connection.
    pub egress: Option<Url>,
    pub fingerprint: FingerprintTag,
}

impl EvasionProfile {
    pub fn direct(fingerprint: FingerprintTag) -> Self {
        Self {
            egress: None,
            fingerprint,
        }
    }

    /// Egress description safe to log (credentials stripped).
    pub fn egress_label(&self) -> String {
        match &self.egress {
            Some(url) => {
                let mut redacted = url.clone();
                let _ = redacted.set_password(None);
                redacted.to_string()
            }
            None => "direct".to_string(),
        }
    }
}

/// Chooses a fresh [`EvasionProfile`] per lookup attempt.
#[derive(Debug, Clone)]
pub struct EvasionProfileSelector {
    egress: Option<EgressTemplate>,
    range: EgressRange,
    fingerprints: Vec<FingerprintTag>,
}

impl EvasionProfileSelector {
    pub fn new(
        egress_template: Option<&str>,
        range: EgressRange,
        fingerprints: Vec<FingerprintTag>,
    ) -> Result<Self, EvasionError> {
        if fingerprints.is_empty() {
            return Err(EvasionError::EmptyFingerprintPool);
        }

        let egress = match egress_template.map(str::trim).filter(|t| !t.is_empty()) {
            Some(template) => Some(EgressTemplate::parse(template, range)?),
            None => None,
        };

        Ok(Self {
            egress,
            range,
            fingerprints,
        })
    }

    /// Selector without any egress pool: every profile connects directly.
    pub fn direct() -> Self {
        Self {
            egress: None,
            range: EgressRange::default(),
            fingerprints: FingerprintTag::ALL.to_vec(),
        }
    }

    pub fn has_egress(&self) -> bool {
        self.egress.is_some()
    }

    pub fn choose(&self) -> EvasionProfile {
        let mut rng = rand::thread_rng();

        let fingerprint = self
            .fingerprints
            .choose(&mut rng)
            .copied()
            .unwrap_or(FingerprintTag::Chrome124);

        let egress = self.egress.as_ref().map(|template| match template {
            EgressTemplate::Fixed(url) => url.clone(),
            EgressTemplate::Numeric { fallback, .. } => {
                let number = rng.gen_range(self.range.as_range());
                let rendered = template.render(number);
                Url::parse(&rendered).unwrap_or_else(|err| {
                    log::warn!("egress candidate {number} rejected ({err}); using template as-is");
                    fallback.clone()
                })
            }
        });

        EvasionProfile { egress, fingerprint }
    }
}

impl Default for EvasionProfileSelector {
    fn default() -> Self {
        Self::direct()
    }
}
