//! Tracking algorithm allow-list and the tracker provider seam.
//!
//! Concrete visual trackers live outside this workspace. They are plugged
//! in through [`TrackerProvider`], which builds one [`Tracker`] per tracked
//! object.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::BoundingBox;

/// The closed set of tracking algorithms a session may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingAlgorithm {
    #[serde(rename = "KCF")]
    Kcf,
    MedianFlow,
    #[serde(rename = "MOSSE")]
    Mosse,
    #[serde(rename = "CSRT")]
    Csrt,
    #[serde(rename = "MIL")]
    Mil,
    #[serde(rename = "TLD")]
    Tld,
    Boosting,
}

impl TrackingAlgorithm {
    pub const ALL: [TrackingAlgorithm; 7] = [
        Self::Kcf,
        Self::MedianFlow,
        Self::Mosse,
        Self::Csrt,
        Self::Mil,
        Self::Tld,
        Self::Boosting,
    ];

    /// Wire name, e.g. `"KCF"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Kcf => "KCF",
            Self::MedianFlow => "MedianFlow",
            Self::Mosse => "MOSSE",
            Self::Csrt => "CSRT",
            Self::Mil => "MIL",
            Self::Tld => "TLD",
            Self::Boosting => "Boosting",
        }
    }
}

impl fmt::Display for TrackingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrackingAlgorithm {
    type Err = CoreError;

    /// Names are matched exactly; `"kcf"` is not accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| CoreError::UnacceptableAlgorithm(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracking algorithm {0} is not available")]
    Unavailable(TrackingAlgorithm),

    #[error("tracker initialization failed: {0}")]
    InitFailed(String),
}

/// One running tracker instance following a single object.
pub trait Tracker: Send {
    /// Advance onto `frame`. Returns the new absolute box, or `None` when
    /// the target was lost.
    fn update(&mut self, frame: &RgbImage) -> Option<BoundingBox>;
}

/// Builds tracker instances for the allow-listed algorithms.
pub trait TrackerProvider: Send + Sync {
    fn init(
        &self,
        algorithm: TrackingAlgorithm,
        frame: &RgbImage,
        initial: BoundingBox,
    ) -> Result<Box<dyn Tracker>, TrackerError>;
}

/// Provider used when no tracking backend is linked in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTrackers;

impl TrackerProvider for UnavailableTrackers {
    fn init(
        &self,
        algorithm: TrackingAlgorithm,
        _frame: &RgbImage,
        _initial: BoundingBox,
    ) -> Result<Box<dyn Tracker>, TrackerError> {
        Err(TrackerError::Unavailable(algorithm))
    }
}
