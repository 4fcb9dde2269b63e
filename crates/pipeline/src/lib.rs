//! Runtime side of framemark: videos, background pipelines and the service
//! facade used by transports.
//!
//! Extraction and tracking run as tokio tasks. Each is cancellable through
//! a `CancellationToken` held in the owning [`video::Video`], and both clean
//! up on every exit path.

pub mod config;
pub mod extraction;
pub mod frame_cache;
pub mod persistence;
pub mod registry;
pub mod service;
pub mod tracking;
pub mod video;

pub use config::EngineConfig;
pub use registry::VideoRegistry;
pub use service::{FrameView, LabelingService};
pub use tracking::{TrackedFrame, TrackingSession, TrackingSummary};
pub use video::{Video, VideoInfo};
