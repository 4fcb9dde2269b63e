//! Domain types and external seams for the framemark labeling engine.
//!
//! - [`error`]: error taxonomy shared by every crate.
//! - [`status`]: video process states and transition rules.
//! - [`labels`]: label records and the per-video label store.
//! - [`tracking`]: tracking algorithm allow-list and tracker provider traits.
//! - [`decoder`] / [`ffmpeg`]: video decoder trait and its FFmpeg adapter.
//! - [`naming`]: on-disk layout.
//! - [`snapshot`]: persisted registry entries.

pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod labels;
pub mod naming;
pub mod snapshot;
pub mod status;
pub mod tracking;
pub mod types;
