//! Label records and the per-video label store.
//!
//! The store is a plain ordered collection with no locking of its own; the
//! owning video guards it. It is persisted as a CSV sidecar with one row
//! per record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_identifier, BoundingBox, FrameIndex, Resolution};

/// Column order of the CSV sidecar.
pub const LABEL_COLUMNS: [&str; 11] = [
    "label_id",
    "frame_index",
    "label",
    "left",
    "top",
    "right",
    "bottom",
    "absolute_left",
    "absolute_top",
    "absolute_right",
    "absolute_bottom",
];

/// One bounding-box annotation on one frame.
///
/// Coordinates are kept both normalized (`left`..`bottom`, relative to the
/// video resolution) and absolute (`absolute_*`, pixels).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub label_id: String,
    pub frame_index: FrameIndex,
    pub label: String,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub absolute_left: f64,
    pub absolute_top: f64,
    pub absolute_right: f64,
    pub absolute_bottom: f64,
}

impl LabelRecord {
    /// Build a record with a fresh identifier from an absolute box.
    pub fn new(
        frame_index: FrameIndex,
        label: impl Into<String>,
        absolute: BoundingBox,
        resolution: Resolution,
    ) -> Self {
        let normalized = absolute.normalized(resolution);
        Self {
            label_id: new_identifier(),
            frame_index,
            label: label.into(),
            left: normalized.left,
            top: normalized.top,
            right: normalized.right,
            bottom: normalized.bottom,
            absolute_left: absolute.left,
            absolute_top: absolute.top,
            absolute_right: absolute.right,
            absolute_bottom: absolute.bottom,
        }
    }

    pub fn absolute_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.absolute_left,
            self.absolute_top,
            self.absolute_right,
            self.absolute_bottom,
        )
    }

    pub fn normalized_box(&self) -> BoundingBox {
        BoundingBox::new(self.left, self.top, self.right, self.bottom)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelStore {
    records: Vec<LabelRecord>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its identifier. Duplicates are not rejected.
    pub fn add(&mut self, record: LabelRecord) -> String {
        let id = record.label_id.clone();
        self.records.push(record);
        id
    }

    /// Remove the record with `label_id`. Returns whether anything was removed.
    pub fn remove(&mut self, label_id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.label_id != label_id);
        self.records.len() != before
    }

    pub fn for_frame(&self, frame_index: FrameIndex) -> impl Iterator<Item = &LabelRecord> {
        self.records
            .iter()
            .filter(move |r| r.frame_index == frame_index)
    }

    pub fn has_frame(&self, frame_index: FrameIndex) -> bool {
        self.records.iter().any(|r| r.frame_index == frame_index)
    }

    /// Number of distinct frames carrying at least one record.
    pub fn labeled_frame_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.frame_index)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn records(&self) -> &[LabelRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize to CSV. The header row is written even for an empty store.
    pub fn to_csv(&self) -> Result<Vec<u8>, CoreError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(LABEL_COLUMNS).map_err(csv_error)?;
        for record in &self.records {
            writer.serialize(record).map_err(csv_error)?;
        }
        writer
            .into_inner()
            .map_err(|e| CoreError::Internal(format!("Failed to flush label CSV: {e}")))
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut reader = csv::Reader::from_reader(bytes);
        let records = reader
            .deserialize::<LabelRecord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::InvalidArgument(format!("Malformed label CSV: {e}")))?;
        Ok(Self { records })
    }
}

fn csv_error(e: csv::Error) -> CoreError {
    CoreError::Internal(format!("Failed to write label CSV: {e}"))
}
