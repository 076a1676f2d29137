use std::collections::HashMap;

use crate::detection::Detection;
use crate::violation::ViolationKind;

/// Center of a track's box on a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSample {
    pub frame_number: u64,
    pub cx: i32,
    pub cy: i32,
}

/// Everything the pipeline remembers about one track id.
#[derive(Debug, Clone, Default)]
pub struct TrackRecord {
    samples: Vec<TrackSample>,
    class_id: Option<i32>,
    /// Plate stored for each logged violation kind. Entries are never removed.
    logged: HashMap<ViolationKind, String>,
}

impl TrackRecord {
    pub fn samples(&self) -> &[TrackSample] {
        &self.samples
    }

    pub fn last_sample(&self) -> Option<&TrackSample> {
        self.samples.last()
    }

    pub fn class_id(&self) -> Option<i32> {
        self.class_id
    }

    pub fn is_logged(&self, kind: ViolationKind) -> bool {
        self.logged.contains_key(&kind)
    }

    pub fn logged_plate(&self, kind: ViolationKind) -> Option<&str> {
        self.logged.get(&kind).map(String::as_str)
    }

    pub fn logged_kinds(&self) -> impl Iterator<Item = ViolationKind> + '_ {
        self.logged.keys().copied()
    }
}

/// Per-track history, class and violation ledger, keyed by tracker id.
///
/// A track record is created lazily on first sight and lives for the whole
/// session so a reappearing id keeps its ledger.
#[derive(Debug, Default)]
pub struct TrackStateStore {
    tracks: HashMap<u32, TrackRecord>,
}

impl TrackStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: u32) -> Option<&TrackRecord> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Append the center for this frame. A repeated frame number replaces the
    /// previous sample rather than adding a zero-duration step.
    pub fn record_position(&mut self, track_id: u32, frame_number: u64, center: (i32, i32)) {
        let record = self.tracks.entry(track_id).or_default();
        let sample = TrackSample {
            frame_number,
            cx: center.0,
            cy: center.1,
        };
        match record.samples.last_mut() {
            Some(last) if last.frame_number == frame_number => *last = sample,
            _ => record.samples.push(sample),
        }
    }

    /// Give the track the class of the first detection whose center lies
    /// strictly within `radius` pixels on both axes. Once set, never changes.
    pub fn associate_class(
        &mut self,
        track_id: u32,
        center: (i32, i32),
        detections: &[Detection],
        radius: i32,
    ) -> Option<i32> {
        let record = self.tracks.entry(track_id).or_default();
        if record.class_id.is_none() {
            record.class_id = detections
                .iter()
                .find(|d| {
                    let (dx, dy) = d.center();
                    (dx - center.0).abs() < radius && (dy - center.1).abs() < radius
                })
                .map(|d| d.class_id);
        }
        record.class_id
    }

    /// Record that `kind` was persisted for `track_id` with `plate`. Calling
    /// again only refreshes the stored plate.
    pub fn mark_logged(&mut self, track_id: u32, kind: ViolationKind, plate: &str) {
        self.tracks
            .entry(track_id)
            .or_default()
            .logged
            .insert(kind, plate.to_string());
    }

    pub fn logged_plate(&self, track_id: u32, kind: ViolationKind) -> Option<&str> {
        self.tracks.get(&track_id)?.logged_plate(kind)
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}
