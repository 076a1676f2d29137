use nalgebra::SVector;
use opencv::core::Mat;
use tracing::debug;

use crate::detection::Detection;
use crate::error::CapabilityError;
use crate::kalman_filter::{KalmanFilter, StateCov, StateMean};
use crate::utils;

/// A track as reported to the violation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub track_id: u32,
    pub tlwh: SVector<f32, 4>,
    pub confirmed: bool,
}

impl TrackedObject {
    pub fn ltrb(&self) -> [i32; 4] {
        utils::tlwh_to_ltrb(&self.tlwh)
    }

    pub fn center(&self) -> (i32, i32) {
        utils::ltrb_center(self.ltrb())
    }
}

/// Multi-object tracker capability.
pub trait Tracker {
    fn update(
        &mut self,
        detections: &[Detection],
        frame: &Mat,
    ) -> Result<Vec<TrackedObject>, CapabilityError>;

    /// Drop all live tracks before a new video. Stateless trackers need not
    /// override this.
    fn reset(&mut self) {}
}

/// Keep only tracks with enough evidence to be trusted by the classifier.
pub fn confirmed_only(tracks: Vec<TrackedObject>) -> Vec<TrackedObject> {
    tracks.into_iter().filter(|t| t.confirmed).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// Single Object Track
#[derive(Debug, Clone)]
pub struct STrack {
    mean: StateMean,
    covariance: StateCov,
    /// Bounding box in (tlwh) format
    pub tlwh: SVector<f32, 4>,
    pub score: f32,
    pub track_id: u32,
    pub state: TrackState,
    /// Total matched frames
    hits: u32,
    /// Consecutive frames without a match
    time_since_update: u32,
}

impl STrack {
    fn new(kalman: &KalmanFilter, detection: &Detection, track_id: u32, n_init: u32) -> Self {
        let (mean, covariance) = kalman.initiate(&detection.tlwh);
        STrack {
            mean,
            covariance,
            tlwh: detection.tlwh,
            score: detection.confidence,
            track_id,
            state: if n_init <= 1 {
                TrackState::Confirmed
            } else {
                TrackState::Tentative
            },
            hits: 1,
            time_since_update: 0,
        }
    }

    /// Convert mean state vector to tlwh format.
    fn state_to_tlwh(&self) -> SVector<f32, 4> {
        self.mean.fixed_rows::<4>(0).into()
    }

    fn predict(&mut self, kalman: &KalmanFilter) {
        let (mean, covariance) = kalman.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.tlwh = self.state_to_tlwh();
    }

    fn update(&mut self, kalman: &KalmanFilter, detection: &Detection, n_init: u32) {
        let (mean, covariance) = kalman.update(&self.mean, &self.covariance, &detection.tlwh);
        self.mean = mean;
        self.covariance = covariance;
        self.tlwh = self.state_to_tlwh();
        self.score = detection.confidence;
        self.hits += 1;
        self.time_since_update = 0;
        if self.state == TrackState::Tentative && self.hits >= n_init {
            self.state = TrackState::Confirmed;
        }
    }

    fn mark_missed(&mut self, max_age: u32) {
        self.time_since_update += 1;
        if self.state == TrackState::Tentative || self.time_since_update > max_age {
            self.state = TrackState::Deleted;
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }
}

/// Kalman-predicted, IoU-associated tracker (SORT family).
pub struct SortTracker {
    kalman: KalmanFilter,
    tracks: Vec<STrack>,
    next_id: u32,
    n_init: u32,
    max_age: u32,
    min_iou: f32,
}

impl SortTracker {
    pub fn new(n_init: u32, max_age: u32, min_iou: f32) -> Self {
        SortTracker {
            kalman: KalmanFilter::new(),
            tracks: Vec::new(),
            next_id: 1,
            n_init,
            max_age,
            min_iou,
        }
    }

    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self::new(cfg.n_init, cfg.max_age, cfg.match_iou_threshold)
    }

    pub fn tracks(&self) -> &[STrack] {
        &self.tracks
    }

    /// Greedy association: highest IoU pairs first, each track and detection
    /// used at most once.
    fn match_tracks(&self, dets: &[Detection]) -> (Vec<(usize, usize)>, Vec<usize>, Vec<usize>) {
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in dets.iter().enumerate() {
                let iou = utils::compute_iou(&track.tlwh, &det.tlwh);
                if iou >= self.min_iou {
                    pairs.push((ti, di, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut used_tracks = vec![false; self.tracks.len()];
        let mut used_dets = vec![false; dets.len()];
        let mut matches = Vec::new();
        for (ti, di, _) in pairs {
            if used_tracks[ti] || used_dets[di] {
                continue;
            }
            used_tracks[ti] = true;
            used_dets[di] = true;
            matches.push((ti, di));
        }

        let unmatched_tracks = (0..self.tracks.len()).filter(|&i| !used_tracks[i]).collect();
        let unmatched_dets = (0..dets.len()).filter(|&j| !used_dets[j]).collect();
        (matches, unmatched_tracks, unmatched_dets)
    }
}

impl Tracker for SortTracker {
    fn update(
        &mut self,
        detections: &[Detection],
        _frame: &Mat,
    ) -> Result<Vec<TrackedObject>, CapabilityError> {
        for track in self.tracks.iter_mut() {
            track.predict(&self.kalman);
        }

        let (matches, unmatched_tracks, unmatched_dets) = self.match_tracks(detections);

        for &(ti, di) in &matches {
            self.tracks[ti].update(&self.kalman, &detections[di], self.n_init);
        }
        for &ti in &unmatched_tracks {
            self.tracks[ti].mark_missed(self.max_age);
        }
        for &di in &unmatched_dets {
            let track = STrack::new(&self.kalman, &detections[di], self.next_id, self.n_init);
            self.next_id += 1;
            self.tracks.push(track);
        }

        let before = self.tracks.len();
        self.tracks.retain(|t| t.state != TrackState::Deleted);
        if before != self.tracks.len() {
            debug!(removed = before - self.tracks.len(), "tracks deleted");
        }

        Ok(self
            .tracks
            .iter()
            .filter(|t| t.time_since_update == 0)
            .map(|t| TrackedObject {
                track_id: t.track_id,
                tlwh: t.tlwh,
                confirmed: t.is_confirmed(),
            })
            .collect())
    }

    /// Ids keep counting so rows remembered by the sink are never reused.
    fn reset(&mut self) {
        debug!(dropped = self.tracks.len(), "tracker reset");
        self.tracks.clear();
    }
}
