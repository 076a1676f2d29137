use crate::track_store::TrackSample;

/// Speed in km/h from the two most recent samples of a track.
///
/// Only the last pair is used: there is no smoothing, so a single jittery box
/// shows up as a speed spike. Returns 0 when there are fewer than two samples
/// or when no time has elapsed between them.
pub fn estimate_kmph(samples: &[TrackSample], fps: f64, pixels_per_meter: f64) -> f64 {
    let [.., prev, last] = samples else {
        return 0.0;
    };
    speed_between(prev, last, fps, pixels_per_meter)
}

pub fn speed_between(a: &TrackSample, b: &TrackSample, fps: f64, pixels_per_meter: f64) -> f64 {
    if b.frame_number <= a.frame_number {
        return 0.0;
    }
    let dx = f64::from(b.cx - a.cx);
    let dy = f64::from(b.cy - a.cy);
    let meters = dx.hypot(dy) / pixels_per_meter;
    let seconds = (b.frame_number - a.frame_number) as f64 / fps;
    if seconds <= 0.0 {
        return 0.0;
    }
    meters / seconds * 3.6
}

/// Round to the two decimals stored in the violation table.
pub fn round2(kmph: f64) -> f64 {
    (kmph * 100.0).round() / 100.0
}
