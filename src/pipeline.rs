use opencv::{core::Mat, prelude::*};
use tracing::{debug, info, warn};

use crate::annotate::{self, HelmetBadge, TrackOverlay};
use crate::classifier::{Observation, PlateDecision, Rules};
use crate::config::Config;
use crate::detection::{Detection, DetectionFilter, Detector};
use crate::error::{CapabilityError, ConfigError, PipelineError};
use crate::helmet::HelmetClassifier;
use crate::plate::{self, PlateReader};
use crate::signal::{self, SignalPhase};
use crate::sink::{self, ViolationSink};
use crate::speed;
use crate::track_store::TrackStateStore;
use crate::tracker::{self, TrackedObject, Tracker};
use crate::utils;
use crate::video;
use crate::violation::{ViolationEvent, ViolationKind};

/// External capabilities the pipeline drives. Plate reading and helmet
/// inference are optional; without them plates are `UNKNOWN` and helmet
/// checks are skipped.
pub struct Capabilities {
    pub detector: Box<dyn Detector>,
    pub tracker: Box<dyn Tracker>,
    pub plate_reader: Option<Box<dyn PlateReader>>,
    pub helmet: Option<Box<dyn HelmetClassifier>>,
}

/// Everything produced for one frame, for a presentation layer to consume.
pub struct FrameOutcome {
    pub frame_number: u64,
    pub phase: SignalPhase,
    pub annotated: Mat,
    pub events: Vec<ViolationEvent>,
    pub confirmed_tracks: usize,
}

/// Frame-sequential violation pipeline over one video session.
pub struct Pipeline {
    caps: Capabilities,
    filter: DetectionFilter,
    rules: Rules,
    store: TrackStateStore,
    sink: ViolationSink,
    fps: f64,
    signal_cycle_seconds: u64,
    pixels_per_meter: f64,
    class_match_radius: i32,
}

/// Read a plate off the track's box. An empty crop never reaches the reader.
fn read_plate(
    reader: Option<&dyn PlateReader>,
    frame: &Mat,
    ltrb: [i32; 4],
    track_id: u32,
    frame_number: u64,
) -> String {
    let crop = match utils::crop(frame, ltrb) {
        Ok(crop) if !crop.empty() => crop,
        Ok(_) => {
            debug!(track_id, frame_number, "empty crop, plate unknown");
            return plate::UNKNOWN.to_string();
        }
        Err(e) => {
            warn!(track_id, frame_number, error = %e, "crop failed, plate unknown");
            return plate::UNKNOWN.to_string();
        }
    };
    let Some(reader) = reader else {
        return plate::UNKNOWN.to_string();
    };
    let result = reader.read(&crop);
    if let Err(e) = &result {
        warn!(track_id, frame_number, error = %e, "plate reader failed");
    }
    plate::normalize_read(&result)
}

impl Pipeline {
    pub fn new(
        cfg: &Config,
        fps: f64,
        caps: Capabilities,
        sink: ViolationSink,
    ) -> Result<Self, ConfigError> {
        let fps = video::check_fps(fps)?;
        cfg.validate()?;
        if caps.helmet.is_none() {
            warn!("no helmet classifier configured; helmet checks are disabled");
        }
        if caps.plate_reader.is_none() {
            warn!("no plate reader configured; plates will be recorded as UNKNOWN");
        }
        Ok(Pipeline {
            caps,
            filter: DetectionFilter::from_config(cfg),
            rules: Rules::from_config(cfg),
            store: TrackStateStore::new(),
            sink,
            fps,
            signal_cycle_seconds: cfg.signal_cycle_seconds,
            pixels_per_meter: cfg.pixels_per_meter,
            class_match_radius: cfg.class_match_radius,
        })
    }

    pub fn store(&self) -> &TrackStateStore {
        &self.store
    }

    pub fn sink(&self) -> &ViolationSink {
        &self.sink
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Forget all tracks before starting another video with the same sink.
    pub fn reset(&mut self) {
        self.caps.tracker.reset();
        self.store.reset();
    }

    /// Run detection, tracking and classification for one frame and persist
    /// any violation that fires. Only persistence and frame errors escape;
    /// capability failures degrade to safe defaults.
    pub fn process_frame(
        &mut self,
        frame: &Mat,
        frame_number: u64,
    ) -> Result<FrameOutcome, PipelineError> {
        let phase = signal::phase(frame_number, self.fps, self.signal_cycle_seconds);

        let detections = match self.caps.detector.detect(frame) {
            Ok(raw) => self.filter.apply(raw),
            Err(e) => {
                warn!(frame_number, error = %e, "detector failed, no detections this frame");
                Vec::new()
            }
        };

        let tracks = match self.caps.tracker.update(&detections, frame) {
            Ok(tracks) => tracker::confirmed_only(tracks),
            Err(e) => {
                warn!(frame_number, error = %e, "tracker failed, no tracks this frame");
                Vec::new()
            }
        };

        let mut events = Vec::new();
        let mut overlays = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let overlay = self.process_track(frame, frame_number, phase, track, &detections, &mut events)?;
            overlays.push(overlay);
        }

        let annotated = annotate::render(frame, phase, self.rules.stop_line_y, &overlays)?;

        debug!(
            frame_number,
            %phase,
            detections = detections.len(),
            tracks = tracks.len(),
            events = events.len(),
            "frame processed"
        );
        if frame_number % 100 == 0 {
            info!(frame_number, tracked = self.store.len(), "progress");
        }

        Ok(FrameOutcome {
            frame_number,
            phase,
            annotated,
            events,
            confirmed_tracks: tracks.len(),
        })
    }

    fn process_track(
        &mut self,
        frame: &Mat,
        frame_number: u64,
        phase: SignalPhase,
        track: &TrackedObject,
        detections: &[Detection],
        events: &mut Vec<ViolationEvent>,
    ) -> Result<TrackOverlay, PipelineError> {
        let track_id = track.track_id;
        let ltrb = track.ltrb();
        let center = utils::ltrb_center(ltrb);

        self.store.record_position(track_id, frame_number, center);
        let class_id =
            self.store
                .associate_class(track_id, center, detections, self.class_match_radius);
        let speed_kmph = self
            .store
            .get(track_id)
            .map(|rec| speed::estimate_kmph(rec.samples(), self.fps, self.pixels_per_meter))
            .unwrap_or(0.0);

        let helmet_eligible = self.rules.helmet_eligible(class_id, center.1);
        let helmet_present = if helmet_eligible
            && self
                .rules
                .needs_plate(self.store.logged_plate(track_id, ViolationKind::Helmet))
        {
            self.check_helmet(frame, ltrb, track_id, frame_number)
        } else {
            None
        };

        let obs = Observation {
            phase,
            center_y: center.1,
            speed_kmph,
            class_id,
            helmet_present,
        };

        let mut plate_read: Option<String> = None;
        for kind in self.rules.triggers(&obs) {
            let stored = self.store.logged_plate(track_id, kind).map(str::to_string);
            if !self.rules.needs_plate(stored.as_deref()) {
                continue;
            }
            let candidate = plate_read
                .get_or_insert_with(|| {
                    read_plate(
                        self.caps.plate_reader.as_deref(),
                        frame,
                        ltrb,
                        track_id,
                        frame_number,
                    )
                })
                .clone();

            let decision = self.rules.resolve_plate(stored.as_deref(), &candidate);
            if decision == PlateDecision::Keep {
                continue;
            }
            let record = sink::unpaid_record(
                track_id,
                kind,
                speed::round2(speed_kmph),
                candidate,
                frame_number,
                sink::now_timestamp(),
            );
            let receipt = match decision {
                PlateDecision::Replace => self.sink.upsert(&record, true)?,
                _ => self.sink.insert(&record)?,
            };
            self.store.mark_logged(track_id, kind, &record.plate);
            events.push(ViolationEvent {
                record,
                action: receipt.action,
                row_id: receipt.row_id,
                expired_insurance_row: receipt.expired_insurance_row,
            });
        }

        let logged = self.store.get(track_id);
        let is_logged = |kind| logged.is_some_and(|rec| rec.is_logged(kind));
        let helmet = helmet_eligible.then(|| {
            if is_logged(ViolationKind::Helmet) || helmet_present == Some(false) {
                HelmetBadge::NoHelmet
            } else {
                HelmetBadge::HelmetOn
            }
        });
        Ok(TrackOverlay {
            track_id,
            ltrb,
            speed_kmph,
            overspeeding: is_logged(ViolationKind::Overspeeding),
            red_light: is_logged(ViolationKind::RedLight),
            helmet,
        })
    }

    /// `None` when no classifier is configured. Failures and empty crops go
    /// through the helmet failure policy.
    fn check_helmet(&self, frame: &Mat, ltrb: [i32; 4], track_id: u32, frame_number: u64) -> Option<bool> {
        let classifier = self.caps.helmet.as_deref()?;
        let result = match utils::crop(frame, ltrb) {
            Ok(crop) if !crop.empty() => classifier.infer(&crop),
            Ok(_) => Err(CapabilityError::Decode("empty crop".to_string())),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = &result {
            warn!(track_id, frame_number, error = %e, "helmet check failed");
        }
        Some(self.rules.helmet_present(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HelmetFailurePolicy, PlatePolicy};
    use crate::registry::InsuranceRegistry;
    use crate::violation::WriteAction;
    use nalgebra::SVector;
    use opencv::core::{Scalar, Size, CV_8UC3};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedDetector {
        frames: VecDeque<Result<Vec<Detection>, CapabilityError>>,
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, _frame: &Mat) -> Result<Vec<Detection>, CapabilityError> {
            self.frames.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Returns the same tracks every frame, or a per-frame script.
    struct ScriptedTracker {
        frames: VecDeque<Vec<TrackedObject>>,
        repeat: Vec<TrackedObject>,
    }

    impl Tracker for ScriptedTracker {
        fn update(
            &mut self,
            _detections: &[Detection],
            _frame: &Mat,
        ) -> Result<Vec<TrackedObject>, CapabilityError> {
            Ok(self.frames.pop_front().unwrap_or_else(|| self.repeat.clone()))
        }

        fn reset(&mut self) {
            self.frames.clear();
            self.repeat.clear();
        }
    }

    struct ScriptedReader {
        answers: Mutex<VecDeque<Result<String, CapabilityError>>>,
        fallback: String,
        calls: Arc<AtomicUsize>,
    }

    impl PlateReader for ScriptedReader {
        fn read(&self, _crop: &Mat) -> Result<String, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    struct FixedHelmet(Result<bool, ()>);

    impl HelmetClassifier for FixedHelmet {
        fn infer(&self, _crop: &Mat) -> Result<bool, CapabilityError> {
            self.0
                .map_err(|_| CapabilityError::Transport("connection refused".into()))
        }
    }

    fn track_at(track_id: u32, cx: f32, cy: f32, confirmed: bool) -> TrackedObject {
        TrackedObject {
            track_id,
            tlwh: SVector::<f32, 4>::new(cx - 30.0, cy - 30.0, 60.0, 60.0),
            confirmed,
        }
    }

    fn reader(
        answers: Vec<Result<String, CapabilityError>>,
        fallback: &str,
    ) -> (Box<dyn PlateReader>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let reader = ScriptedReader {
            answers: Mutex::new(answers.into()),
            fallback: fallback.to_string(),
            calls: Arc::clone(&calls),
        };
        (Box::new(reader), calls)
    }

    fn blank() -> Mat {
        Mat::new_size_with_default(Size::new(640, 480), CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn pipeline_with(
        cfg: &Config,
        tracker: ScriptedTracker,
        detections: Vec<Result<Vec<Detection>, CapabilityError>>,
        plate_reader: Option<Box<dyn PlateReader>>,
        helmet: Option<Box<dyn HelmetClassifier>>,
        registry: InsuranceRegistry,
    ) -> Pipeline {
        let caps = Capabilities {
            detector: Box::new(ScriptedDetector {
                frames: detections.into(),
            }),
            tracker: Box::new(tracker),
            plate_reader,
            helmet,
        };
        let sink = ViolationSink::in_memory(registry).unwrap();
        Pipeline::new(cfg, 30.0, caps, sink).unwrap()
    }

    fn parked(track: TrackedObject) -> ScriptedTracker {
        ScriptedTracker {
            frames: VecDeque::new(),
            repeat: vec![track],
        }
    }

    #[test]
    fn test_one_red_light_record_for_a_track_that_stays_past_the_line() {
        let cfg = Config::default();
        let (reader, calls) = reader(vec![], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(1, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let frame = blank();
        let mut events = 0;
        for n in 1..=51 {
            let out = p.process_frame(&frame, n).unwrap();
            assert_eq!(out.phase, SignalPhase::Red);
            events += out.events.len();
        }
        assert_eq!(events, 1);
        assert_eq!(p.sink().count(ViolationKind::RedLight).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(p
            .store()
            .get(1)
            .unwrap()
            .is_logged(ViolationKind::RedLight));
    }

    #[test]
    fn test_weak_plate_is_upgraded_in_place() {
        let cfg = Config::default();
        let (reader, _) = reader(vec![Ok("KA05M1234".into())], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(4, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let frame = blank();

        let first = p.process_frame(&frame, 1).unwrap();
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].record.plate, plate::NOT_DETECTED);
        assert_eq!(first.events[0].action, WriteAction::Inserted);

        let second = p.process_frame(&frame, 2).unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].action, WriteAction::Upgraded);
        assert_eq!(second.events[0].row_id, first.events[0].row_id);

        let rows = sink::fetch_all(p.sink().connection()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plate.as_deref(), Some("KA05MH1234"));
        assert_eq!(
            p.store().logged_plate(4, ViolationKind::RedLight),
            Some("KA05MH1234")
        );

        assert!(p.process_frame(&frame, 3).unwrap().events.is_empty());
    }

    #[test]
    fn test_first_wins_policy_keeps_the_first_plate() {
        let mut cfg = Config::default();
        cfg.plate_policy = PlatePolicy::FirstWins;
        let (reader, calls) = reader(vec![Ok("KA05M1234".into())], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(4, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let frame = blank();
        for n in 1..=5 {
            p.process_frame(&frame, n).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let rows = sink::fetch_all(p.sink().connection()).unwrap();
        assert_eq!(rows[0].plate.as_deref(), Some(plate::NOT_DETECTED));
    }

    #[test]
    fn test_expired_plate_writes_one_extra_record() {
        let cfg = Config::default();
        let (reader, _) = reader(vec![], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(2, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::from_plates(["KA05MH1234"]),
        );
        let frame = blank();
        let out = p.process_frame(&frame, 7).unwrap();
        assert!(out.events[0].expired_insurance_row.is_some());
        p.process_frame(&frame, 8).unwrap();

        let rows = sink::fetch_all(p.sink().connection()).unwrap();
        let expired: Vec<_> = rows
            .iter()
            .filter(|r| r.violation_type == ViolationKind::ExpiredInsurance.as_str())
            .collect();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].track_id, 2);
        assert_eq!(expired[0].frame_number, 7);
        assert_eq!(expired[0].timestamp, rows[0].timestamp);
    }

    #[test]
    fn test_reader_failure_still_records_the_violation() {
        let cfg = Config::default();
        let (reader, _) = reader(
            vec![Err(CapabilityError::Timeout(std::time::Duration::from_secs(10)))],
            "garbage",
        );
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(3, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let out = p.process_frame(&blank(), 1).unwrap();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].record.plate, plate::UNKNOWN);
    }

    #[test]
    fn test_empty_crop_skips_the_reader() {
        let cfg = Config::default();
        let (reader, calls) = reader(vec![], "KA05MH1234");
        // box entirely right of a 640 px wide frame, center past the line
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(5, 900.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let out = p.process_frame(&blank(), 1).unwrap();
        assert_eq!(out.events[0].record.plate, plate::UNKNOWN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unconfirmed_tracks_never_log() {
        let cfg = Config::default();
        let (reader, calls) = reader(vec![], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(9, 320.0, 350.0, false)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        for n in 1..=10 {
            let out = p.process_frame(&blank(), n).unwrap();
            assert!(out.events.is_empty());
            assert_eq!(out.confirmed_tracks, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(p.store().is_empty());
    }

    #[test]
    fn test_flickering_confirmation_logs_once() {
        let cfg = Config::default();
        let (reader, calls) = reader(vec![], "KA05MH1234");
        let tracker = ScriptedTracker {
            frames: (0..20)
                .map(|i| vec![track_at(1, 320.0, 350.0, i % 2 == 0)])
                .collect(),
            repeat: Vec::new(),
        };
        let mut p = pipeline_with(
            &cfg,
            tracker,
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let mut events = 0;
        for n in 1..=20 {
            events += p.process_frame(&blank(), n).unwrap().events.len();
        }
        assert_eq!(events, 1);
        assert_eq!(p.sink().count(ViolationKind::RedLight).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_clears_tracker_and_store() {
        let cfg = Config::default();
        let (reader, _) = reader(vec![], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(1, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        assert_eq!(p.process_frame(&blank(), 1).unwrap().events.len(), 1);
        p.reset();
        assert!(p.store().is_empty());
        let out = p.process_frame(&blank(), 2).unwrap();
        assert_eq!(out.confirmed_tracks, 0);
        assert!(out.events.is_empty());
        assert_eq!(p.sink().count(ViolationKind::RedLight).unwrap(), 1);
    }

    #[test]
    fn test_no_red_light_during_green() {
        let cfg = Config::default();
        let (reader, _) = reader(vec![], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(1, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        for n in 150..=170 {
            let out = p.process_frame(&blank(), n).unwrap();
            assert_eq!(out.phase, SignalPhase::Green);
            assert!(out.events.is_empty());
        }
    }

    #[test]
    fn test_fast_track_is_logged_for_overspeeding() {
        let cfg = Config::default();
        let (reader, _) = reader(vec![], "DL01AB0001");
        // 15 px per frame at 30 fps = 108 km/h, kept above the stop line
        let tracker = ScriptedTracker {
            frames: (0..5)
                .map(|i| vec![track_at(6, 100.0 + 15.0 * i as f32, 100.0, true)])
                .collect(),
            repeat: Vec::new(),
        };
        let mut p = pipeline_with(
            &cfg,
            tracker,
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let first = p.process_frame(&blank(), 1).unwrap();
        assert!(first.events.is_empty());
        let second = p.process_frame(&blank(), 2).unwrap();
        assert_eq!(second.events.len(), 1);
        let record = &second.events[0].record;
        assert_eq!(record.kind, ViolationKind::Overspeeding);
        approx::assert_relative_eq!(record.speed, 108.0);
        for n in 3..=5 {
            assert!(p.process_frame(&blank(), n).unwrap().events.is_empty());
        }
    }

    fn rider_pipeline(policy: HelmetFailurePolicy, helmet: FixedHelmet) -> Pipeline {
        let mut cfg = Config::default();
        cfg.helmet_failure_policy = policy;
        let (reader, _) = reader(vec![], "MH12XY9999");
        // motorcycle inside the helmet band, above the stop line
        let bike = Detection::new(SVector::<f32, 4>::new(290.0, 120.0, 60.0, 60.0), 0.8, 3);
        pipeline_with(
            &cfg,
            parked(track_at(8, 320.0, 150.0, true)),
            vec![Ok(vec![bike])],
            Some(reader),
            Some(Box::new(helmet)),
            InsuranceRegistry::default(),
        )
    }

    #[test]
    fn test_helmet_failure_counts_as_no_helmet_by_default() {
        let mut p = rider_pipeline(HelmetFailurePolicy::AssumeNoHelmet, FixedHelmet(Err(())));
        let out = p.process_frame(&blank(), 1).unwrap();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].record.kind, ViolationKind::Helmet);
        assert_eq!(p.store().get(8).unwrap().class_id(), Some(3));
    }

    #[test]
    fn test_helmet_failure_can_be_configured_to_pass() {
        let mut p = rider_pipeline(HelmetFailurePolicy::AssumeHelmet, FixedHelmet(Err(())));
        for n in 1..=3 {
            assert!(p.process_frame(&blank(), n).unwrap().events.is_empty());
        }
    }

    #[test]
    fn test_rider_with_helmet_is_not_logged() {
        let mut p = rider_pipeline(HelmetFailurePolicy::AssumeNoHelmet, FixedHelmet(Ok(true)));
        assert!(p.process_frame(&blank(), 1).unwrap().events.is_empty());
    }

    #[test]
    fn test_detector_failure_does_not_stop_the_frame() {
        let cfg = Config::default();
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(1, 320.0, 350.0, true)),
            vec![Err(CapabilityError::Backend("cuda lost".into()))],
            None,
            None,
            InsuranceRegistry::default(),
        );
        let out = p.process_frame(&blank(), 1).unwrap();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].record.plate, plate::UNKNOWN);
    }

    #[test]
    fn test_failed_write_is_surfaced_and_not_marked() {
        let cfg = Config::default();
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(1, 320.0, 350.0, true)),
            vec![],
            None,
            None,
            InsuranceRegistry::default(),
        );
        p.sink()
            .connection()
            .execute("DROP TABLE violations", [])
            .unwrap();
        let err = p.process_frame(&blank(), 1).err().unwrap();
        assert!(matches!(err, PipelineError::Sink(_)));
        assert!(!p
            .store()
            .get(1)
            .unwrap()
            .is_logged(ViolationKind::RedLight));
    }

    #[test]
    fn test_zero_fps_is_rejected_at_construction() {
        let caps = Capabilities {
            detector: Box::new(ScriptedDetector {
                frames: VecDeque::new(),
            }),
            tracker: Box::new(parked(track_at(1, 0.0, 0.0, true))),
            plate_reader: None,
            helmet: None,
        };
        let sink = ViolationSink::in_memory(InsuranceRegistry::default()).unwrap();
        let err = Pipeline::new(&Config::default(), 0.0, caps, sink).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidFrameRate(_)));
    }

    #[test]
    fn test_ledger_never_shrinks_across_frames() {
        let cfg = Config::default();
        let (reader, _) = reader(vec![], "KA05MH1234");
        let mut p = pipeline_with(
            &cfg,
            parked(track_at(1, 320.0, 350.0, true)),
            vec![],
            Some(reader),
            None,
            InsuranceRegistry::default(),
        );
        let mut seen = 0;
        for n in 1..=200 {
            p.process_frame(&blank(), n).unwrap();
            let now = p.store().get(1).map_or(0, |r| r.logged_kinds().count());
            assert!(now >= seen);
            seen = now;
        }
        assert_eq!(seen, 1);
    }
}
