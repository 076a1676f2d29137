use crate::config::{Config, HelmetFailurePolicy, PlatePolicy};
use crate::error::CapabilityError;
use crate::plate;
use crate::signal::SignalPhase;
use crate::violation::ViolationKind;

/// Derived state of one confirmed track on the current frame.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub phase: SignalPhase,
    pub center_y: i32,
    pub speed_kmph: f64,
    pub class_id: Option<i32>,
    /// `Some(true)` helmet seen, `Some(false)` none, `None` not evaluated.
    pub helmet_present: Option<bool>,
}

/// What to do with a plate read for a `(track, kind)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateDecision {
    /// First time this kind fires for the track.
    Insert,
    /// Already logged; the new read is better than the stored plate.
    Replace,
    /// Already logged; nothing to write.
    Keep,
}

/// Thresholds and policies of the violation state machine.
#[derive(Debug, Clone)]
pub struct Rules {
    pub stop_line_y: i32,
    pub helmet_band_y: i32,
    pub speed_limit_kmph: f64,
    pub two_wheeler_class: i32,
    pub plate_policy: PlatePolicy,
    pub helmet_failure_policy: HelmetFailurePolicy,
}

impl Rules {
    pub fn from_config(cfg: &Config) -> Self {
        Rules {
            stop_line_y: cfg.stop_line_y,
            helmet_band_y: cfg.helmet_band_y(),
            speed_limit_kmph: cfg.speed_limit_kmph,
            two_wheeler_class: cfg.two_wheeler_class,
            plate_policy: cfg.plate_policy,
            helmet_failure_policy: cfg.helmet_failure_policy,
        }
    }

    pub fn crossed_stop_line(&self, center_y: i32) -> bool {
        center_y >= self.stop_line_y
    }

    /// Two-wheeler close enough to the camera for helmet inference.
    pub fn helmet_eligible(&self, class_id: Option<i32>, center_y: i32) -> bool {
        class_id == Some(self.two_wheeler_class) && center_y >= self.helmet_band_y
    }

    /// Does the condition for `kind` hold on this frame, ignoring the ledger?
    pub fn condition(&self, kind: ViolationKind, obs: &Observation) -> bool {
        match kind {
            ViolationKind::RedLight => obs.phase.is_red() && self.crossed_stop_line(obs.center_y),
            ViolationKind::Overspeeding => obs.speed_kmph > self.speed_limit_kmph,
            ViolationKind::Helmet => {
                self.helmet_eligible(obs.class_id, obs.center_y) && obs.helmet_present == Some(false)
            }
            ViolationKind::ExpiredInsurance => false,
        }
    }

    /// Kinds whose condition holds, in evaluation order.
    pub fn triggers(&self, obs: &Observation) -> Vec<ViolationKind> {
        ViolationKind::CLASSIFIED
            .into_iter()
            .filter(|&kind| self.condition(kind, obs))
            .collect()
    }

    /// Whether a plate read is worth doing given the plate stored in the
    /// ledger (`None` when the kind was never logged). A stored plate that
    /// already passes the grammar cannot be improved on.
    pub fn needs_plate(&self, stored: Option<&str>) -> bool {
        match stored {
            None => true,
            Some(stored) => {
                self.plate_policy == PlatePolicy::Upgrade && plate::plate_strength(stored) == 0
            }
        }
    }

    pub fn resolve_plate(&self, stored: Option<&str>, candidate: &str) -> PlateDecision {
        let Some(stored) = stored else {
            return PlateDecision::Insert;
        };
        if self.plate_policy == PlatePolicy::Upgrade
            && plate::plate_strength(candidate) > plate::plate_strength(stored)
        {
            PlateDecision::Replace
        } else {
            PlateDecision::Keep
        }
    }

    /// Turn a helmet capability answer into "helmet present", applying the
    /// failure policy to errors.
    pub fn helmet_present(&self, result: &Result<bool, CapabilityError>) -> bool {
        match result {
            Ok(present) => *present,
            Err(_) => self.helmet_failure_policy == HelmetFailurePolicy::AssumeHelmet,
        }
    }
}
