use std::fmt;

/// Traffic-signal phase derived from elapsed video time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPhase {
    Red,
    Green,
}

impl SignalPhase {
    pub fn is_red(self) -> bool {
        self == SignalPhase::Red
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalPhase::Red => "RED",
            SignalPhase::Green => "GREEN",
        }
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase at `frame_index` for a fixed RED/GREEN cycle that starts on RED.
///
/// `fps` must be positive; the frame source rejects anything else at startup.
pub fn phase(frame_index: u64, fps: f64, cycle_seconds: u64) -> SignalPhase {
    let seconds = (frame_index as f64 / fps).floor() as u64;
    let cycle = seconds / cycle_seconds.max(1);
    if cycle % 2 == 0 {
        SignalPhase::Red
    } else {
        SignalPhase::Green
    }
}
