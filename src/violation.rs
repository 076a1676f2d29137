use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Violation kinds the classifier can fire, plus the derived registry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    RedLight,
    Overspeeding,
    Helmet,
    ExpiredInsurance,
}

impl ViolationKind {
    /// Kinds evaluated per track per frame, in evaluation order.
    pub const CLASSIFIED: [ViolationKind; 3] = [
        ViolationKind::RedLight,
        ViolationKind::Overspeeding,
        ViolationKind::Helmet,
    ];

    /// Value of the `violation_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::RedLight => "Red Light Violation",
            ViolationKind::Overspeeding => "Overspeeding",
            ViolationKind::Helmet => "Helmet Violation",
            ViolationKind::ExpiredInsurance => "Expired Insurance",
        }
    }

    /// File-name friendly tag used for evidence screenshots.
    pub fn slug(self) -> &'static str {
        match self {
            ViolationKind::RedLight => "Red_Light",
            ViolationKind::Overspeeding => "Overspeeding",
            ViolationKind::Helmet => "Helmet_Violation",
            ViolationKind::ExpiredInsurance => "Expired_Insurance",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Red Light Violation" => Ok(ViolationKind::RedLight),
            "Overspeeding" => Ok(ViolationKind::Overspeeding),
            "Helmet Violation" => Ok(ViolationKind::Helmet),
            "Expired Insurance" => Ok(ViolationKind::ExpiredInsurance),
            other => Err(format!("unknown violation type `{other}`")),
        }
    }
}

/// Payment status vocabulary shared with the billing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "Unpaid",
            PaymentStatus::Paid => "Paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(format!("unknown payment status `{other}`")),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `violations` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationRecord {
    pub track_id: u32,
    pub speed: f64,
    pub plate: String,
    pub timestamp: String,
    pub frame_number: u64,
    pub status: PaymentStatus,
    pub kind: ViolationKind,
}

/// What a write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteAction {
    Inserted,
    Upgraded,
}

/// A violation that was persisted while processing a frame.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationEvent {
    pub record: ViolationRecord,
    pub action: WriteAction,
    pub row_id: i64,
    pub expired_insurance_row: Option<i64>,
}
