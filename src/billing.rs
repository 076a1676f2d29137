use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::plate;
use crate::sink::{self, StoredViolation};
use crate::violation::PaymentStatus;

const DEFAULT_FINE: u32 = 500;

/// Fine in rupees for a `violation_type` value.
pub fn fine_for(violation_type: &str) -> u32 {
    match violation_type {
        "Helmet Violation" => 500,
        "Overspeeding" => 1000,
        "Red Light Violation" => 1200,
        "License Plate Missing" => 800,
        _ => DEFAULT_FINE,
    }
}

pub fn challan_id(row_id: i64) -> String {
    format!("CH-{row_id:05}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(PaymentStatus),
}

impl StatusFilter {
    fn accepts(self, status: &str) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => status.trim().eq_ignore_ascii_case(wanted.as_str()),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

/// A billable violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Challan {
    pub id: i64,
    pub challan_id: String,
    pub plate: String,
    pub violation: String,
    pub fine: u32,
    pub status: String,
    pub date: String,
}

impl Challan {
    fn from_row(row: StoredViolation) -> Option<Self> {
        let plate = row.plate?.trim().to_string();
        if plate.is_empty() || plate::is_sentinel(&plate) {
            return None;
        }
        Some(Challan {
            id: row.id,
            challan_id: challan_id(row.id),
            fine: fine_for(&row.violation_type),
            plate,
            violation: row.violation_type,
            status: row.status,
            date: row.timestamp,
        })
    }

    pub fn is_unpaid(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(PaymentStatus::Unpaid.as_str())
    }
}

/// Challans with a readable plate, grouped by violation type then id.
pub fn challans(conn: &Connection, filter: StatusFilter) -> Result<Vec<Challan>, SinkError> {
    let mut list: Vec<Challan> = sink::fetch_all(conn)?
        .into_iter()
        .filter_map(Challan::from_row)
        .filter(|c| filter.accepts(&c.status))
        .collect();
    list.sort_by(|a, b| a.violation.cmp(&b.violation).then(a.id.cmp(&b.id)));
    Ok(list)
}

/// Mark a challan paid or unpaid. Returns false when no such row exists.
pub fn set_status(conn: &Connection, id: i64, status: PaymentStatus) -> Result<bool, SinkError> {
    let changed = conn.execute(
        "UPDATE violations SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(changed == 1)
}

/// Normalise a phone cell from the owner sheet. Empty and `nan` are missing.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut phone = raw.trim();
    if let Some(stripped) = phone.strip_suffix(".0") {
        phone = stripped;
    }
    if phone.is_empty() || phone.eq_ignore_ascii_case("nan") {
        return None;
    }
    if phone.starts_with("+91") {
        Some(phone.to_string())
    } else {
        Some(format!("+{phone}"))
    }
}

pub fn sms_message(challan: &Challan) -> String {
    format!(
        "Dear Vehicle Owner, your vehicle with plate number {} has a challan for {} of ₹{}. Please pay promptly.",
        challan.plate, challan.violation, challan.fine
    )
}

/// Plate to owner phone lookup.
#[derive(Debug, Clone, Default)]
pub struct OwnerDirectory {
    phones: HashMap<String, String>,
}

impl OwnerDirectory {
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| SinkError::MissingColumn(name.to_string()))
        };
        let plate_idx = column("Number Plate")?;
        let phone_idx = column("Phone Number")?;

        let mut phones = HashMap::new();
        for row in reader.records() {
            let row = row?;
            let (Some(plate), Some(phone)) = (row.get(plate_idx), row.get(phone_idx)) else {
                continue;
            };
            if let Some(phone) = normalize_phone(phone) {
                phones.entry(plate.trim().to_string()).or_insert(phone);
            }
        }
        Ok(OwnerDirectory { phones })
    }

    pub fn phone_for(&self, plate: &str) -> Option<&str> {
        self.phones.get(plate).map(String::as_str)
    }
}

/// Outbound SMS delivery.
pub trait SmsGateway {
    fn send(&mut self, phone: &str, message: &str) -> anyhow::Result<()>;
}

/// Gateway that only logs what it would send.
#[derive(Debug, Default)]
pub struct LogGateway {
    pub sent: usize,
}

impl SmsGateway for LogGateway {
    fn send(&mut self, phone: &str, message: &str) -> anyhow::Result<()> {
        info!(%phone, %message, "sms (dry run)");
        self.sent += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NoticeOutcome {
    Sent { phone: String },
    MissingPhone,
    Failed { phone: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticeReport {
    pub challan_id: String,
    pub outcome: NoticeOutcome,
}

/// Send a reminder for every unpaid challan. One failed delivery never stops
/// the rest of the batch.
pub fn dispatch_unpaid_notices(
    challans: &[Challan],
    owners: &OwnerDirectory,
    gateway: &mut dyn SmsGateway,
) -> Vec<NoticeReport> {
    challans
        .iter()
        .filter(|c| c.is_unpaid())
        .map(|c| {
            let outcome = match owners.phone_for(&c.plate) {
                None => {
                    warn!(challan = %c.challan_id, "missing phone number");
                    NoticeOutcome::MissingPhone
                }
                Some(phone) => match gateway.send(phone, &sms_message(c)) {
                    Ok(()) => NoticeOutcome::Sent {
                        phone: phone.to_string(),
                    },
                    Err(e) => {
                        warn!(challan = %c.challan_id, %phone, error = %e, "sms failed");
                        NoticeOutcome::Failed {
                            phone: phone.to_string(),
                            error: e.to_string(),
                        }
                    }
                },
            };
            NoticeReport {
                challan_id: c.challan_id.clone(),
                outcome,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InsuranceRegistry;
    use crate::sink::{unpaid_record, ViolationSink};
    use crate::violation::ViolationKind;

    fn seeded() -> ViolationSink {
        let mut sink = ViolationSink::in_memory(InsuranceRegistry::default()).unwrap();
        for (track, kind, plate) in [
            (1, ViolationKind::RedLight, "KA05MH1234"),
            (2, ViolationKind::Overspeeding, "Not Detected"),
            (3, ViolationKind::Helmet, "DL01AB0001"),
            (4, ViolationKind::Overspeeding, "MH12XY9999"),
        ] {
            let rec = unpaid_record(track, kind, 70.0, plate.into(), 10, "2024-05-01 09:00:00".into());
            sink.insert(&rec).unwrap();
        }
        sink
    }

    #[test]
    fn test_fines_and_ids() {
        assert_eq!(fine_for("Red Light Violation"), 1200);
        assert_eq!(fine_for("Expired Insurance"), 500);
        assert_eq!(challan_id(7), "CH-00007");
    }

    #[test]
    fn test_unreadable_plates_are_not_billed() {
        let sink = seeded();
        let list = challans(sink.connection(), StatusFilter::All).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|c| c.plate != "Not Detected"));
        assert_eq!(list[0].violation, "Helmet Violation");
    }

    #[test]
    fn test_unknown_plate_rows_are_not_billed() {
        let mut sink = seeded();
        for (track, plate) in [(5, "UNKNOWN"), (6, "not detected"), (7, " ")] {
            let rec = unpaid_record(track, ViolationKind::RedLight, 0.0, plate.into(), 3, "2024-05-01 09:00:00".into());
            sink.insert(&rec).unwrap();
        }
        let list = challans(sink.connection(), StatusFilter::All).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|c| !plate::is_sentinel(&c.plate)));

        let mut owners = OwnerDirectory::default();
        owners.phones.insert("UNKNOWN".into(), "+919876543210".into());
        let mut gateway = LogGateway::default();
        let reports = dispatch_unpaid_notices(&list, &owners, &mut gateway);
        assert!(reports.iter().all(|r| r.outcome == NoticeOutcome::MissingPhone));
        assert_eq!(gateway.sent, 0);
    }

    #[test]
    fn test_status_filter_and_payment() {
        let sink = seeded();
        let conn = sink.connection();
        assert!(set_status(conn, 1, PaymentStatus::Paid).unwrap());
        assert!(!set_status(conn, 999, PaymentStatus::Paid).unwrap());

        let paid = challans(conn, "paid".parse().unwrap()).unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].challan_id, "CH-00001");
        let unpaid = challans(conn, StatusFilter::Only(PaymentStatus::Unpaid)).unwrap();
        assert_eq!(unpaid.len(), 2);
    }

    #[test]
    fn test_phone_normalisation() {
        assert_eq!(normalize_phone("919876543210.0").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("+919876543210").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("nan"), None);
        assert_eq!(normalize_phone(" "), None);
    }

    struct FlakyGateway {
        sent: Vec<String>,
    }

    impl SmsGateway for FlakyGateway {
        fn send(&mut self, phone: &str, message: &str) -> anyhow::Result<()> {
            if phone.ends_with("0000") {
                anyhow::bail!("carrier rejected");
            }
            self.sent.push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_notices_continue_past_failures() {
        let path = std::env::temp_dir().join(format!("trafficwatch_owners_{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "Number Plate,Phone Number\nKA05MH1234,919876543210.0\nDL01AB0001,919800000000\n",
        )
        .unwrap();
        let owners = OwnerDirectory::from_csv_path(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let sink = seeded();
        let list = challans(sink.connection(), StatusFilter::All).unwrap();
        let mut gateway = FlakyGateway { sent: Vec::new() };
        let reports = dispatch_unpaid_notices(&list, &owners, &mut gateway);

        assert_eq!(reports.len(), 3);
        let outcome = |id: &str| {
            reports
                .iter()
                .find(|r| r.challan_id == id)
                .map(|r| r.outcome.clone())
                .unwrap()
        };
        assert!(matches!(outcome("CH-00001"), NoticeOutcome::Sent { .. }));
        assert!(matches!(outcome("CH-00003"), NoticeOutcome::Failed { .. }));
        assert_eq!(outcome("CH-00004"), NoticeOutcome::MissingPhone);
        assert_eq!(
            gateway.sent,
            vec!["Dear Vehicle Owner, your vehicle with plate number KA05MH1234 has a challan for Red Light Violation of ₹1200. Please pay promptly."]
        );
    }
}
