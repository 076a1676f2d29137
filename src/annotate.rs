use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Point, Rect, Scalar, Vector},
    imgcodecs, imgproc,
    prelude::*,
};

use crate::signal::SignalPhase;
use crate::violation::ViolationRecord;

const RED: (i32, i32, i32) = (255, 0, 0);
const GREEN: (i32, i32, i32) = (0, 255, 0);

/// RGB triple to an OpenCV BGR scalar.
fn bgr(color: (i32, i32, i32)) -> Scalar {
    Scalar::new(color.2 as f64, color.1 as f64, color.0 as f64, 0.0)
}

/// Helmet badge shown under an eligible two-wheeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelmetBadge {
    NoHelmet,
    HelmetOn,
}

/// What to draw for one confirmed track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOverlay {
    pub track_id: u32,
    pub ltrb: [i32; 4],
    pub speed_kmph: f64,
    pub overspeeding: bool,
    pub red_light: bool,
    pub helmet: Option<HelmetBadge>,
}

impl TrackOverlay {
    pub fn label(&self) -> String {
        format!("ID: {} | {} km/h", self.track_id, self.speed_kmph.trunc() as i64)
    }
}

/// Draw text on an image with a black outline for visibility.
pub fn draw_text(
    frame: &mut Mat,
    text: &str,
    x: i32,
    y: i32,
    font_scale: f64,
    color: (i32, i32, i32),
) -> opencv::Result<()> {
    let org = Point::new(x, y);
    imgproc::put_text(
        frame,
        text,
        org,
        imgproc::FONT_HERSHEY_SIMPLEX,
        font_scale,
        Scalar::new(0.0, 0.0, 0.0, 0.0),
        4,
        imgproc::LINE_8,
        false,
    )?;
    imgproc::put_text(
        frame,
        text,
        org,
        imgproc::FONT_HERSHEY_SIMPLEX,
        font_scale,
        bgr(color),
        2,
        imgproc::LINE_8,
        false,
    )
}

pub fn draw_signal(frame: &mut Mat, phase: SignalPhase) -> opencv::Result<()> {
    let color = if phase.is_red() { RED } else { GREEN };
    imgproc::circle(frame, Point::new(50, 50), 20, bgr(color), -1, imgproc::LINE_8, 0)?;
    draw_text(frame, phase.as_str(), 80, 60, 0.6, color)
}

pub fn draw_stop_line(frame: &mut Mat, y: i32) -> opencv::Result<()> {
    let width = frame.cols();
    imgproc::line(
        frame,
        Point::new(0, y),
        Point::new(width, y),
        bgr(RED),
        2,
        imgproc::LINE_8,
        0,
    )
}

pub fn draw_track(frame: &mut Mat, overlay: &TrackOverlay) -> opencv::Result<()> {
    let [x1, y1, x2, y2] = overlay.ltrb;
    let color = if overlay.overspeeding { RED } else { GREEN };

    match overlay.helmet {
        Some(HelmetBadge::NoHelmet) => draw_text(frame, "No Helmet", x1, y2 + 20, 0.6, RED)?,
        Some(HelmetBadge::HelmetOn) => draw_text(frame, "Helmet ON", x1, y2 + 20, 0.6, GREEN)?,
        None => {}
    }
    if overlay.red_light {
        draw_text(frame, "Red Light Violation", x1, y2 + 40, 0.6, RED)?;
    }

    let rect = Rect::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0));
    imgproc::rectangle(frame, rect, bgr(color), 2, imgproc::LINE_8, 0)?;
    draw_text(frame, &overlay.label(), x1, y1 - 10, 0.6, color)
}

/// Copy of `frame` with the signal, stop-line and every track overlay drawn.
pub fn render(
    frame: &Mat,
    phase: SignalPhase,
    stop_line_y: i32,
    overlays: &[TrackOverlay],
) -> opencv::Result<Mat> {
    let mut out = frame.try_clone()?;
    if out.empty() {
        return Ok(out);
    }
    draw_signal(&mut out, phase)?;
    draw_stop_line(&mut out, stop_line_y)?;
    for overlay in overlays {
        draw_track(&mut out, overlay)?;
    }
    Ok(out)
}

pub fn screenshot_name(record: &ViolationRecord) -> String {
    format!(
        "{}_{}_{}.jpg",
        record.track_id,
        record.kind.slug(),
        record.frame_number
    )
}

/// Write evidence for a violation into `dir`, creating it when needed.
pub fn save_screenshot(dir: &Path, record: &ViolationRecord, frame: &Mat) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(screenshot_name(record));
    let written = imgcodecs::imwrite(&path.to_string_lossy(), frame, &Vector::new())?;
    if !written {
        anyhow::bail!("could not write {}", path.display());
    }
    Ok(path)
}
