use nalgebra::SVector;
use num_traits::ToPrimitive;
use opencv::{
    core::{Mat, Rect},
    prelude::*,
};

/// Perform non-max suppression on tlwh boxes & scores, return indices to keep
/// ordered by descending score.
pub fn nms(boxes: &[SVector<f32, 4>], scores: &[f32], iou_thresh: f32) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..boxes.len()).collect();
    idxs.sort_unstable_by(|&i, &j| scores[j].total_cmp(&scores[i]));
    let mut keep = Vec::new();
    while let Some(&i) = idxs.first() {
        keep.push(i);
        idxs = idxs
            .into_iter()
            .skip(1)
            .filter(|&j| compute_iou(&boxes[i], &boxes[j]) <= iou_thresh)
            .collect();
    }
    keep
}

/// Compute IoU between two bounding boxes in [x1, y1, w, h] form.
pub fn compute_iou(a: &SVector<f32, 4>, b: &SVector<f32, 4>) -> f32 {
    compute_iou_tlbr(
        a[0],
        a[1],
        a[0] + a[2],
        a[1] + a[3],
        b[0],
        b[1],
        b[0] + b[2],
        b[1] + b[3],
    )
}

#[allow(clippy::too_many_arguments)]
fn compute_iou_tlbr(
    a_x1: f32,
    a_y1: f32,
    a_x2: f32,
    a_y2: f32,
    b_x1: f32,
    b_y1: f32,
    b_x2: f32,
    b_y2: f32,
) -> f32 {
    let x1 = a_x1.max(b_x1);
    let y1 = a_y1.max(b_y1);
    let x2 = a_x2.min(b_x2);
    let y2 = a_y2.min(b_y2);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let a_area = (a_x2 - a_x1) * (a_y2 - a_y1);
    let b_area = (b_x2 - b_x1) * (b_y2 - b_y1);

    if a_area + b_area - inter_area <= 0.0 {
        return 0.0;
    }

    inter_area / (a_area + b_area - inter_area)
}

/// Integer pixel corners [x1, y1, x2, y2] of a tlwh box, truncated the way the
/// frame indexer does. Non-finite coordinates collapse to 0.
pub fn tlwh_to_ltrb(tlwh: &SVector<f32, 4>) -> [i32; 4] {
    let px = |v: f32| v.to_i32().unwrap_or(0);
    [
        px(tlwh[0]),
        px(tlwh[1]),
        px(tlwh[0] + tlwh[2]),
        px(tlwh[1] + tlwh[3]),
    ]
}

/// Integer center of an [x1, y1, x2, y2] box.
pub fn ltrb_center(ltrb: [i32; 4]) -> (i32, i32) {
    ((ltrb[0] + ltrb[2]) / 2, (ltrb[1] + ltrb[3]) / 2)
}

/// Copy the part of `ltrb` that lies inside the frame. Returns an empty `Mat`
/// when the box does not overlap the frame.
pub fn crop(frame: &Mat, ltrb: [i32; 4]) -> opencv::Result<Mat> {
    let x1 = ltrb[0].clamp(0, frame.cols());
    let y1 = ltrb[1].clamp(0, frame.rows());
    let x2 = ltrb[2].clamp(0, frame.cols());
    let y2 = ltrb[3].clamp(0, frame.rows());
    if x2 <= x1 || y2 <= y1 {
        return Ok(Mat::default());
    }
    let roi = Mat::roi(frame, Rect::new(x1, y1, x2 - x1, y2 - y1))?;
    roi.try_clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use opencv::core::{Scalar, Size, CV_8UC3};

    #[test]
    fn test_iou_of_identical_and_disjoint_boxes() {
        let a = SVector::<f32, 4>::new(0.0, 0.0, 10.0, 10.0);
        let b = SVector::<f32, 4>::new(5.0, 0.0, 10.0, 10.0);
        let c = SVector::<f32, 4>::new(50.0, 50.0, 10.0, 10.0);
        assert_relative_eq!(compute_iou(&a, &a), 1.0);
        assert_relative_eq!(compute_iou(&a, &b), 50.0 / 150.0);
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping_boxes() {
        let boxes = vec![
            SVector::<f32, 4>::new(0.0, 0.0, 10.0, 10.0),
            SVector::<f32, 4>::new(1.0, 1.0, 10.0, 10.0),
            SVector::<f32, 4>::new(100.0, 100.0, 10.0, 10.0),
        ];
        let keep = nms(&boxes, &[0.6, 0.9, 0.5], 0.5);
        assert_eq!(keep, vec![1, 2]);
    }

    #[test]
    fn test_center_uses_integer_division() {
        let ltrb = tlwh_to_ltrb(&SVector::<f32, 4>::new(10.7, 20.2, 31.0, 41.0));
        assert_eq!(ltrb, [10, 20, 41, 61]);
        assert_eq!(ltrb_center(ltrb), (25, 40));
    }

    #[test]
    fn test_crop_is_clamped_to_frame() {
        let frame =
            Mat::new_size_with_default(Size::new(100, 80), CV_8UC3, Scalar::all(0.0)).unwrap();
        let inside = crop(&frame, [90, 70, 120, 100]).unwrap();
        assert_eq!((inside.cols(), inside.rows()), (10, 10));

        let outside = crop(&frame, [200, 200, 220, 220]).unwrap();
        assert!(outside.empty());
    }
}
