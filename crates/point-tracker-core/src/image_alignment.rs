//! Rigid registration of the image sequence from tracked points.
//!
//! Rotations come from the direction between two landmark points; the
//! translation reference is a landmark point, the barycentre or the bounding
//! box centre of the tracked points. After applying the solution every
//! frame's reference position coincides with the first frame's one.

use log::info;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::dataset::{DataError, Dataset, PointId};
use crate::frame::{rotation_matrix, RigidTransform};
use crate::geometry::{bounding_box_center, centroid};

/// Point of each frame brought onto the first frame's one.
///
/// The bounding box and barycentre are taken over the frame's own
/// un-registered pixel positions; the resulting centre is mapped back to
/// physical units, where the registration shift applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "point", rename_all = "snake_case")]
pub enum TranslationReference {
    BoundingBoxCenter,
    Barycentre,
    Point(PointId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RotationReference {
    #[default]
    None,
    TwoPoint { first: PointId, second: PointId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParams {
    pub translation: TranslationReference,
    #[serde(default)]
    pub rotation: RotationReference,
    /// Restrict bounding box / barycentre to these points. All points of
    /// each frame are used when absent.
    #[serde(default)]
    pub points: Option<Vec<PointId>>,
}

/// Per-frame corrections, indexed like the dataset frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSolution {
    pub translations: Vec<Vector2<f64>>,
    /// Rotation corrections, in degrees.
    pub rotations: Vec<f64>,
}

#[derive(thiserror::Error, Debug)]
pub enum AlignmentError {
    #[error("alignment point {point} is missing in frame '{frame}'")]
    MissingPoint { frame: String, point: PointId },
    #[error("frame '{frame}' has no point to compute a reference position")]
    EmptyFrame { frame: String },
    #[error("rotation landmarks must be two distinct points (got {0} twice)")]
    SameLandmark(PointId),
    #[error("solution covers {got} frames, dataset has {expected}")]
    FrameCount { expected: usize, got: usize },
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Solve translation and rotation corrections for every frame of `data`.
pub fn align_images(data: &Dataset, params: &AlignmentParams) -> Result<AlignmentSolution, AlignmentError> {
    let n = data.nb_frames();
    let rotations = match params.rotation {
        RotationReference::None => vec![0.0; n],
        RotationReference::TwoPoint { first, second } => two_point_rotations(data, first, second)?,
    };

    let mut references = Vec::with_capacity(n);
    for frame in 0..n {
        let r = reference_position(data, frame, params)?;
        references.push(rotation_matrix(rotations[frame]) * r.coords);
    }

    let origin = references.first().copied().unwrap_or_else(Vector2::zeros);
    let translations = references.iter().map(|r| origin - r).collect();
    info!("aligned {n} frames using {:?}", params.translation);
    Ok(AlignmentSolution {
        translations,
        rotations,
    })
}

/// Write the corrections into the frames' registration transforms.
pub fn apply_alignment(data: &mut Dataset, solution: &AlignmentSolution) -> Result<(), AlignmentError> {
    let expected = data.nb_frames();
    if solution.translations.len() != expected || solution.rotations.len() != expected {
        return Err(AlignmentError::FrameCount {
            expected,
            got: solution.translations.len().min(solution.rotations.len()),
        });
    }
    for (i, (t, r)) in solution
        .translations
        .iter()
        .zip(&solution.rotations)
        .enumerate()
    {
        data.frame_mut(i)?.registration = RigidTransform {
            shift: *t,
            rotation: *r,
        };
    }
    Ok(())
}

fn landmark(data: &Dataset, frame: usize, point: PointId) -> Result<Point2<f64>, AlignmentError> {
    data.position(frame, point)
        .ok_or_else(|| AlignmentError::MissingPoint {
            frame: data.frames()[frame].name.clone(),
            point,
        })
}

fn two_point_rotations(data: &Dataset, first: PointId, second: PointId) -> Result<Vec<f64>, AlignmentError> {
    if first == second {
        return Err(AlignmentError::SameLandmark(first));
    }
    let mut angles = Vec::with_capacity(data.nb_frames());
    for frame in 0..data.nb_frames() {
        let d = landmark(data, frame, second)? - landmark(data, frame, first)?;
        angles.push(d.y.atan2(d.x).to_degrees());
    }
    let reference = angles.first().copied().unwrap_or(0.0);
    Ok(angles.into_iter().map(|a| reference - a).collect())
}

fn reference_position(data: &Dataset, frame: usize, params: &AlignmentParams) -> Result<Point2<f64>, AlignmentError> {
    if let TranslationReference::Point(p) = params.translation {
        return landmark(data, frame, p);
    }
    let info = data.frame(frame)?;
    let pixels: Vec<Point2<f64>> = match &params.points {
        Some(ids) => ids
            .iter()
            .filter_map(|&p| data.position(frame, p))
            .map(|p| info.local_to_pixel(p))
            .collect(),
        None => data
            .points_in_frame(frame)
            .map(|(_, p)| info.local_to_pixel(p))
            .collect(),
    };
    let center = match params.translation {
        TranslationReference::BoundingBoxCenter => bounding_box_center(&pixels),
        _ => centroid(&pixels),
    };
    center
        .map(|c| info.pixel_to_local(c))
        .ok_or_else(|| AlignmentError::EmptyFrame {
            frame: info.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn rotated_dataset() -> (Dataset, [PointId; 3]) {
        let mut data = Dataset::new(vec![
            Frame::new("a", 0.0),
            Frame::new("b", 1.0),
            Frame::new("c", 2.0),
        ])
        .expect("dataset");
        let base = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(4.0, 6.0),
        ];
        let ids = [data.new_point_id(), data.new_point_id(), data.new_point_id()];
        for (frame, (angle, shift)) in [(0.0, Vector2::new(0.0, 0.0)), (30.0, Vector2::new(5.0, -3.0)), (-45.0, Vector2::new(-2.0, 7.0))]
            .into_iter()
            .enumerate()
        {
            let r = rotation_matrix(angle);
            for (id, p) in ids.iter().zip(base) {
                data.set_position(frame, *id, Point2::from(r * p.coords + shift))
                    .expect("pos");
            }
        }
        (data, ids)
    }

    #[test]
    fn two_point_alignment_registers_all_frames() {
        let (mut data, ids) = rotated_dataset();
        let params = AlignmentParams {
            translation: TranslationReference::Barycentre,
            rotation: RotationReference::TwoPoint {
                first: ids[0],
                second: ids[1],
            },
            points: None,
        };
        let solution = align_images(&data, &params).expect("solution");
        assert!((solution.rotations[1] + 30.0).abs() < 1e-9);
        assert!((solution.rotations[2] - 45.0).abs() < 1e-9);

        apply_alignment(&mut data, &solution).expect("apply");
        for id in ids {
            let p0 = data.reference_position(0, id).expect("p0");
            for frame in 1..3 {
                let p = data.reference_position(frame, id).expect("p");
                assert!((p - p0).norm() < 1e-9, "point {id} frame {frame}: {p} vs {p0}");
            }
        }
    }

    #[test]
    fn landmark_translation_names_missing_frame() {
        let (mut data, ids) = rotated_dataset();
        data.remove_position(2, ids[2]).expect("remove");
        let params = AlignmentParams {
            translation: TranslationReference::Point(ids[2]),
            rotation: RotationReference::None,
            points: None,
        };
        let err = align_images(&data, &params).unwrap_err();
        assert!(matches!(err, AlignmentError::MissingPoint { ref frame, point } if frame == "c" && point == ids[2]));
    }

    #[test]
    fn barycentre_is_taken_in_pixel_space() {
        let mut data = Dataset::new(vec![
            Frame::new("a", 0.0),
            Frame::new("b", 1.0).with_scale(0.5, 2.0),
        ])
        .expect("dataset");
        let pixels = [
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 0.0),
            Point2::new(20.0, 30.0),
        ];
        for px in pixels {
            let id = data.new_point_id();
            data.set_position(0, id, px).expect("a");
            let local = data.frames()[1].pixel_to_local(px + Vector2::new(6.0, -4.0));
            data.set_position(1, id, local).expect("b");
        }
        let params = AlignmentParams {
            translation: TranslationReference::Barycentre,
            rotation: RotationReference::None,
            points: None,
        };
        let solution = align_images(&data, &params).expect("solution");
        apply_alignment(&mut data, &solution).expect("apply");

        let center_px = Point2::new(26.0, 6.0);
        let b = &data.frames()[1];
        let registered = b.to_reference(b.pixel_to_local(center_px));
        assert!((registered - Point2::new(20.0, 10.0)).norm() < 1e-9, "{registered}");
    }

    #[test]
    fn bounding_box_translation_without_rotation() {
        let (data, _) = rotated_dataset();
        let params = AlignmentParams {
            translation: TranslationReference::BoundingBoxCenter,
            rotation: RotationReference::None,
            points: None,
        };
        let solution = align_images(&data, &params).expect("solution");
        assert_eq!(solution.translations[0], Vector2::zeros());
        assert!(solution.rotations.iter().all(|&r| r == 0.0));
    }
}
