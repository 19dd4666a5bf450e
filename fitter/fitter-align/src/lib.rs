//! Rigid similarity alignment of a scaffold mesh to scan data.
//!
//! This crate estimates and maintains the transform that carries the
//! reference scaffold pose into the space of a scanned point cloud:
//!
//! - [`AlignmentTransform`] - rotation + translation + uniform scale +
//!   optional mirror, applied as `x' = scale * R * M * x + t`
//! - [`compute_similarity_transform`] - closed-form orthogonal Procrustes
//!   solve over weighted correspondence pairs, with an explicit policy for
//!   reflected best fits
//! - [`AlignmentEstimator`] - interactive state: reset, auto-centre, initial
//!   scale estimate, rigid alignment, axis swaps, manual parameter edits,
//!   and a single change observer
//!
//! # Quick Start
//!
//! ```
//! use fitter_align::{AlignmentEstimator, CorrespondencePair};
//! use fitter_types::{CoordinateField, DataPointSet, NodeParameters};
//! use nalgebra::Point3;
//!
//! let model = CoordinateField::new(vec![
//!     NodeParameters::new(Point3::new(0.0, 0.0, 0.0)),
//!     NodeParameters::new(Point3::new(1.0, 0.0, 0.0)),
//! ]);
//! let data = DataPointSet::new(vec![
//!     Point3::new(10.0, 0.0, 0.0),
//!     Point3::new(11.0, 0.0, 0.0),
//! ]);
//!
//! let mut estimator = AlignmentEstimator::new();
//! estimator.auto_centre(&model, &data).unwrap();
//! assert!((estimator.offset().x - 10.0).abs() < 1e-12);
//! ```
//!
//! # Mirror policy
//!
//! A reflected best-fit rotation (determinant −1) is never silently
//! corrected. With mirroring disabled (the default) the solve fails with
//! [`AlignError::MirrorRequired`]; with mirroring enabled the reflection is
//! folded into the transform's mirror flag and the stored rotation stays
//! proper.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod estimator;
mod procrustes;
mod transform;

pub use error::{AlignError, AlignResult};
pub use estimator::{
    AlignmentEstimator, AxisPair, ChangeCallback, RigidAlignOutcome,
};
pub use procrustes::{compute_similarity_transform, rms_residual, CorrespondencePair};
pub use transform::AlignmentTransform;
