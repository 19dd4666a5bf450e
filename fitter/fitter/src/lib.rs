//! Scaffold-to-point-cloud alignment and fitting engine.
//!
//! This umbrella crate ties the engine together and re-exports the stack:
//!
//! - [`types`] - mesh, element, basis, field, and data-point types
//! - [`align`] - similarity transform estimation (Procrustes, auto-centre,
//!   axis swaps, mirror policy)
//! - [`project`] - closest-point projection of data onto the surface group
//! - [`solve`] - the smoothing-regularized deformation solver and fit loop
//! - [`FitterSession`] - the owned state and operation surface driven by
//!   the surrounding application
//!
//! # Workflow
//!
//! A session is loaded with a scaffold mesh and a scanned point cloud. The
//! alignment stage (auto-centre, scale estimate, one-shot rigid alignment,
//! manual edits) produces a rigid similarity transform and rebases the
//! working coordinate field; the fit stage alternates projection and
//! regularized linear solves, deforming the working field toward the data.
//!
//! ```
//! use fitter::FitterSession;
//! use fitter::types::{DataPointSet, Element, ElementBasis, ElementShape, Node, ScaffoldMesh};
//! use nalgebra::Point3;
//!
//! // A single 1-D element from (0,0,0) to (1,0,0).
//! let nodes = vec![
//!     Node::at(1, Point3::new(0.0, 0.0, 0.0)),
//!     Node::at(2, Point3::new(1.0, 0.0, 0.0)),
//! ];
//! let elements = vec![Element::new(1, ElementShape::Line, ElementBasis::Linear, vec![1, 2])];
//! let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
//!
//! let mut session = FitterSession::new();
//! session.set_mesh(mesh);
//! session.set_data_points(DataPointSet::new(vec![Point3::new(0.5, 1.0, 0.0)]));
//!
//! // Auto-centre moves the element midpoint onto the data point.
//! session.auto_centre().unwrap();
//! let pass = session.project().unwrap();
//! assert!(pass.rms < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod session;
mod state;

pub use error::{FitterError, FitterResult};
pub use session::FitterSession;
pub use state::{FitPhase, FitState};

/// Core mesh, basis, field, and data-point types.
pub use fitter_types as types;

/// Similarity transform estimation and editing.
pub use fitter_align as align;

/// Closest-point projection onto the surface group.
pub use fitter_project as project;

/// Regularized deformation solver and fit loop.
pub use fitter_solve as solve;
