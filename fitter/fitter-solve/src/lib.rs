//! Smoothing-regularized least-squares deformation of a scaffold mesh.
//!
//! Each fit round projects the active data points onto the current surface
//! (via `fitter-project`), builds the sparse normal equations for the
//! per-node displacement that minimizes the accepted residuals plus a
//! bending-energy smoothing penalty, and commits the solved update to the
//! working coordinate field. [`fit`] alternates rounds until the relative
//! RMS improvement drops below the tolerance or the round cap is reached.
//!
//! # System structure
//!
//! Unknowns are scalar displacements per (node, parameter-slot), shared by
//! the three coordinate components, so one symmetric sparse matrix serves
//! three right-hand sides. Each node's equations couple only to
//! topologically adjacent nodes, which keeps the matrix sparse; the solve is
//! Jacobi-preconditioned conjugate gradients over a CSR matrix assembled by
//! triplet accumulation.
//!
//! # Failure semantics
//!
//! A singular system (e.g. a mesh region with no data coverage and zero
//! smoothing) aborts the round with [`SolveError::SingularSystem`]; the
//! working field is only mutated after all three component solves succeed,
//! so a failed round never leaves it partially updated.
//!
//! # Example
//!
//! ```
//! use fitter_solve::{fit, FitParams};
//! use fitter_types::{
//!     DataPointSet, Element, ElementBasis, ElementShape, Node, ScaffoldMesh, SurfaceGroup,
//! };
//! use nalgebra::Point3;
//!
//! let nodes = vec![
//!     Node::at(1, Point3::new(0.0, 0.0, 0.0)),
//!     Node::at(2, Point3::new(1.0, 0.0, 0.0)),
//! ];
//! let elements = vec![Element::new(1, ElementShape::Line, ElementBasis::Linear, vec![1, 2])];
//! let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
//!
//! let mut working = mesh.working_field();
//! let data = DataPointSet::new(vec![
//!     Point3::new(0.0, 0.5, 0.0),
//!     Point3::new(1.0, 0.5, 0.0),
//! ]);
//!
//! let params = FitParams::new().with_smoothing_weight(0.0);
//! let report = fit(&mesh, &mut working, &data, &SurfaceGroup::All, &params).unwrap();
//! assert!(report.final_rms < 1e-9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod adjacency;
mod error;
mod solve;
mod system;

pub use error::{SolveError, SolveResult};
pub use solve::{fit, fit_round, FitOutcome, FitParams, FitReport, RoundReport};
