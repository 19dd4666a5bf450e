//! Closest-point projection of scan data onto scaffold mesh elements.
//!
//! For every active data point this crate finds the closest location on the
//! current surface group: the winning element, the local coordinates within
//! it, the projected position, and the residual back to the data point.
//! Linear lines, triangles, and tetrahedra use exact closed forms; curved
//! bases minimize the distance over local coordinates with a damped,
//! domain-clamped Gauss-Newton search.
//!
//! # Determinism
//!
//! Candidate elements are swept in ascending storage order and equal minimal
//! distances resolve to the lowest element id, so a pass over identical
//! inputs is bit-identical run to run. A k-d tree over element centroids
//! prunes candidates without changing the result.
//!
//! # Failure policy
//!
//! Per-point trouble never aborts a pass: a local search that fails to
//! converge within its iteration cap, or a distance beyond the outlier
//! threshold, flags that point as an outlier for the current pass only.
//! Pass-level errors are an empty surface group, an empty active point set,
//! and mesh/field mismatches.
//!
//! # Example
//!
//! ```
//! use fitter_project::{project_points, ProjectorParams};
//! use fitter_types::{
//!     DataPointSet, Element, ElementBasis, ElementShape, Node, ScaffoldMesh, SurfaceGroup,
//! };
//! use nalgebra::Point3;
//!
//! let nodes = vec![
//!     Node::at(1, Point3::new(0.0, 0.0, 0.0)),
//!     Node::at(2, Point3::new(1.0, 0.0, 0.0)),
//!     Node::at(3, Point3::new(0.0, 1.0, 0.0)),
//! ];
//! let elements = vec![Element::new(
//!     1,
//!     ElementShape::Triangle,
//!     ElementBasis::Linear,
//!     vec![1, 2, 3],
//! )];
//! let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
//! let data = DataPointSet::new(vec![Point3::new(0.25, 0.25, 1.0)]);
//!
//! let pass = project_points(
//!     &mesh,
//!     mesh.reference_field(),
//!     &data,
//!     &SurfaceGroup::All,
//!     &ProjectorParams::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(pass.accepted, 1);
//! assert!((pass.rms - 1.0).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod closest;
mod error;
mod params;
mod project;

pub use error::{ProjectError, ProjectResult};
pub use params::ProjectorParams;
pub use project::{project_points, ProjectionPass, ProjectionResult};
