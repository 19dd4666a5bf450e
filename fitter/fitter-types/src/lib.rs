//! Core types for scaffold fitting.
//!
//! This crate provides the foundational data model shared by the alignment,
//! projection, and fit-solve crates:
//!
//! - [`Node`] / [`NodeParameters`] - A mesh node with coordinates and optional
//!   derivative vectors
//! - [`Element`] - A 1-, 2-, or 3-dimensional element referencing nodes
//! - [`ScaffoldMesh`] - A validated node/element mesh with geometric evaluation
//! - [`CoordinateField`] - Per-node coordinate parameters (reference or working)
//! - [`DataPointSet`] - Unordered 3D scan points with an active mask
//! - [`SurfaceGroup`] - The element subset used as a projection target
//! - [`Aabb`] - Axis-aligned bounding box
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64` and the
//! coordinate dimensionality is fixed at 3 for the whole mesh.
//!
//! # Coordinate fields
//!
//! A mesh captures an immutable *reference* field at construction time; the
//! mutable *working* field used during alignment and fitting is a
//! [`CoordinateField`] owned by the caller. Geometric evaluation
//! ([`ScaffoldMesh::element_position`], [`ScaffoldMesh::element_jacobian`])
//! takes the field explicitly so the same mesh topology can be evaluated
//! against either field.
//!
//! # Example
//!
//! ```
//! use fitter_types::{Element, ElementBasis, ElementShape, Node, ScaffoldMesh};
//! use nalgebra::Point3;
//!
//! let nodes = vec![
//!     Node::at(1, Point3::new(0.0, 0.0, 0.0)),
//!     Node::at(2, Point3::new(1.0, 0.0, 0.0)),
//! ];
//! let elements = vec![Element::new(1, ElementShape::Line, ElementBasis::Linear, vec![1, 2])];
//!
//! let mesh = ScaffoldMesh::new(nodes, elements).unwrap();
//! let mid = mesh
//!     .element_position(0, mesh.reference_field(), &[0.5, 0.0, 0.0])
//!     .unwrap();
//! assert!((mid.x - 0.5).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod basis;
mod bounds;
mod element;
mod error;
mod field;
mod group;
mod mesh;
mod node;
mod points;

pub use basis::BasisEval;
pub use bounds::Aabb;
pub use element::{Element, ElementBasis, ElementShape};
pub use error::{MeshError, MeshResult};
pub use field::CoordinateField;
pub use group::SurfaceGroup;
pub use mesh::ScaffoldMesh;
pub use node::{DerivativeSlot, Node, NodeParameters};
pub use points::DataPointSet;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
