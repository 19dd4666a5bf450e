//! Error types for mesh construction and evaluation.

use crate::DerivativeSlot;
use thiserror::Error;

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors raised while building or evaluating a scaffold mesh.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MeshError {
    /// Two nodes share the same id.
    #[error("duplicate node id {id}")]
    DuplicateNodeId {
        /// The repeated id.
        id: u32,
    },

    /// Two elements share the same id.
    #[error("duplicate element id {id}")]
    DuplicateElementId {
        /// The repeated id.
        id: u32,
    },

    /// An element references a node id that does not exist.
    #[error("element {element} references unknown node {node}")]
    UnknownNode {
        /// The referencing element id.
        element: u32,
        /// The missing node id.
        node: u32,
    },

    /// An element's node list does not match its shape/basis node count.
    #[error("element {element} has {got} nodes, its shape and basis require {expected}")]
    NodeCountMismatch {
        /// The element id.
        element: u32,
        /// Required node count.
        expected: usize,
        /// Provided node count.
        got: usize,
    },

    /// An element's basis is not supported on its shape.
    #[error("element {element} combines an unsupported shape and basis")]
    UnsupportedBasis {
        /// The element id.
        element: u32,
    },

    /// A node lacks a derivative slot required by an element's basis.
    #[error("node {node} is missing derivative {slot:?} required by element {element}")]
    MissingDerivative {
        /// The element id.
        element: u32,
        /// The node id.
        node: u32,
        /// The missing slot.
        slot: DerivativeSlot,
    },

    /// A surface group references an element id that does not exist.
    #[error("surface group references unknown element {id}")]
    UnknownElement {
        /// The missing element id.
        id: u32,
    },

    /// An element index is out of range.
    #[error("element index {index} out of range for mesh with {count} elements")]
    ElementIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of elements.
        count: usize,
    },

    /// A coordinate field does not match the mesh's node count.
    #[error("coordinate field has {field_len} entries, mesh has {node_count} nodes")]
    FieldSizeMismatch {
        /// Entries in the field.
        field_len: usize,
        /// Nodes in the mesh.
        node_count: usize,
    },
}
