//! Mesh elements: shape, basis, and node references.

use crate::DerivativeSlot;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The geometric shape of an element's local coordinate domain.
///
/// Tensor-product shapes (line, quad, hexahedron) use local coordinates in
/// `[0, 1]` per direction; simplex shapes (triangle, tetrahedron) use
/// barycentric-style coordinates with `sum(xi) <= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementShape {
    /// 1-D line element.
    Line,
    /// 2-D triangular element.
    Triangle,
    /// 2-D quadrilateral element.
    Quad,
    /// 3-D tetrahedral element.
    Tetrahedron,
    /// 3-D hexahedral element.
    Hexahedron,
}

impl ElementShape {
    /// The dimension of the local coordinate domain (1, 2, or 3).
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::Line => 1,
            Self::Triangle | Self::Quad => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    /// Whether the shape is a tensor product of line directions.
    #[must_use]
    pub const fn is_tensor(self) -> bool {
        matches!(self, Self::Line | Self::Quad | Self::Hexahedron)
    }
}

/// The interpolation basis of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementBasis {
    /// Linear Lagrange (tensor shapes) / linear simplex interpolation.
    Linear,
    /// Quadratic Lagrange interpolation. Supported on lines and triangles.
    Quadratic,
    /// Cubic Hermite interpolation using value + derivative node parameters.
    /// Supported on tensor-product shapes (line, quad, hexahedron).
    CubicHermite,
}

impl ElementBasis {
    /// Whether this basis is supported on the given shape.
    #[must_use]
    pub const fn supports(self, shape: ElementShape) -> bool {
        match self {
            Self::Linear => true,
            Self::Quadratic => matches!(shape, ElementShape::Line | ElementShape::Triangle),
            Self::CubicHermite => shape.is_tensor(),
        }
    }

    /// The number of nodes an element with this shape and basis references.
    #[must_use]
    pub const fn node_count(self, shape: ElementShape) -> usize {
        match (self, shape) {
            (Self::Linear | Self::CubicHermite, ElementShape::Line) => 2,
            (Self::Quadratic, ElementShape::Line) | (Self::Linear, ElementShape::Triangle) => 3,
            (Self::Quadratic, ElementShape::Triangle) => 6,
            (Self::Linear, ElementShape::Quad | ElementShape::Tetrahedron)
            | (Self::CubicHermite, ElementShape::Quad) => 4,
            (Self::Linear | Self::CubicHermite, ElementShape::Hexahedron) => 8,
            // Unsupported combinations; callers validate with `supports` first.
            _ => 0,
        }
    }

    /// The node parameter slots this basis reads, in storage order.
    ///
    /// Lagrange bases read only the value slot; Hermite bases read the value
    /// plus every derivative combination of the shape's local directions.
    #[must_use]
    pub const fn dof_slots(self, shape: ElementShape) -> &'static [DerivativeSlot] {
        use DerivativeSlot as S;
        match self {
            Self::Linear | Self::Quadratic => &[S::Value],
            Self::CubicHermite => match shape.dimension() {
                1 => &[S::Value, S::D1],
                2 => &[S::Value, S::D1, S::D2, S::D12],
                _ => &[
                    S::Value,
                    S::D1,
                    S::D2,
                    S::D3,
                    S::D12,
                    S::D13,
                    S::D23,
                    S::D123,
                ],
            },
        }
    }
}

/// A mesh element: an id, shape/basis descriptor, and ordered node ids.
///
/// Tensor-product node ordering runs the first local direction fastest:
/// a quad lists `(0,0), (1,0), (0,1), (1,1)`, a hexahedron appends the
/// `xi3 = 1` layer in the same order. Quadratic lines list their nodes at
/// `xi = 0, 1/2, 1`. Quadratic triangles list the three corners followed by
/// the midsides of edges 0-1, 1-2, 0-2.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Element {
    /// Element identifier, unique within a mesh.
    pub id: u32,
    /// The local coordinate domain.
    pub shape: ElementShape,
    /// The interpolation basis.
    pub basis: ElementBasis,
    /// Node ids in local order.
    pub nodes: Vec<u32>,
}

impl Element {
    /// Create an element.
    #[must_use]
    pub const fn new(id: u32, shape: ElementShape, basis: ElementBasis, nodes: Vec<u32>) -> Self {
        Self {
            id,
            shape,
            basis,
            nodes,
        }
    }

    /// The element dimension (1, 2, or 3).
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.shape.dimension()
    }

    /// The node parameter slots this element's basis reads.
    #[must_use]
    pub const fn dof_slots(&self) -> &'static [DerivativeSlot] {
        self.basis.dof_slots(self.shape)
    }
}

/// Clamp local coordinates into the element's valid domain.
///
/// Tensor shapes clamp per-direction to `[0, 1]`; simplex shapes clamp the
/// active coordinates to the unit simplex.
#[must_use]
pub(crate) fn clamp_local(shape: ElementShape, xi: [f64; 3]) -> [f64; 3] {
    let dim = shape.dimension();
    let mut out = [0.0; 3];
    if shape.is_tensor() {
        for d in 0..dim {
            out[d] = xi[d].clamp(0.0, 1.0);
        }
        return out;
    }

    // Simplex: clamp each coordinate to [0, 1], then project onto the
    // half-space sum(xi) <= 1 and re-clamp. Two passes are exact for the
    // unit simplex.
    for d in 0..dim {
        out[d] = xi[d].clamp(0.0, 1.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let excess = (out.iter().take(dim).sum::<f64>() - 1.0) / dim as f64;
    if excess > 0.0 {
        for value in out.iter_mut().take(dim) {
            *value = (*value - excess).clamp(0.0, 1.0);
        }
        let sum: f64 = out.iter().take(dim).sum();
        if sum > 1.0 {
            for value in out.iter_mut().take(dim) {
                *value /= sum;
            }
        }
    }
    out
}
