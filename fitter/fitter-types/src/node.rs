//! Mesh nodes and their coordinate parameters.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A derivative parameter slot carried by a node.
///
/// Derivatives are taken with respect to the element-local coordinates
/// (one unit of local coordinate per slot direction). Only Hermite bases
/// reference derivative slots; Lagrange bases use [`DerivativeSlot::Value`]
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DerivativeSlot {
    /// The coordinate value itself.
    Value,
    /// First derivative along the first local direction.
    D1,
    /// First derivative along the second local direction.
    D2,
    /// First derivative along the third local direction.
    D3,
    /// Cross derivative over the first and second local directions.
    D12,
    /// Cross derivative over the first and third local directions.
    D13,
    /// Cross derivative over the second and third local directions.
    D23,
    /// Cross derivative over all three local directions.
    D123,
}

impl DerivativeSlot {
    /// All slots in storage order.
    pub const ALL: [Self; 8] = [
        Self::Value,
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D12,
        Self::D13,
        Self::D23,
        Self::D123,
    ];

    /// Index of this slot in [`NodeParameters`] derivative storage.
    ///
    /// [`DerivativeSlot::Value`] has no derivative-storage index.
    #[must_use]
    pub const fn derivative_index(self) -> Option<usize> {
        match self {
            Self::Value => None,
            Self::D1 => Some(0),
            Self::D2 => Some(1),
            Self::D3 => Some(2),
            Self::D12 => Some(3),
            Self::D13 => Some(4),
            Self::D23 => Some(5),
            Self::D123 => Some(6),
        }
    }

    /// The slot for a set of local directions, given as a bitmask
    /// (bit k set = direction k participates).
    ///
    /// An empty mask is the value slot.
    #[must_use]
    pub const fn from_direction_mask(mask: u8) -> Self {
        match mask {
            0b001 => Self::D1,
            0b010 => Self::D2,
            0b100 => Self::D3,
            0b011 => Self::D12,
            0b101 => Self::D13,
            0b110 => Self::D23,
            0b111 => Self::D123,
            _ => Self::Value,
        }
    }

    /// Whether the given local direction participates in this slot.
    #[must_use]
    pub const fn involves_direction(self, dim: usize) -> bool {
        let mask: u8 = match self {
            Self::Value => 0,
            Self::D1 => 0b001,
            Self::D2 => 0b010,
            Self::D3 => 0b100,
            Self::D12 => 0b011,
            Self::D13 => 0b101,
            Self::D23 => 0b110,
            Self::D123 => 0b111,
        };
        mask & (1 << dim) != 0
    }
}

/// The coordinate parameters of a single node: a position and optional
/// derivative vectors.
///
/// # Example
///
/// ```
/// use fitter_types::{DerivativeSlot, NodeParameters};
/// use nalgebra::{Point3, Vector3};
///
/// let params = NodeParameters::new(Point3::new(1.0, 2.0, 3.0))
///     .with_derivative(DerivativeSlot::D1, Vector3::x());
///
/// assert!(params.derivative(DerivativeSlot::D1).is_some());
/// assert!(params.derivative(DerivativeSlot::D2).is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeParameters {
    /// The node position.
    pub position: Point3<f64>,
    /// Derivative vectors, indexed per [`DerivativeSlot::derivative_index`].
    derivatives: [Option<Vector3<f64>>; 7],
}

impl NodeParameters {
    /// Create parameters holding only a position.
    #[must_use]
    pub const fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            derivatives: [None; 7],
        }
    }

    /// Set a derivative vector (builder style).
    ///
    /// Setting [`DerivativeSlot::Value`] replaces the position.
    #[must_use]
    pub fn with_derivative(mut self, slot: DerivativeSlot, vector: Vector3<f64>) -> Self {
        self.set_derivative(slot, vector);
        self
    }

    /// Set a derivative vector in place.
    pub fn set_derivative(&mut self, slot: DerivativeSlot, vector: Vector3<f64>) {
        match slot.derivative_index() {
            Some(i) => self.derivatives[i] = Some(vector),
            None => self.position = Point3::from(vector),
        }
    }

    /// Get a derivative vector, or `None` if the slot is not populated.
    #[must_use]
    pub fn derivative(&self, slot: DerivativeSlot) -> Option<Vector3<f64>> {
        match slot.derivative_index() {
            Some(i) => self.derivatives[i],
            None => Some(self.position.coords),
        }
    }

    /// The parameter vector for a slot, with missing derivatives read as zero.
    ///
    /// Basis evaluation uses this accessor; mesh validation guarantees that
    /// slots an element's basis requires are populated.
    #[must_use]
    pub fn slot_vector(&self, slot: DerivativeSlot) -> Vector3<f64> {
        match slot.derivative_index() {
            Some(i) => self.derivatives[i].unwrap_or_else(Vector3::zeros),
            None => self.position.coords,
        }
    }

    /// Whether the slot is populated.
    #[must_use]
    pub fn has_slot(&self, slot: DerivativeSlot) -> bool {
        match slot.derivative_index() {
            Some(i) => self.derivatives[i].is_some(),
            None => true,
        }
    }
}

/// A mesh node: an identifier plus coordinate parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    /// Node identifier, unique within a mesh.
    pub id: u32,
    /// The node's coordinate parameters.
    pub params: NodeParameters,
}

impl Node {
    /// Create a node from an id and parameters.
    #[must_use]
    pub const fn new(id: u32, params: NodeParameters) -> Self {
        Self { id, params }
    }

    /// Create a node holding only a position.
    #[must_use]
    pub const fn at(id: u32, position: Point3<f64>) -> Self {
        Self {
            id,
            params: NodeParameters::new(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_roundtrip() {
        for slot in DerivativeSlot::ALL {
            if let Some(i) = slot.derivative_index() {
                assert!(i < 7);
            }
        }
        assert_eq!(DerivativeSlot::from_direction_mask(0b011), DerivativeSlot::D12);
        assert_eq!(DerivativeSlot::from_direction_mask(0), DerivativeSlot::Value);
    }

    #[test]
    fn involves_direction() {
        assert!(DerivativeSlot::D1.involves_direction(0));
        assert!(!DerivativeSlot::D1.involves_direction(1));
        assert!(DerivativeSlot::D13.involves_direction(2));
        assert!(DerivativeSlot::D123.involves_direction(1));
        assert!(!DerivativeSlot::Value.involves_direction(0));
    }

    #[test]
    fn missing_derivative_reads_zero() {
        let params = NodeParameters::new(Point3::new(1.0, 2.0, 3.0));
        assert_eq!(params.slot_vector(DerivativeSlot::D2), Vector3::zeros());
        assert_eq!(
            params.slot_vector(DerivativeSlot::Value),
            Vector3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn set_and_get_derivative() {
        let mut params = NodeParameters::new(Point3::origin());
        params.set_derivative(DerivativeSlot::D12, Vector3::new(0.0, 1.0, 0.0));
        assert!(params.has_slot(DerivativeSlot::D12));
        assert_eq!(
            params.derivative(DerivativeSlot::D12),
            Some(Vector3::new(0.0, 1.0, 0.0))
        );
    }
}
