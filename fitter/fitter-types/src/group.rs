//! Surface groups: the element subset used as a projection target.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A selection of mesh elements designated as valid projection targets,
/// e.g. exterior faces only.
///
/// Defaults to all elements when the caller does not narrow it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SurfaceGroup {
    /// Every element of the mesh is a projection target.
    #[default]
    All,
    /// Only the listed element ids are projection targets.
    Elements(Vec<u32>),
}

impl SurfaceGroup {
    /// Create a group from explicit element ids.
    #[must_use]
    pub fn from_elements(ids: impl IntoIterator<Item = u32>) -> Self {
        Self::Elements(ids.into_iter().collect())
    }

    /// Whether the group explicitly selects no elements.
    ///
    /// [`SurfaceGroup::All`] is only empty against an empty mesh, which the
    /// resolution step reports.
    #[must_use]
    pub fn is_explicitly_empty(&self) -> bool {
        matches!(self, Self::Elements(ids) if ids.is_empty())
    }
}
