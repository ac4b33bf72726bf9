//! Core types for quake-forge
//!
//! ## Table of Contents
//! - **GroupId**: Numeric identifier of a source group, used as a join key
//! - **CollectionId**: Identifier of a stochastic event set collection
//! - **SourceKind**: Closed set of source typologies
//! - **CostClass**: Processing cost class derived from the kind

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of a point source rupture relative to other typologies
pub const POINT_SOURCE_WEIGHT: f64 = 1.0 / 40.0;

/// Identifier of a source group; 0 means unassigned
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(pub u32);

impl GroupId {
    /// Create a new GroupId
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for GroupId {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Identifier of a collection, one per (group, sample) of an oversampled model
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Create a new CollectionId
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CollectionId {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Processing cost class of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostClass {
    /// Cheap to filter and split, processed on the calling thread
    Light,
    /// Expensive, dispatched to the worker pool
    Heavy,
}

/// Source typology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Single hypocentral location
    Point,
    /// Areal zone of distributed seismicity
    Area,
    /// Planar fault
    SimpleFault,
    /// Fault with an arbitrary surface
    ComplexFault,
    /// Characteristic rupture on a fixed surface
    Characteristic,
    /// Explicit list of ruptures with probabilities
    NonParametric,
}

impl SourceKind {
    /// Cost class used to route the source during processing
    pub fn cost_class(self) -> CostClass {
        match self {
            Self::Point | Self::Area => CostClass::Light,
            _ => CostClass::Heavy,
        }
    }

    /// Multiplier applied to the rupture count to obtain the source weight
    pub fn weight_factor(self) -> f64 {
        match self {
            Self::Point => POINT_SOURCE_WEIGHT,
            _ => 1.0,
        }
    }

    /// Static name of the typology
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "PointSource",
            Self::Area => "AreaSource",
            Self::SimpleFault => "SimpleFaultSource",
            Self::ComplexFault => "ComplexFaultSource",
            Self::Characteristic => "CharacteristicFaultSource",
            Self::NonParametric => "NonParametricSeismicSource",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
