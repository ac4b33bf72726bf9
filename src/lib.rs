//! # Quake Forge
//!
//! Logic-tree realization association and parallel source processing for
//! composite seismic source models.
//!
//! ## Features
//!
//! - **Composite Models**: Source model branches split into groups by tectonic region type
//! - **Realizations**: Enumeration or seeded sampling of per-branch GSIM logic trees
//! - **Association**: Reverse index from (group, GSIM) to realizations, with aggregation operators
//! - **Oversampling**: Collection IDs routing stochastic results to the right draw
//! - **Processing**: Filter and split sources on a rayon pool, light sources on the caller
//! - **Metrics**: Prometheus-compatible processing telemetry
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quake_forge::prelude::*;
//!
//! fn main() -> quake_forge::Result<()> {
//!     let gsim_lt = BranchSetTree::new()
//!         .with_branch_set("Active Shallow Crust", vec![
//!             Branch::new("b11", "BooreAtkinson2008", 0.6),
//!             Branch::new("b12", "ChiouYoungs2008", 0.4),
//!         ])?
//!         .into_shared();
//!
//!     let mut csm = CompositeBuilder::new()
//!         .source_model(
//!             SourceModelBranch::new("source_model.xml", gsim_lt)
//!                 .with_path(vec!["b1"])
//!                 .with_sources(my_sources()),
//!         )
//!         .build()?;
//!
//!     let processor = SourceProcessor::new(ProcessorConfig::default());
//!     processor.process(&mut csm, &RayonTaskManager::new(0)?)?;
//!
//!     let assoc = csm.rlzs_assoc()?;
//!     let curves = assoc.combine_curves(&results_by_key, 20);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod assoc;
pub mod builder;
pub mod composite;
pub mod composition;
pub mod config;
pub mod error;
pub mod logictree;
pub mod metrics;
pub mod processor;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for ergonomic API
pub use assoc::{agg_prob, collection_id_from_tag, AssocKey, Realization, RlzsAssoc};
pub use builder::{CompositeBuilder, SourceModelBranch};
pub use composite::CompositeSourceModel;
pub use composition::{CompositionInfo, ModelSummary};
pub use config::{CalculationConfig, ProcessorConfig, SamplingConfig};
pub use error::{CompositeError, Result};
pub use logictree::{Branch, BranchSetTree, BoxedChoiceTree, ChoicePath, ChoiceTree};
pub use metrics::{ProcessorMetrics, Timer};
pub use processor::{
    ProcessedSources, ProcessingReport, ProcessingTimes, RayonTaskManager, SequentialTaskManager,
    SiteFilter, SourceInfo, SourceProcessor, TaskManager,
};
pub use source::{source_weight, Source, SourceGroup, SourceModel};
pub use types::{CollectionId, CostClass, GroupId, SourceKind, POINT_SOURCE_WEIGHT};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assoc::{AssocKey, RlzsAssoc};
    pub use crate::builder::{CompositeBuilder, SourceModelBranch};
    pub use crate::config::{CalculationConfig, ProcessorConfig, SamplingConfig};
    pub use crate::error::Result;
    pub use crate::logictree::{Branch, BranchSetTree, ChoiceTree};
    pub use crate::processor::{RayonTaskManager, SequentialTaskManager, SiteFilter, SourceProcessor};
    pub use crate::source::{Source, SourceGroup};
    pub use crate::types::{GroupId, SourceKind};
}
