//! Plot and biomass indexes: identifiers, the streaming record scanner,
//! the two lookup tables, and their on-disk store.

mod builder;
mod ids;
mod scan;
mod store;
mod tables;

pub use builder::{build_indexes, BuiltIndexes, IndexBuilder};
pub use ids::{PlotId, PolyKey};
pub use scan::{read_feature_at, FeatureScanner, RawFeature};
pub use store::{IndexStats, IndexStore};
pub use tables::{BiomassIndex, PlotEntry, PlotIndex};
