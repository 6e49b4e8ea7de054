mod handle;
mod index;
mod item;
mod policy;

pub use handle::CatalogHandle;
pub use index::{
    AccessoryCatalog, CatalogLoadError, FilteredAccessory, ResolutionResult, ResolveOptions,
    SearchResult, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};
pub use item::{AccessoryItem, AccessorySummary};
pub use policy::{Exclusion, MountabilityPolicy, PolicyLoadError};
