pub mod catalog;
pub mod datasets;
pub mod fits;
pub mod protocol;
pub mod version;

pub use crate::domain::ports::{Dataset, Description, FileSystem};
pub use crate::utils::error::Result;
pub use catalog::{AnyData, AnyDataset, CatalogOptions, DataCatalog};
pub use datasets::{FitsDataset, FitsDatasetConfig, MapDataset, MapDatasetConfig};
pub use version::Version;
