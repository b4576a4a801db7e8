pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::storage::{FileSystemRegistry, LocalFileSystem, MemoryFileSystem};
pub use config::CatalogConfig;
pub use core::{
    AnyData, AnyDataset, CatalogOptions, DataCatalog, Dataset, FitsDataset, FitsDatasetConfig,
    MapDataset, MapDatasetConfig, Version,
};
pub use domain::{header::Header, model::ImageHdu, solar_map::SolarMap};
pub use utils::error::{DatasetError, ErrorKind, Result};
