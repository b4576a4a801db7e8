use crate::adapters::storage::FileSystemRegistry;
use crate::config::catalog::{CatalogConfig, DatasetEntry};
use crate::core::datasets::{FitsDataset, MapDataset};
use crate::domain::model::ImageHdu;
use crate::domain::ports::{Dataset, Description};
use crate::domain::solar_map::SolarMap;
use crate::utils::error::{DatasetError, Result};
use crate::utils::validation::Validate;
use std::collections::BTreeMap;
use std::fmt;

/// Any dataset the catalog can hold.
#[derive(Debug)]
pub enum AnyDataset {
    Fits(FitsDataset),
    Map(MapDataset),
}

/// Data loaded from, or to be saved to, an `AnyDataset`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyData {
    Hdu(ImageHdu),
    Map(SolarMap),
}

impl AnyDataset {
    pub fn type_name(&self) -> &'static str {
        match self {
            AnyDataset::Fits(_) => "FitsDataset",
            AnyDataset::Map(_) => "MapDataset",
        }
    }

    pub fn load(&self) -> Result<AnyData> {
        match self {
            AnyDataset::Fits(dataset) => dataset.load().map(AnyData::Hdu),
            AnyDataset::Map(dataset) => dataset.load().map(AnyData::Map),
        }
    }

    pub fn save(&self, data: &AnyData) -> Result<()> {
        match (self, data) {
            (AnyDataset::Fits(dataset), AnyData::Hdu(hdu)) => dataset.save(hdu),
            (AnyDataset::Map(dataset), AnyData::Map(map)) => dataset.save(map),
            (dataset, _) => Err(DatasetError::config(format!(
                "{} cannot save {} data",
                dataset.type_name(),
                data.type_name()
            ))),
        }
    }

    pub fn exists(&self) -> Result<bool> {
        match self {
            AnyDataset::Fits(dataset) => dataset.exists(),
            AnyDataset::Map(dataset) => dataset.exists(),
        }
    }

    pub fn describe(&self) -> Description {
        match self {
            AnyDataset::Fits(dataset) => dataset.describe(),
            AnyDataset::Map(dataset) => dataset.describe(),
        }
    }

    pub fn release(&self) {
        match self {
            AnyDataset::Fits(dataset) => dataset.release(),
            AnyDataset::Map(dataset) => dataset.release(),
        }
    }
}

impl AnyData {
    pub fn type_name(&self) -> &'static str {
        match self {
            AnyData::Hdu(_) => "image HDU",
            AnyData::Map(_) => "solar map",
        }
    }
}

impl From<FitsDataset> for AnyDataset {
    fn from(dataset: FitsDataset) -> Self {
        AnyDataset::Fits(dataset)
    }
}

impl From<MapDataset> for AnyDataset {
    fn from(dataset: MapDataset) -> Self {
        AnyDataset::Map(dataset)
    }
}

impl fmt::Display for AnyDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyDataset::Fits(dataset) => fmt::Display::fmt(dataset, f),
            AnyDataset::Map(dataset) => fmt::Display::fmt(dataset, f),
        }
    }
}

/// Run-wide version choices applied when a catalog is built.
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    /// Pinned load version per dataset name.
    pub load_versions: BTreeMap<String, String>,
    /// One save version shared by every versioned dataset of the run.
    pub save_version: Option<String>,
}

/// Named datasets, addressed by the pipeline through their names.
#[derive(Debug, Default)]
pub struct DataCatalog {
    datasets: BTreeMap<String, AnyDataset>,
}

impl DataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CatalogConfig, options: &CatalogOptions) -> Result<Self> {
        Self::from_config_with_registry(config, options, &FileSystemRegistry::default())
    }

    pub fn from_config_with_registry(
        config: &CatalogConfig,
        options: &CatalogOptions,
        registry: &FileSystemRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let unknown: Vec<&str> = options
            .load_versions
            .keys()
            .filter(|name| !config.datasets.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(DatasetError::config(format!(
                "load_versions names datasets missing from the catalog: {}",
                unknown.join(", ")
            )));
        }

        let mut catalog = Self::new();
        for (name, entry) in &config.datasets {
            let version = entry.common().version(
                options.load_versions.get(name).map(String::as_str),
                options.save_version.as_deref(),
            );
            let dataset: AnyDataset = match entry {
                DatasetEntry::Fits(fits) => {
                    FitsDataset::with_registry(fits.to_config(name, version)?, registry)?.into()
                }
                DatasetEntry::Map(map) => {
                    MapDataset::with_registry(map.to_config(version), registry)?.into()
                }
            };
            tracing::debug!("Registered dataset '{}': {}", name, dataset);
            catalog.add(name, dataset)?;
        }
        tracing::info!("Catalog ready with {} dataset(s)", catalog.datasets.len());
        Ok(catalog)
    }

    pub fn add(&mut self, name: &str, dataset: AnyDataset) -> Result<()> {
        if self.datasets.contains_key(name) {
            return Err(DatasetError::config(format!(
                "Dataset '{}' has already been registered",
                name
            )));
        }
        self.datasets.insert(name.to_string(), dataset);
        Ok(())
    }

    pub fn list(&self) -> Vec<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Result<&AnyDataset> {
        self.datasets.get(name).ok_or_else(|| {
            DatasetError::config(format!("Dataset '{}' not found in the catalog", name))
        })
    }

    pub fn load(&self, name: &str) -> Result<AnyData> {
        let dataset = self.get(name)?;
        let _span =
            tracing::info_span!("catalog", dataset = name, kind = dataset.type_name()).entered();
        tracing::info!("Loading data");
        dataset.load()
    }

    pub fn save(&self, name: &str, data: &AnyData) -> Result<()> {
        let dataset = self.get(name)?;
        let _span =
            tracing::info_span!("catalog", dataset = name, kind = dataset.type_name()).entered();
        tracing::info!("Saving {}", data.type_name());
        dataset.save(data)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let dataset = self.get(name)?;
        let _span = tracing::debug_span!("catalog", dataset = name).entered();
        dataset.exists()
    }

    pub fn describe(&self, name: &str) -> Result<Description> {
        Ok(self.get(name)?.describe())
    }

    pub fn release(&self, name: &str) -> Result<()> {
        let dataset = self.get(name)?;
        let _span = tracing::debug_span!("catalog", dataset = name).entered();
        tracing::debug!("Releasing cached state");
        dataset.release();
        Ok(())
    }
}
