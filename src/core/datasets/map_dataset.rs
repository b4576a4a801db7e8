use crate::adapters::storage::FileSystemRegistry;
use crate::config::args::{
    reject_unknown_args, Credentials, ExtraArgs, FitsLoadArgs, FitsSaveArgs, FsArgs, OpenMode,
};
use crate::core::datasets::{format_description, to_description_value, VersionedFsDataset};
use crate::core::fits::{self, VerifyOption};
use crate::core::version::Version;
use crate::domain::model::ImageHdu;
use crate::domain::ports::{Dataset, Description};
use crate::domain::solar_map::SolarMap;
use crate::utils::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

/// Maps live in the first extension, behind an empty primary HDU.
pub const MAP_HDU_INDEX: i64 = 1;

pub const DEFAULT_LOAD_ARGS: FitsLoadArgs = FitsLoadArgs::empty();
pub const DEFAULT_SAVE_ARGS: FitsSaveArgs = FitsSaveArgs {
    overwrite: Some(false),
    output_verify: None,
    extra: ExtraArgs::new(),
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapDatasetConfig {
    pub filepath: String,
    #[serde(default)]
    pub load_args: FitsLoadArgs,
    #[serde(default)]
    pub save_args: FitsSaveArgs,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub fs_args: FsArgs,
}

impl MapDatasetConfig {
    pub fn new(filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            ..Self::default()
        }
    }
}

/// A solar map stored as a FITS file.
#[derive(Debug)]
pub struct MapDataset {
    base: VersionedFsDataset,
    load_args: FitsLoadArgs,
    save_args: FitsSaveArgs,
}

impl MapDataset {
    pub fn new(config: MapDatasetConfig) -> Result<Self> {
        Self::with_registry(config, &FileSystemRegistry::default())
    }

    pub fn with_registry(config: MapDatasetConfig, registry: &FileSystemRegistry) -> Result<Self> {
        reject_unknown_args("load_args", &config.load_args.extra)?;
        reject_unknown_args("save_args", &config.save_args.extra)?;
        let base = VersionedFsDataset::new(
            &config.filepath,
            config.version,
            &config.credentials,
            config.fs_args,
            registry,
        )?;
        Ok(Self {
            base,
            load_args: config.load_args.merged_over(&DEFAULT_LOAD_ARGS),
            save_args: config.save_args.merged_over(&DEFAULT_SAVE_ARGS),
        })
    }

    pub fn load_args(&self) -> &FitsLoadArgs {
        &self.load_args
    }

    pub fn save_args(&self) -> &FitsSaveArgs {
        &self.save_args
    }

    pub fn base(&self) -> &VersionedFsDataset {
        &self.base
    }

    /// Without overwrite, a plain `wb` save must not replace an existing file.
    fn save_mode(&self) -> Option<OpenMode> {
        let overwrite = self.save_args.overwrite.unwrap_or(false);
        match self.base.open_args_save().mode {
            None | Some(OpenMode::WriteBinary) if !overwrite => Some(OpenMode::CreateNew),
            _ => None,
        }
    }

    fn encode(&self, map: &SolarMap) -> Result<Vec<u8>> {
        let hdu = ImageHdu::new(map.fits_header(), Some(map.data().clone()));
        let mut bytes = Vec::new();
        hdu.write_to(&mut bytes, &self.save_args)?;
        Ok(bytes)
    }
}

impl Dataset for MapDataset {
    type Data = SolarMap;

    fn load(&self) -> Result<SolarMap> {
        let (load_path, stream) = self.base.open_load()?;
        let mut hdul = fits::open(stream, &self.load_args)?;

        let hdu = hdul.get_mut(MAP_HDU_INDEX).map_err(|e| match e {
            DatasetError::HduIndexOutOfRange { count, .. } => DatasetError::codec(format!(
                "'{}' has {} HDU(s); a map is read from HDU {}",
                load_path, count, MAP_HDU_INDEX
            )),
            other => other,
        })?;
        hdu.verify(VerifyOption::SilentFix)?;

        let data = hdu.data.take().ok_or_else(|| {
            DatasetError::codec(format!(
                "HDU {} of '{}' holds no image data",
                MAP_HDU_INDEX, load_path
            ))
        })?;
        let map = SolarMap::new(data, std::mem::take(&mut hdu.header))?;
        tracing::debug!("Loaded {}x{} map from {}", map.dimensions().x, map.dimensions().y, load_path);
        Ok(map)
    }

    fn save(&self, map: &SolarMap) -> Result<()> {
        // Encode up front so a codec failure never leaves a partial file.
        let bytes = self.encode(map)?;
        self.base.save_with(|save_path| {
            let mut stream = self.base.open_save(save_path, self.save_mode())?;
            stream
                .write_all(&bytes)
                .and_then(|_| stream.flush())
                .map_err(|e| {
                    DatasetError::persistence(format!("Failed to write '{}': {}", save_path, e))
                })?;
            tracing::debug!("Saved {} bytes to {}", bytes.len(), save_path);
            Ok(())
        })
    }

    fn exists(&self) -> Result<bool> {
        self.base.exists()
    }

    fn describe(&self) -> Description {
        let mut description = Description::new();
        self.base.describe_into(&mut description);
        description.insert("load_args".into(), to_description_value(&self.load_args));
        description.insert("save_args".into(), to_description_value(&self.save_args));
        description
    }

    fn release(&self) {
        self.base.release();
    }
}

impl fmt::Display for MapDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_description(f, "MapDataset", &self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryFileSystem;
    use crate::config::args::{FileSystemOptions, OpenArgs};
    use crate::domain::header::Header;
    use crate::domain::model::{ImageData, PixelData};
    use crate::domain::ports::FileSystem;
    use crate::utils::error::ErrorKind;
    use std::sync::Arc;

    fn registry_for(fs: Arc<MemoryFileSystem>) -> FileSystemRegistry {
        let mut registry = FileSystemRegistry::default();
        registry.register("memory", move |_: &Credentials, _: &FileSystemOptions| {
            Ok(fs.clone() as Arc<dyn FileSystem>)
        });
        registry
    }

    fn sample_map() -> SolarMap {
        let mut meta = Header::new();
        meta.set("TELESCOP", "SDO/AIA");
        meta.set("WAVELNTH", 171_i64);
        meta.set("CDELT1", 0.6);
        meta.add_history("prepped");
        let data = ImageData::new(vec![2, 3], PixelData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
            .unwrap();
        SolarMap::new(data, meta).unwrap()
    }

    fn dataset(fs: &Arc<MemoryFileSystem>, config: MapDatasetConfig) -> MapDataset {
        MapDataset::with_registry(config, &registry_for(fs.clone())).unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let fs = Arc::new(MemoryFileSystem::isolated());
        let dataset = dataset(&fs, MapDatasetConfig::new("memory://maps/aia.fits"));
        assert!(!dataset.exists().unwrap());

        let map = sample_map();
        dataset.save(&map).unwrap();
        assert!(dataset.exists().unwrap());

        let loaded = dataset.load().unwrap();
        assert_eq!(loaded.data(), map.data());
        assert_eq!(loaded.fits_header(), map.fits_header());
        assert_eq!(loaded.observatory(), Some("SDO/AIA"));
    }

    #[test]
    fn test_second_save_without_overwrite_fails() {
        let fs = Arc::new(MemoryFileSystem::isolated());
        let dataset = dataset(&fs, MapDatasetConfig::new("memory://maps/aia.fits"));
        dataset.save(&sample_map()).unwrap();

        let err = dataset.save(&sample_map()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_overwrite_replaces_file() {
        let fs = Arc::new(MemoryFileSystem::isolated());
        let mut config = MapDatasetConfig::new("memory://maps/aia.fits");
        config.save_args.overwrite = Some(true);
        let dataset = dataset(&fs, config);

        dataset.save(&sample_map()).unwrap();
        let mut changed = sample_map();
        changed.meta_mut().set("WAVELNTH", 193_i64);
        dataset.save(&changed).unwrap();
        assert_eq!(dataset.load().unwrap().wavelength(), Some(193.0));
    }

    #[test]
    fn test_single_hdu_file_is_codec_error() {
        let fs = Arc::new(MemoryFileSystem::isolated());
        let primary = ImageHdu::primary(
            Header::new(),
            Some(ImageData::new(vec![2, 2], PixelData::I16(vec![0; 4])).unwrap()),
        );
        let mut stream = fs.open_write("/maps/flat.fits", &OpenArgs::default()).unwrap();
        primary.write_to(&mut stream, &FitsSaveArgs::default()).unwrap();
        drop(stream);

        let dataset = dataset(&fs, MapDatasetConfig::new("memory://maps/flat.fits"));
        let err = dataset.load().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_describe_has_no_hdu_index() {
        let fs = Arc::new(MemoryFileSystem::isolated());
        let dataset = dataset(&fs, MapDatasetConfig::new("memory://maps/aia.fits"));
        let description = dataset.describe();
        assert!(!description.contains_key("hdu_index"));
        assert_eq!(description["save_args"], serde_json::json!({"overwrite": false}));
        assert_eq!(
            dataset.to_string(),
            "MapDataset(filepath=maps/aia.fits, protocol=memory, save_args={\"overwrite\":false})"
        );
    }
}
