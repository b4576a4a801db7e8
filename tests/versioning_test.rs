use astro_datasets::domain::model::{ImageData, PixelData};
use astro_datasets::{Dataset, ErrorKind, Header, MapDataset, MapDatasetConfig, SolarMap, Version};
use std::path::Path;
use tempfile::TempDir;

fn map_with_exposure(exptime: f64) -> SolarMap {
    let mut meta = Header::new();
    meta.set("TELESCOP", "SOHO");
    meta.set("INSTRUME", "EIT");
    meta.set("EXPTIME", exptime);
    let data = ImageData::new(vec![2, 2], PixelData::F64(vec![0.0, 0.25, 0.5, 0.75])).unwrap();
    SolarMap::new(data, meta).unwrap()
}

fn dataset(root: &Path, version: Version, listings_cache: bool) -> MapDataset {
    let mut config = MapDatasetConfig::new(root.to_str().unwrap());
    config.version = Some(version);
    config.fs_args.use_listings_cache = Some(listings_cache);
    MapDataset::new(config).unwrap()
}

fn save_version(id: &str) -> Version {
    Version::new(None, Some(id.to_string()))
}

#[test]
fn test_latest_version_is_cached_until_release() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("eit.fits");
    let reader = dataset(&root, Version::default(), false);

    dataset(&root, save_version("2023-01-01T00.00.00.000Z"), false)
        .save(&map_with_exposure(1.0))
        .unwrap();
    assert_eq!(reader.load().unwrap().exposure_time(), Some(1.0));

    dataset(&root, save_version("2023-01-02T00.00.00.000Z"), false)
        .save(&map_with_exposure(2.0))
        .unwrap();
    assert_eq!(reader.load().unwrap().exposure_time(), Some(1.0));

    reader.release();
    assert_eq!(reader.load().unwrap().exposure_time(), Some(2.0));
}

#[test]
fn test_listings_cache_is_stale_until_release() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("eit.fits");
    let reader = dataset(&root, Version::default(), true);
    assert!(!reader.exists().unwrap());

    dataset(&root, save_version("2023-02-01T00.00.00.000Z"), false)
        .save(&map_with_exposure(3.0))
        .unwrap();
    assert!(!reader.exists().unwrap());

    reader.release();
    assert!(reader.exists().unwrap());
    assert_eq!(reader.load().unwrap().exposure_time(), Some(3.0));
}

#[test]
fn test_own_save_invalidates_listings_cache() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("eit.fits");
    let mut config = MapDatasetConfig::new(root.to_str().unwrap());
    config.version = Some(Version::default());
    config.fs_args.use_listings_cache = Some(true);
    let dataset = MapDataset::new(config).unwrap();

    assert!(!dataset.exists().unwrap());
    dataset.save(&map_with_exposure(4.0)).unwrap();
    assert!(dataset.exists().unwrap());
    assert_eq!(dataset.load().unwrap().exposure_time(), Some(4.0));

    let versions: Vec<_> = std::fs::read_dir(&root).unwrap().collect();
    assert_eq!(versions.len(), 1);
}

#[test]
fn test_pinned_load_version_ignores_newer_versions() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("eit.fits");
    let old = "2023-03-01T00.00.00.000Z";
    dataset(&root, save_version(old), false)
        .save(&map_with_exposure(5.0))
        .unwrap();
    dataset(&root, save_version("2023-03-05T00.00.00.000Z"), false)
        .save(&map_with_exposure(6.0))
        .unwrap();

    let pinned = dataset(&root, Version::new(Some(old.to_string()), None), false);
    assert_eq!(pinned.load().unwrap().exposure_time(), Some(5.0));
    pinned.release();
    assert_eq!(pinned.load().unwrap().exposure_time(), Some(5.0));

    let missing = dataset(
        &root,
        Version::new(Some("2022-01-01T00.00.00.000Z".to_string()), None),
        false,
    );
    assert!(!missing.exists().unwrap());
    assert_eq!(missing.load().unwrap_err().kind(), ErrorKind::Io);
}

#[test]
fn test_memory_versions_are_visible_across_handles() {
    let root = "memory://versioning-tests/shared/eit.fits";
    let id = "2023-04-01T00.00.00.000Z";

    let mut writer = MapDatasetConfig::new(root);
    writer.version = Some(save_version(id));
    MapDataset::new(writer)
        .unwrap()
        .save(&map_with_exposure(7.0))
        .unwrap();

    let mut reader = MapDatasetConfig::new(root);
    reader.version = Some(Version::default());
    let reader = MapDataset::new(reader).unwrap();
    assert!(reader.exists().unwrap());
    assert_eq!(reader.load().unwrap().exposure_time(), Some(7.0));
    let display = reader.to_string();
    assert!(display.starts_with("MapDataset(filepath=versioning-tests/shared/eit.fits, "));
    assert!(display.contains("protocol=memory"));
}

#[test]
fn test_invalid_version_id_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = MapDatasetConfig::new(temp_dir.path().join("eit.fits").to_str().unwrap());
    config.version = Some(Version::new(Some("../escape".to_string()), None));
    let err = MapDataset::new(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
