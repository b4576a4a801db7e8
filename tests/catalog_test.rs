use astro_datasets::domain::model::{ImageData, PixelData};
use astro_datasets::{
    AnyData, CatalogConfig, CatalogOptions, DataCatalog, ErrorKind, Header, SolarMap,
};
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn hmi_map() -> SolarMap {
    let mut meta = Header::new();
    meta.set("TELESCOP", "SDO/HMI");
    meta.set("INSTRUME", "HMI_FRONT2");
    meta.set("WAVELNTH", 6173.0);
    let data = ImageData::new(vec![3, 3], PixelData::I16(vec![-3, -2, -1, 0, 1, 2, 3, 4, 5])).unwrap();
    SolarMap::new(data, meta).unwrap()
}

fn catalog_toml(dir: &TempDir) -> String {
    let root = dir.path().to_str().unwrap();
    format!(
        r#"
[datasets.hmi_raw]
type = "map"
filepath = "{root}/raw/hmi.fits"

[datasets.hmi_frames]
type = "fits.FITSDataSet"
filepath = "file://{root}/raw/hmi.fits"
hdu_index = 1

[datasets.hmi_versioned]
type = "sunpy.MapDataSet"
filepath = "{root}/versioned/hmi.fits"
versioned = true

[datasets.hmi_versioned.save_args]
overwrite = true
"#
    )
}

fn write_catalog(dir: &TempDir) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(catalog_toml(dir).as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_catalog_from_file_end_to_end() {
    let data_dir = TempDir::new().unwrap();
    let catalog_file = write_catalog(&data_dir);

    let config = CatalogConfig::from_file(catalog_file.path()).unwrap();
    let catalog = DataCatalog::from_config(&config, &CatalogOptions::default()).unwrap();
    assert_eq!(catalog.list(), vec!["hmi_frames", "hmi_raw", "hmi_versioned"]);
    assert_eq!(catalog.get("hmi_frames").unwrap().type_name(), "FitsDataset");

    assert!(!catalog.exists("hmi_raw").unwrap());
    catalog.save("hmi_raw", &AnyData::Map(hmi_map())).unwrap();
    assert!(catalog.exists("hmi_raw").unwrap());

    match catalog.load("hmi_frames").unwrap() {
        AnyData::Hdu(hdu) => {
            assert_eq!(hdu.header.get_str("INSTRUME"), Some("HMI_FRONT2"));
            assert_eq!(hdu.data.unwrap().shape(), &[3, 3]);
        }
        other => panic!("expected an HDU, got {}", other.type_name()),
    }

    match catalog.load("hmi_raw").unwrap() {
        AnyData::Map(map) => assert_eq!(map.wavelength(), Some(6173.0)),
        other => panic!("expected a map, got {}", other.type_name()),
    }
}

#[test]
fn test_fits_entry_save_leaves_file_alone() {
    let data_dir = TempDir::new().unwrap();
    let config = CatalogConfig::from_toml_str(&catalog_toml(&data_dir)).unwrap();
    let catalog = DataCatalog::from_config(&config, &CatalogOptions::default()).unwrap();

    catalog.save("hmi_raw", &AnyData::Map(hmi_map())).unwrap();
    let path = data_dir.path().join("raw").join("hmi.fits");
    let before = std::fs::read(&path).unwrap();

    let hdu = match catalog.load("hmi_frames").unwrap() {
        AnyData::Hdu(hdu) => hdu,
        other => panic!("expected an HDU, got {}", other.type_name()),
    };
    catalog.save("hmi_frames", &AnyData::Hdu(hdu)).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), before);

    let err = catalog.save("hmi_frames", &AnyData::Map(hmi_map())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_run_versions_apply_to_versioned_entries() {
    let data_dir = TempDir::new().unwrap();
    let config = CatalogConfig::from_toml_str(&catalog_toml(&data_dir)).unwrap();

    for (save_version, wavelength) in [
        ("2024-06-01T00.00.00.000Z", 6173.0),
        ("2024-06-02T00.00.00.000Z", 1700.0),
    ] {
        let options = CatalogOptions {
            save_version: Some(save_version.to_string()),
            ..CatalogOptions::default()
        };
        let catalog = DataCatalog::from_config(&config, &options).unwrap();
        let mut map = hmi_map();
        map.meta_mut().set("WAVELNTH", wavelength);
        catalog.save("hmi_versioned", &AnyData::Map(map)).unwrap();
    }
    assert!(data_dir
        .path()
        .join("versioned/hmi.fits/2024-06-01T00.00.00.000Z/hmi.fits")
        .is_file());

    let latest = DataCatalog::from_config(&config, &CatalogOptions::default()).unwrap();
    match latest.load("hmi_versioned").unwrap() {
        AnyData::Map(map) => assert_eq!(map.wavelength(), Some(1700.0)),
        other => panic!("expected a map, got {}", other.type_name()),
    }

    let mut load_versions = BTreeMap::new();
    load_versions.insert(
        "hmi_versioned".to_string(),
        "2024-06-01T00.00.00.000Z".to_string(),
    );
    let pinned = DataCatalog::from_config(
        &config,
        &CatalogOptions {
            load_versions,
            save_version: None,
        },
    )
    .unwrap();
    match pinned.load("hmi_versioned").unwrap() {
        AnyData::Map(map) => assert_eq!(map.wavelength(), Some(6173.0)),
        other => panic!("expected a map, got {}", other.type_name()),
    }

    let description = pinned.describe("hmi_versioned").unwrap();
    assert_eq!(
        description["version"]["load"],
        serde_json::json!("2024-06-01T00.00.00.000Z")
    );
}

#[test]
fn test_unknown_names_are_config_errors() {
    let data_dir = TempDir::new().unwrap();
    let config = CatalogConfig::from_toml_str(&catalog_toml(&data_dir)).unwrap();
    let catalog = DataCatalog::from_config(&config, &CatalogOptions::default()).unwrap();
    assert_eq!(catalog.load("missing").unwrap_err().kind(), ErrorKind::Configuration);

    let mut load_versions = BTreeMap::new();
    load_versions.insert("missing".to_string(), "2024-06-01T00.00.00.000Z".to_string());
    let err = DataCatalog::from_config(
        &config,
        &CatalogOptions {
            load_versions,
            save_version: None,
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_release_keeps_catalog_usable() {
    let data_dir = TempDir::new().unwrap();
    let config = CatalogConfig::from_toml_str(&catalog_toml(&data_dir)).unwrap();
    let catalog = DataCatalog::from_config(&config, &CatalogOptions::default()).unwrap();
    catalog.save("hmi_raw", &AnyData::Map(hmi_map())).unwrap();

    catalog.release("hmi_raw").unwrap();
    catalog.release("hmi_frames").unwrap();
    assert!(catalog.exists("hmi_raw").unwrap());
    assert!(matches!(catalog.load("hmi_frames").unwrap(), AnyData::Hdu(_)));
}

#[test]
fn test_unrecognised_load_args_fail_catalog_construction() {
    let data_dir = TempDir::new().unwrap();
    let toml = format!(
        "{}\n[datasets.hmi_raw.load_args]\nmemmap = true\n",
        catalog_toml(&data_dir)
    );
    let config = CatalogConfig::from_toml_str(&toml).unwrap();
    let err = DataCatalog::from_config(&config, &CatalogOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("memmap"));
}
