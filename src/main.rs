use astro_datasets::config::Command;
use astro_datasets::utils::error::ErrorKind;
use astro_datasets::utils::{logger, validation::Validate};
use astro_datasets::{AnyData, CatalogConfig, CliConfig, DataCatalog, DatasetError};
use clap::Parser;

fn print_hdu_summary(hdu: &astro_datasets::ImageHdu) {
    println!("kind:    {}", hdu.kind);
    if let Some(name) = hdu.name() {
        println!("name:    {}", name);
    }
    match &hdu.data {
        Some(data) => println!("data:    {:?} BITPIX={}", data.shape(), data.bitpix()),
        None => println!("data:    none"),
    }
    println!("cards:   {}", hdu.header.len());
    for card in hdu.header.cards().iter().filter(|card| !card.is_commentary()) {
        if let Some(value) = &card.value {
            println!("  {:<8} = {}", card.keyword, value);
        }
    }
}

fn print_map_summary(map: &astro_datasets::SolarMap) {
    let dimensions = map.dimensions();
    println!("dimensions:  {} x {}", dimensions.x, dimensions.y);
    println!("observatory: {}", map.observatory().unwrap_or("-"));
    println!("instrument:  {}", map.instrument().unwrap_or("-"));
    if let Some(wavelength) = map.wavelength() {
        println!(
            "wavelength:  {} {}",
            wavelength,
            map.wavelength_unit().unwrap_or("")
        );
    }
    if let Some(date) = map.date() {
        println!("date:        {}", date);
    }
    if let Some(scale) = map.scale() {
        println!("scale:       {} x {}", scale.x, scale.y);
    }
}

fn run(config: &CliConfig) -> Result<(), DatasetError> {
    let catalog_config = CatalogConfig::from_file(&config.catalog)?;
    let catalog = DataCatalog::from_config(&catalog_config, &config.catalog_options()?)?;

    match &config.command {
        Command::List => {
            for name in catalog.list() {
                let dataset = catalog.get(name)?;
                println!("{:<24} {}", name, dataset.type_name());
            }
        }
        Command::Describe { name } => {
            let description = catalog.describe(name)?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        Command::Exists { name } => {
            println!("{}", catalog.exists(name)?);
        }
        Command::Inspect { name } => match catalog.load(name)? {
            AnyData::Hdu(hdu) => print_hdu_summary(&hdu),
            AnyData::Map(map) => print_map_summary(&map),
        },
        Command::Release { name } => {
            catalog.release(name)?;
            println!("Released '{}'", name);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting astro-catalog");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        tracing::error!("Suggestion: {}", e.recovery_suggestion());
        eprintln!("{}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(&config) {
        tracing::error!("Command failed: {} (kind: {:?})", e, e.kind());
        tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("{}", e.user_friendly_message());
        eprintln!("Suggestion: {}", e.recovery_suggestion());

        let exit_code = match e.kind() {
            ErrorKind::Configuration => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::Codec => 3,
            ErrorKind::Persistence => 4,
            ErrorKind::Io => 5,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}
