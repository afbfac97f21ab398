//! NVR Camera Config Sync Tool
//!
//! Reconciles an nvr-scanner channel report (CSV) against the ONVIF server's
//! config.yaml, appending entries for working cameras the config does not
//! know about yet. Existing entries are never touched; a run with nothing to
//! add leaves the file as it was.

mod config_manager;
mod csv_handler;
mod reconciler;

use anyhow::{ Context, Result };
use clap::Parser;
use log::debug;
use std::path::PathBuf;

use config_manager::ConfigManager;
use csv_handler::CsvHandler;
use reconciler::{ add_cameras_to_config, find_missing_cameras };

/// Add cameras found by nvr-scanner to an ONVIF server config file
#[derive(Parser, Debug)]
#[command(name = "nvr-config-sync", version, about)]
struct Cli {
    /// Path to the CSV report created by nvr-scanner
    #[arg(long)]
    csv: PathBuf,

    /// Path to the config.yaml file to update
    #[arg(long)]
    config: PathBuf,

    /// Network interface new camera entries will bind to
    #[arg(long = "network-interface", default_value = "enp6s0")]
    network_interface: String,
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if !cli.csv.exists() {
        anyhow::bail!("CSV file {} does not exist", cli.csv.display());
    }

    if !cli.config.exists() {
        anyhow::bail!("Config file {} does not exist", cli.config.display());
    }

    println!("Parsing CSV file: {}", cli.csv.display());
    let cameras = CsvHandler::new()
        .read_scan_report(&cli.csv)
        .context("Failed to parse CSV file")?;
    println!("Found {} working cameras in CSV file", cameras.len());

    println!("Parsing config file: {}", cli.config.display());
    let manager = ConfigManager::new();
    let mut document = manager.load(&cli.config).context("Failed to parse config file")?;

    println!("Finding missing cameras...");
    let missing = find_missing_cameras(&cameras, &document).context(
        "Failed to inspect existing config entries"
    )?;
    println!("Found {} missing cameras", missing.len());

    if missing.is_empty() {
        println!("No missing cameras found. Config file is up to date.");
        return Ok(());
    }

    println!("\nMissing cameras:");
    for camera in &missing {
        println!(
            "  - Channel {}: {} ({}x{})",
            camera.channel,
            camera.name,
            camera.width,
            camera.height
        );
        debug!("  codec {}, {} fps, host {}", camera.codec, camera.framerate, camera.hostname);
    }

    println!("\nAdding missing cameras to config...");
    add_cameras_to_config(&mut document, &missing, &cli.network_interface).context(
        "Failed to build new config entries"
    )?;

    println!("\nSaving updated config...");
    manager.save(&document, &cli.config).context("Failed to save config file")?;
    println!("Updated config file saved to {}", cli.config.display());

    println!("\nDone! Restart the ONVIF server container to apply the changes.");

    Ok(())
}
