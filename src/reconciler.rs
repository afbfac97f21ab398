//! NVR Camera Config Sync Tool
//! Reconciler module for merging scanned cameras into the config document
//!
//! This module provides functionality for:
//! 1. Computing which scanned cameras are absent from the config document
//! 2. Allocating non-conflicting local port triples for new entries
//! 3. Synthesizing and appending device entries for the missing cameras

use log::{ debug, info };
use serde_yaml::{ Mapping, Value };
use std::collections::HashSet;
use thiserror::Error;

use crate::csv_handler::ScanRecord;

/// Marker preceding the channel number inside an RTSP stream path
const CHANNEL_MARKER: &str = "channel=";

/// The camera's native RTSP port, independent of allocated local ports
const TARGET_RTSP_PORT: u16 = 554;

/// The camera's native HTTP snapshot port
const TARGET_SNAPSHOT_PORT: u16 = 80;

/// Snapshot endpoint exposed by every proxied camera
const SNAPSHOT_PATH: &str = "/onvif-http/snapshot";

/// Fixed encoder settings for synthesized high-quality stream entries
const DEFAULT_BITRATE: u32 = 2048;
const DEFAULT_QUALITY: u32 = 4;

/// Port floors used when the document has no entries yet
const SERVER_PORT_FLOOR: u32 = 8081;
const RTSP_PORT_FLOOR: u32 = 8554;
const SNAPSHOT_PORT_FLOOR: u32 = 8080;

/// Spacing between consecutive allocations, leaving room for manual inserts
const PORT_STEP: u32 = 1000;

/// Custom error types for reconciliation
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Config document root is not a mapping")] NotAMapping,

    #[error("Config key 'onvif' is present but is not a list")] InvalidDeviceList,
}

/// Local port assignment for one new device entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortTriple {
    pub server: u32,
    pub rtsp: u32,
    pub snapshot: u32,
}

/// Port counters seeded from the highest assignments already in the document
///
/// Ephemeral: recomputed on every run from the document itself, never
/// persisted. Each allocation advances all three counters by a fixed step
/// before handing the values out, so entries added in one run get strictly
/// increasing, widely spaced triples.
#[derive(Debug)]
pub struct PortAllocator {
    server: u32,
    rtsp: u32,
    snapshot: u32,
}

impl PortAllocator {
    /// Seed counters from the maxima across existing entries
    pub fn seed_from(document: &Value) -> Result<Self, ReconcileError> {
        let mut allocator = Self {
            server: SERVER_PORT_FLOOR,
            rtsp: RTSP_PORT_FLOOR,
            snapshot: SNAPSHOT_PORT_FLOOR,
        };

        for entry in device_entries(document)? {
            let Some(ports) = entry.get("ports") else {
                continue;
            };

            let observe = |key: &str, current: &mut u32| {
                if let Some(port) = ports.get(key).and_then(Value::as_u64) {
                    let port = port.min(u64::from(u32::MAX)) as u32;
                    if port > *current {
                        *current = port;
                    }
                }
            };

            observe("server", &mut allocator.server);
            observe("rtsp", &mut allocator.rtsp);
            observe("snapshot", &mut allocator.snapshot);
        }

        debug!(
            "Port allocator seeded at server={}, rtsp={}, snapshot={}",
            allocator.server,
            allocator.rtsp,
            allocator.snapshot
        );

        Ok(allocator)
    }

    /// Advance all counters by one step and return the new assignment
    pub fn allocate(&mut self) -> PortTriple {
        self.server += PORT_STEP;
        self.rtsp += PORT_STEP;
        self.snapshot += PORT_STEP;

        PortTriple {
            server: self.server,
            rtsp: self.rtsp,
            snapshot: self.snapshot,
        }
    }
}

/// Find scanned cameras that are not yet represented in the document
///
/// An existing entry claims a camera by name, or by the channel number
/// embedded in its high-quality RTSP path. A scanned camera counts as
/// missing only when *neither* key matches, so a camera that was renamed
/// or re-channeled in the config is not re-added as long as one of its
/// identifying attributes still lines up. Scan order is preserved.
pub fn find_missing_cameras(
    cameras: &[ScanRecord],
    document: &Value
) -> Result<Vec<ScanRecord>, ReconcileError> {
    let mut existing_names: HashSet<String> = HashSet::new();
    let mut existing_channels: HashSet<String> = HashSet::new();

    for entry in device_entries(document)? {
        if let Some(name) = entry.get("name").and_then(Value::as_str) {
            existing_names.insert(name.to_string());
        }

        if
            let Some(rtsp_path) = entry
                .get("highQuality")
                .and_then(|hq| hq.get("rtsp"))
                .and_then(Value::as_str)
        {
            if let Some(channel) = extract_channel(rtsp_path) {
                existing_channels.insert(channel);
            }
        }
    }

    let missing: Vec<ScanRecord> = cameras
        .iter()
        .filter(|camera| {
            !existing_names.contains(&camera.name) && !existing_channels.contains(&camera.channel)
        })
        .cloned()
        .collect();

    info!(
        "{} of {} scanned cameras are not present in the config",
        missing.len(),
        cameras.len()
    );

    Ok(missing)
}

/// Append one device entry per missing camera to the document
///
/// Existing entries are left untouched and keep their order; new entries
/// are appended in scan order with freshly allocated port triples. The
/// 'onvif' list is created when the document does not have one yet.
pub fn add_cameras_to_config(
    document: &mut Value,
    missing: &[ScanRecord],
    network_interface: &str
) -> Result<(), ReconcileError> {
    let mut allocator = PortAllocator::seed_from(document)?;

    let root = document.as_mapping_mut().ok_or(ReconcileError::NotAMapping)?;

    let devices = root
        .entry(Value::from("onvif"))
        .or_insert_with(|| Value::Sequence(Vec::new()))
        .as_sequence_mut()
        .ok_or(ReconcileError::InvalidDeviceList)?;

    for camera in missing {
        let ports = allocator.allocate();
        devices.push(build_entry(camera, network_interface, ports));
        debug!("Appended config entry for camera '{}' (channel {})", camera.name, camera.channel);
    }

    Ok(())
}

/// Extract the channel number following the channel marker, if any
fn extract_channel(rtsp_path: &str) -> Option<String> {
    let start = rtsp_path.find(CHANNEL_MARKER)? + CHANNEL_MARKER.len();
    let digits: String = rtsp_path[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Build the full device entry mapping for one camera
fn build_entry(camera: &ScanRecord, network_interface: &str, ports: PortTriple) -> Value {
    let mut target_ports = Mapping::new();
    target_ports.insert(Value::from("rtsp"), Value::from(u64::from(TARGET_RTSP_PORT)));
    target_ports.insert(Value::from("snapshot"), Value::from(u64::from(TARGET_SNAPSHOT_PORT)));

    let mut target = Mapping::new();
    target.insert(Value::from("hostname"), Value::from(camera.hostname.as_str()));
    target.insert(Value::from("ports"), Value::Mapping(target_ports));

    let mut high_quality = Mapping::new();
    high_quality.insert(Value::from("rtsp"), Value::from(camera.rtsp_path.as_str()));
    high_quality.insert(Value::from("snapshot"), Value::from(SNAPSHOT_PATH));
    high_quality.insert(Value::from("width"), Value::from(u64::from(camera.width)));
    high_quality.insert(Value::from("height"), Value::from(u64::from(camera.height)));
    high_quality.insert(Value::from("framerate"), Value::from(camera.framerate));
    high_quality.insert(Value::from("bitrate"), Value::from(u64::from(DEFAULT_BITRATE)));
    high_quality.insert(Value::from("quality"), Value::from(u64::from(DEFAULT_QUALITY)));

    let mut local_ports = Mapping::new();
    local_ports.insert(Value::from("server"), Value::from(u64::from(ports.server)));
    local_ports.insert(Value::from("rtsp"), Value::from(u64::from(ports.rtsp)));
    local_ports.insert(Value::from("snapshot"), Value::from(u64::from(ports.snapshot)));

    let mut entry = Mapping::new();
    entry.insert(Value::from("name"), Value::from(camera.name.as_str()));
    entry.insert(Value::from("dev"), Value::from(network_interface));
    entry.insert(Value::from("target"), Value::Mapping(target));
    entry.insert(Value::from("highQuality"), Value::Mapping(high_quality));
    entry.insert(Value::from("ports"), Value::Mapping(local_ports));

    Value::Mapping(entry)
}

/// Borrow the document's device list, tolerating its absence
fn device_entries(document: &Value) -> Result<&[Value], ReconcileError> {
    match document.get("onvif") {
        Some(value) =>
            value
                .as_sequence()
                .map(Vec::as_slice)
                .ok_or(ReconcileError::InvalidDeviceList),
        None => Ok(&[]),
    }
}
