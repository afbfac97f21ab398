//! NVR Camera Config Sync Tool
//! CSV Handler module for reading nvr-scanner channel reports
//!
//! This module provides functionality for:
//! 1. Validating and reading channel scan reports produced by nvr-scanner
//! 2. Decomposing RTSP stream URLs into hostname and path components
//! 3. Normalizing overlay labels into configuration-safe camera names

use csv::{ ReaderBuilder, StringRecord };
use log::{ debug, info, warn };
use serde::{ Deserialize, Serialize };
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Status value marking a scanned channel as live and usable
pub const WORKING_STATUS: &str = "✅ Working";

/// Sentinel the scanner emits when a probe field could not be determined
const NOT_APPLICABLE: &str = "N/A";

/// Fallback codec when the scanner could not identify the stream codec
const DEFAULT_CODEC: &str = "h264";

/// Fallback frame rate when the scanner could not measure FPS
const DEFAULT_FRAMERATE: f64 = 30.0;

/// Custom error types for scan report operations
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("File not found: {path}")] FileNotFound {
        path: String,
    },

    #[error("Scan report is missing required column '{column}'")] MissingColumn {
        column: String,
    },

    #[error("Invalid resolution '{value}', expected WIDTHxHEIGHT")] InvalidResolution {
        value: String,
    },

    #[error("Could not extract hostname and path from URL: {url}")] InvalidUrl {
        url: String,
    },

    #[error("Invalid frame rate '{value}'")] InvalidFramerate {
        value: String,
    },

    #[error("Overlay text '{label}' normalizes to an empty camera name")] EmptyName {
        label: String,
    },

    #[error("CSV error: {0}")] Csv(#[from] csv::Error),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),
}

/// One working camera channel extracted from the scan report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Channel identifier as reported by the scanner (kept as text)
    pub channel: String,
    /// Overlay label with surrounding whitespace trimmed and interior spaces hyphenated
    pub name: String,
    /// Hostname extracted from the RTSP URL, credentials and port stripped
    pub hostname: String,
    /// Stream path including the leading slash
    pub rtsp_path: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Measured frame rate, or 30.0 when the scanner reported N/A
    pub framerate: f64,
    /// Stream codec, or h264 when the scanner reported N/A
    pub codec: String,
}

/// Resolved column positions for the scan report header
struct Columns {
    status: usize,
    channel: usize,
    rtsp_url: usize,
    overlay_text: usize,
    resolution: usize,
    codec: usize,
    fps: usize,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self, CsvError> {
        let find = |name: &str| -> Result<usize, CsvError> {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| CsvError::MissingColumn { column: name.to_string() })
        };

        Ok(Self {
            status: find("Status")?,
            channel: find("Channel")?,
            rtsp_url: find("RTSP URL")?,
            overlay_text: find("Overlay Text")?,
            resolution: find("Resolution")?,
            codec: find("Codec")?,
            fps: find("FPS")?,
        })
    }
}

/// Scan report reader
///
/// Parses the per-channel CSV report written by nvr-scanner and extracts
/// the working cameras as typed records. Malformed rows are logged and
/// skipped so that one bad channel never aborts a whole reconciliation run.
pub struct CsvHandler {
    // No specific state needed for this handler
}

impl CsvHandler {
    /// Initialize CSV Handler module
    pub fn new() -> Self {
        Self {}
    }

    /// Read all working cameras from an nvr-scanner report
    ///
    /// The report must carry a header row with at least these columns:
    /// Status, Channel, RTSP URL, Overlay Text, Resolution, Codec, FPS.
    /// Rows whose Status is not the working sentinel are skipped silently;
    /// rows that fail field-level validation are skipped with a warning.
    /// A missing required column is an error, since every row would be
    /// unreadable without it.
    pub fn read_scan_report<P: AsRef<Path>>(
        &self,
        file_path: P
    ) -> Result<Vec<ScanRecord>, CsvError> {
        let path_str = file_path.as_ref().to_string_lossy().to_string();

        if !file_path.as_ref().exists() {
            return Err(CsvError::FileNotFound { path: path_str });
        }

        let file = File::open(&file_path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);

        let headers = reader.headers()?.clone();
        let columns = Columns::resolve(&headers)?;

        let mut cameras = Vec::new();
        let mut row_number = 2; // Start at 2 to account for header row

        for record_result in reader.records() {
            let record = match record_result {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping row {}: CSV parsing error: {}", row_number, e);
                    row_number += 1;
                    continue;
                }
            };

            match self.parse_row(&record, &columns) {
                Ok(Some(camera)) => cameras.push(camera),
                Ok(None) => {
                    debug!("Skipping row {}: channel not marked working", row_number);
                }
                Err(e) => {
                    warn!("Skipping row {}: {}", row_number, e);
                }
            }

            row_number += 1;
        }

        info!("Read {} working cameras from {}", cameras.len(), path_str);

        Ok(cameras)
    }

    /// Parse a single report row
    ///
    /// Returns Ok(None) for channels not marked working, and an error for
    /// rows whose fields cannot be validated. The caller decides whether an
    /// error is fatal; here it never is.
    fn parse_row(
        &self,
        record: &StringRecord,
        columns: &Columns
    ) -> Result<Option<ScanRecord>, CsvError> {
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        if field(columns.status) != WORKING_STATUS {
            return Ok(None);
        }

        let channel = field(columns.channel).to_string();
        let rtsp_url = field(columns.rtsp_url);

        let (width, height) = self.parse_resolution(field(columns.resolution))?;

        let label = field(columns.overlay_text);
        let name = label.replace(' ', "-");
        if name.is_empty() {
            return Err(CsvError::EmptyName { label: label.to_string() });
        }

        let (hostname, rtsp_path) = self.decompose_rtsp_url(rtsp_url)?;

        let fps = field(columns.fps);
        let framerate = if fps == NOT_APPLICABLE {
            DEFAULT_FRAMERATE
        } else {
            let parsed: f64 = fps
                .parse()
                .map_err(|_| CsvError::InvalidFramerate { value: fps.to_string() })?;
            if parsed <= 0.0 {
                return Err(CsvError::InvalidFramerate { value: fps.to_string() });
            }
            parsed
        };

        let codec = field(columns.codec);
        let codec = if codec == NOT_APPLICABLE {
            DEFAULT_CODEC.to_string()
        } else {
            codec.to_string()
        };

        Ok(
            Some(ScanRecord {
                channel,
                name,
                hostname,
                rtsp_path,
                width,
                height,
                framerate,
                codec,
            })
        )
    }

    /// Split a WIDTHxHEIGHT resolution string into positive integer parts
    fn parse_resolution(&self, resolution: &str) -> Result<(u32, u32), CsvError> {
        let invalid = || CsvError::InvalidResolution { value: resolution.to_string() };

        let parts: Vec<&str> = resolution.split('x').collect();
        if parts.len() != 2 {
            return Err(invalid());
        }

        let width: u32 = parts[0].trim().parse().map_err(|_| invalid())?;
        let height: u32 = parts[1].trim().parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok((width, height))
    }

    /// Decompose an RTSP URL into hostname and stream path
    ///
    /// Format: scheme://[username:password@]hostname:port/path
    ///
    /// Credentials may themselves contain '@', so the split is on the *last*
    /// '@' in the authority section. The port is discarded; the reconciler
    /// always targets the camera's native RTSP port. A URL without a '/'
    /// after the host, or with an empty hostname or path, is rejected.
    fn decompose_rtsp_url(&self, url: &str) -> Result<(String, String), CsvError> {
        let invalid = || CsvError::InvalidUrl { url: url.to_string() };

        let (_scheme, remainder) = url.split_once("://").ok_or_else(invalid)?;

        let host_port_path = match remainder.rfind('@') {
            Some(last_at) => &remainder[last_at + 1..],
            None => remainder,
        };

        let (host_port, path) = host_port_path.split_once('/').ok_or_else(invalid)?;

        let hostname = host_port.split(':').next().unwrap_or("");

        if hostname.is_empty() || path.is_empty() {
            return Err(invalid());
        }

        Ok((hostname.to_string(), format!("/{}", path)))
    }
}

impl Default for CsvHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_report(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_decompose_url_with_credentials_containing_at() {
        let handler = CsvHandler::new();
        let (host, path) = handler
            .decompose_rtsp_url("rtsp://user:p@ss@word@host:554/path/channel=3")
            .unwrap();
        assert_eq!(host, "host");
        assert_eq!(path, "/path/channel=3");
    }

    #[test]
    fn test_decompose_url_without_credentials() {
        let handler = CsvHandler::new();
        let (host, path) = handler
            .decompose_rtsp_url("rtsp://192.168.6.219:554/cam/realmonitor?channel=1")
            .unwrap();
        assert_eq!(host, "192.168.6.219");
        assert_eq!(path, "/cam/realmonitor?channel=1");
    }

    #[test]
    fn test_decompose_url_without_path_is_rejected() {
        let handler = CsvHandler::new();
        assert!(handler.decompose_rtsp_url("rtsp://admin:pw@host:554").is_err());
        assert!(handler.decompose_rtsp_url("rtsp://host:554/").is_err());
    }

    #[test]
    fn test_parse_resolution() {
        let handler = CsvHandler::new();
        assert_eq!(handler.parse_resolution("1920x1080").unwrap(), (1920, 1080));
        assert!(handler.parse_resolution("1920").is_err());
        assert!(handler.parse_resolution("1920x1080x3").is_err());
        assert!(handler.parse_resolution("0x1080").is_err());
        assert!(handler.parse_resolution("widexhigh").is_err());
    }

    #[test]
    fn test_read_scan_report_skips_non_working_rows() {
        let report = write_report(
            "Channel,Status,RTSP URL,Overlay Text,Resolution,Codec,FPS\n\
             1,✅ Working,rtsp://admin:pw@10.0.0.9:554/cam?channel=1,Front Door,1920x1080,h265,25\n\
             2,❌ Offline,rtsp://admin:pw@10.0.0.9:554/cam?channel=2,Back Door,1920x1080,h265,25\n"
        );

        let cameras = CsvHandler::new().read_scan_report(report.path()).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].channel, "1");
        assert_eq!(cameras[0].name, "Front-Door");
        assert_eq!(cameras[0].hostname, "10.0.0.9");
        assert_eq!(cameras[0].rtsp_path, "/cam?channel=1");
        assert_eq!(cameras[0].width, 1920);
        assert_eq!(cameras[0].height, 1080);
        assert_eq!(cameras[0].codec, "h265");
        assert_eq!(cameras[0].framerate, 25.0);
    }

    #[test]
    fn test_read_scan_report_applies_sentinel_defaults() {
        let report = write_report(
            "Channel,Status,RTSP URL,Overlay Text,Resolution,Codec,FPS\n\
             3,✅ Working,rtsp://10.0.0.9:554/cam?channel=3,Garage,704x576,N/A,N/A\n"
        );

        let cameras = CsvHandler::new().read_scan_report(report.path()).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].codec, "h264");
        assert_eq!(cameras[0].framerate, 30.0);
    }

    #[test]
    fn test_read_scan_report_skips_malformed_rows_without_failing() {
        let report = write_report(
            "Channel,Status,RTSP URL,Overlay Text,Resolution,Codec,FPS\n\
             1,✅ Working,rtsp://10.0.0.9:554,No Path,1920x1080,h264,25\n\
             2,✅ Working,rtsp://10.0.0.9:554/cam?channel=2,Bad Res,1920,h264,25\n\
             3,✅ Working,rtsp://10.0.0.9:554/cam?channel=3,Good,1280x720,h264,25\n"
        );

        let cameras = CsvHandler::new().read_scan_report(report.path()).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].name, "Good");
    }

    #[test]
    fn test_read_scan_report_missing_column_is_fatal() {
        let report = write_report(
            "Channel,Status,RTSP URL,Overlay Text,Resolution,Codec\n\
             1,✅ Working,rtsp://10.0.0.9:554/cam,Cam,1920x1080,h264\n"
        );

        let result = CsvHandler::new().read_scan_report(report.path());
        assert!(matches!(result, Err(CsvError::MissingColumn { .. })));
    }

    #[test]
    fn test_read_scan_report_missing_file() {
        let result = CsvHandler::new().read_scan_report("/nonexistent/report.csv");
        assert!(matches!(result, Err(CsvError::FileNotFound { .. })));
    }
}
