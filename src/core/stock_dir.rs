//! Filesystem side of the inventory.
//!
//! Layout under the stock root:
//!
//! ```text
//! accounts/
//!   +95 Myanmar/
//!     959123456.session
//!     sold/
//!       959000000.session
//! ```
//!
//! Each folder is a country, each `*.session` file one good whose stem is the phone number.
//! Sold files are relocated into the folder's `sold/` subdirectory and never scanned again.

use crate::errors::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Name of the per-folder relocation target.
pub const SOLD_DIR: &str = "sold";

const SESSION_EXTENSION: &str = "session";

#[allow(clippy::expect_used)]
static CALLING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+(\d+)\s*").expect("valid calling code regex"));

/// ISO 3166 alpha-2 region for the calling codes we sell.
const CALLING_CODE_REGIONS: &[(&str, &str)] = &[
    ("1", "US"),
    ("7", "RU"),
    ("20", "EG"),
    ("27", "ZA"),
    ("30", "GR"),
    ("31", "NL"),
    ("32", "BE"),
    ("33", "FR"),
    ("34", "ES"),
    ("36", "HU"),
    ("39", "IT"),
    ("40", "RO"),
    ("41", "CH"),
    ("43", "AT"),
    ("44", "GB"),
    ("45", "DK"),
    ("46", "SE"),
    ("47", "NO"),
    ("48", "PL"),
    ("49", "DE"),
    ("52", "MX"),
    ("55", "BR"),
    ("56", "CL"),
    ("60", "MY"),
    ("62", "ID"),
    ("63", "PH"),
    ("64", "NZ"),
    ("65", "SG"),
    ("66", "TH"),
    ("81", "JP"),
    ("82", "KR"),
    ("84", "VN"),
    ("86", "CN"),
    ("90", "TR"),
    ("91", "IN"),
    ("92", "PK"),
    ("94", "LK"),
    ("95", "MM"),
    ("98", "IR"),
    ("212", "MA"),
    ("213", "DZ"),
    ("216", "TN"),
    ("220", "GM"),
    ("221", "SN"),
    ("225", "CI"),
    ("234", "NG"),
    ("251", "ET"),
    ("254", "KE"),
    ("255", "TZ"),
    ("267", "BW"),
    ("351", "PT"),
    ("353", "IE"),
    ("358", "FI"),
    ("370", "LT"),
    ("371", "LV"),
    ("372", "EE"),
    ("375", "BY"),
    ("380", "UA"),
    ("420", "CZ"),
    ("852", "HK"),
    ("880", "BD"),
    ("964", "IQ"),
    ("971", "AE"),
    ("998", "UZ"),
];

/// White flag, used for unknown calling codes.
pub const FALLBACK_FLAG: &str = "🏳️";

/// Calling code and country name parsed from a folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderName {
    /// Digits of the calling code, without `+`; empty when absent
    pub calling_code: String,
    /// Country name, `Unknown` when the folder holds only a code
    pub country: String,
}

impl FolderName {
    /// Parses names such as `+95 Myanmar` or `Myanmar +95`.
    #[must_use]
    pub fn parse(folder_name: &str) -> Self {
        let calling_code = CALLING_CODE
            .captures(folder_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let stripped = CALLING_CODE.replace_all(folder_name, "");
        let country = match stripped.trim() {
            "" => "Unknown".to_string(),
            name => name.to_string(),
        };

        Self {
            calling_code,
            country,
        }
    }

    /// Display code, e.g. `+95`.
    #[must_use]
    pub fn display_code(&self) -> String {
        if self.calling_code.is_empty() {
            String::new()
        } else {
            format!("+{}", self.calling_code)
        }
    }
}

/// Flag emoji for a calling code (digits only, `+` tolerated).
#[must_use]
pub fn flag_emoji(calling_code: &str) -> String {
    let code = calling_code.trim().trim_start_matches('+');
    CALLING_CODE_REGIONS
        .iter()
        .find(|(c, _)| *c == code)
        .and_then(|(_, region)| regional_indicators(region))
        .unwrap_or_else(|| FALLBACK_FLAG.to_string())
}

fn regional_indicators(region: &str) -> Option<String> {
    region
        .chars()
        .map(|c| {
            let offset = u32::from(c.to_ascii_uppercase()).checked_sub(u32::from('A'))?;
            char::from_u32(0x1F1E6 + offset)
        })
        .collect()
}

/// One session file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockFile {
    /// External identifier, the file stem
    pub phone_number: String,
    /// Path relative to the stock root
    pub relative_path: String,
}

/// One country folder found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockFolder {
    /// Raw folder name
    pub folder_name: String,
    /// Parsed folder name
    pub parsed: FolderName,
    /// Session files, sorted by phone number
    pub files: Vec<StockFile>,
}

/// Result of scanning the stock root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The root did not exist and was created empty
    CreatedRoot,
    /// Folders found under the root, sorted by name
    Folders(Vec<StockFolder>),
}

/// Handle to the stock directory.
#[derive(Debug, Clone)]
pub struct StockDirectory {
    root: PathBuf,
}

impl StockDirectory {
    /// Creates a handle; nothing is touched until the first scan.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Stock root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists country folders and their session files.
    pub async fn scan(&self) -> Result<ScanOutcome> {
        if !tokio::fs::try_exists(&self.root).await? {
            warn!(
                "Stock directory '{}' not found. Creating it.",
                self.root.display()
            );
            tokio::fs::create_dir_all(&self.root).await?;
            return Ok(ScanOutcome::CreatedRoot);
        }

        let mut folders = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let folder_name = entry.file_name().to_string_lossy().into_owned();
            if folder_name.eq_ignore_ascii_case(SOLD_DIR) || !entry.file_type().await?.is_dir() {
                continue;
            }

            let files = match Self::scan_folder(&entry.path(), &folder_name).await {
                Ok(files) => files,
                Err(e) => {
                    warn!("Skipping unreadable stock folder '{}': {}", folder_name, e);
                    continue;
                }
            };

            folders.push(StockFolder {
                parsed: FolderName::parse(&folder_name),
                folder_name,
                files,
            });
        }

        folders.sort_by(|a, b| a.folder_name.cmp(&b.folder_name));
        Ok(ScanOutcome::Folders(folders))
    }

    async fn scan_folder(path: &Path, folder_name: &str) -> Result<Vec<StockFile>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_path = entry.path();
            let is_session = file_path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SESSION_EXTENSION));
            let Some(stem) = file_path.file_stem().map(|s| s.to_string_lossy().into_owned())
            else {
                continue;
            };
            if !is_session || stem.is_empty() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            files.push(StockFile {
                phone_number: stem,
                relative_path: format!("{folder_name}/{file_name}"),
            });
        }
        files.sort_by(|a, b| a.phone_number.cmp(&b.phone_number));
        Ok(files)
    }

    /// Reads a session file.
    pub async fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.root.join(relative_path)).await?)
    }

    /// Moves a sold file into its folder's `sold/` directory.
    ///
    /// Returns `false` when the file is no longer at its source path (already relocated or
    /// removed by hand).
    pub async fn move_to_sold(&self, relative_path: &str) -> Result<bool> {
        let source = self.root.join(relative_path);
        if !tokio::fs::try_exists(&source).await? {
            debug!("'{}' already relocated", relative_path);
            return Ok(false);
        }

        let parent = source.parent().unwrap_or(&self.root);
        let sold_dir = parent.join(SOLD_DIR);
        tokio::fs::create_dir_all(&sold_dir).await?;

        let Some(file_name) = source.file_name() else {
            return Ok(false);
        };
        tokio::fs::rename(&source, sold_dir.join(file_name)).await?;
        debug!("Relocated '{}' to {}", relative_path, SOLD_DIR);
        Ok(true)
    }
}
