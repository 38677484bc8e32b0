//! Global constants and helpers for file names, storage layout, network defaults and search/bucketing defaults
// Constants for version and binary identification
use std::path::{Path, PathBuf};

/// Binary name used in user agents and banners
pub const BINARY_NAME: &str = "superdump";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string for HTTP requests
pub fn user_agent() -> String {
    format!("{}/{}", BINARY_NAME, VERSION)
}

// ============================================================================
// Storage Layout
// ============================================================================

/// Settings file looked up in the data directory
pub const SETTINGS_FILENAME: &str = "superdump.json";

/// Bundle metadata file inside a bundle directory
pub const BUNDLE_INFO_FILENAME: &str = "bundleinfo.json";

/// Dump metadata file inside a dump directory
pub const DUMP_INFO_FILENAME: &str = "dumpinfo.json";

/// Zstd-compressed analysis result inside a dump directory
pub const RESULT_FILENAME: &str = "superdump-result.json.zst";

/// Zstd compression level for stored results (1 = fast, 3 = balanced, 19 = maximum)
pub const ZSTD_COMPRESSION_LEVEL: i32 = 3;

/// Directory holding everything that belongs to one bundle
pub fn bundle_dir(root: impl AsRef<Path>, bundle_id: &str) -> PathBuf {
    root.as_ref().join(bundle_id)
}

/// Directory holding everything that belongs to one dump
pub fn dump_dir(root: impl AsRef<Path>, bundle_id: &str, dump_id: &str) -> PathBuf {
    bundle_dir(root, bundle_id).join(dump_id)
}

/// Fetched source files of a bundle, kept for reruns
pub const BUNDLE_FILES_DIRNAME: &str = "files";

pub fn bundle_files_dir(root: impl AsRef<Path>, bundle_id: &str) -> PathBuf {
    bundle_dir(root, bundle_id).join(BUNDLE_FILES_DIRNAME)
}

// ============================================================================
// Identifiers
// ============================================================================

/// Number of hex characters in a generated bundle identifier
pub const BUNDLE_ID_LENGTH: usize = 12;

/// Number of hex characters in a generated dump identifier
pub const DUMP_ID_LENGTH: usize = 8;

/// Maximum attempts to allocate an identifier that is not taken yet
pub const ID_ALLOCATION_ATTEMPTS: usize = 16;

// ============================================================================
// Admission
// ============================================================================

/// File extensions that carry auxiliary data (symbols) rather than dumps
pub const AUXILIARY_EXTENSIONS: &[&str] = &["pdb", "sym", "dbg", "debug", "dsym"];

/// Default capacity of the analysis job queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default number of analyses running at the same time
pub const DEFAULT_MAX_CONCURRENT_ANALYSES: usize = 2;

// ============================================================================
// Timeout Constants (in seconds)
// ============================================================================

/// Timeout for probing a source URL during validation
pub const HTTP_PROBE_TIMEOUT_SECS: u64 = 15;

/// Timeout for downloading a bundle source
pub const HTTP_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Timeout for calls to the external search / duplicate index
pub const SEARCH_TIMEOUT_SECS: u64 = 30;

/// Timeout for a single analyzer run
pub const ANALYZER_TIMEOUT_SECS: u64 = 1800;

// ============================================================================
// Search and Bucketing
// ============================================================================

/// Bucket width used by the calendar heatmap (one hour)
pub const DEFAULT_BUCKET_SECONDS: u32 = 3600;

/// Default heatmap range when no start is given (one year)
pub const DEFAULT_HEATMAP_RANGE_DAYS: i64 = 365;

/// Maximum hits requested from Elasticsearch per query
pub const ELASTIC_MAX_HITS: usize = 10_000;

/// Default Elasticsearch index name
pub const DEFAULT_ELASTIC_INDEX: &str = "superdump";

/// Number of results kept in the in-memory result cache
pub const RESULT_CACHE_CAPACITY: usize = 64;

/// JSON pointers into an analysis result that make up its duplicate-detection signature
pub const SIGNATURE_POINTERS: &[&str] = &[
    "/LastEvent/Type",
    "/LastEvent/Description",
    "/Exception/Type",
    "/Exception/StackTrace",
    "/CrashedThread/StackTrace",
];

/// JSON pointers tried (in order) for the last-event type
pub const LAST_EVENT_TYPE_POINTERS: &[&str] = &["/LastEvent/Type", "/Exception/Type"];

/// JSON pointers tried (in order) for the last-event description
pub const LAST_EVENT_DESCRIPTION_POINTERS: &[&str] =
    &["/LastEvent/Description", "/Exception/Message"];

// ============================================================================
// Server
// ============================================================================

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default HTTP host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Location reference for a newly created bundle
pub fn bundle_location(bundle_id: &str) -> String {
    format!("/api/bundles/{}", bundle_id)
}
