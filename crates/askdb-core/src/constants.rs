//! Package-level constants: sentinels, failure markers, preview sizing.

/// Current version of the askdb agent (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "askdb";

/// Sentinel shown in prompts when no schema metadata has been fetched yet.
pub const NO_METADATA: &str = "No metadata fetched yet";

/// Sentinel shown in prompts when no query rows have been fetched yet.
pub const NO_DATA: &str = "No rows fetched yet";

/// Sentinel shown in prompts when no analysis script has run yet.
pub const NO_ANALYSIS: &str = "No previous analysis output";

/// Stable marker prefixing a rendered query-execution failure.
pub const SQL_ERROR_MARKER: &str = "SQL execution error:";

/// Stable marker prefixing a rendered code-execution failure.
pub const CODE_ERROR_MARKER: &str = "Python execution error:";

/// Stable marker prefixing a rendered metadata-fetch failure.
pub const METADATA_ERROR_MARKER: &str = "Metadata fetch error:";

/// Stable marker prefixing a rendered similarity-lookup failure.
pub const SIMILARITY_ERROR_MARKER: &str = "Similarity lookup error:";

/// Stable marker prefixing a rendered bad-request failure (unknown
/// capability name, malformed arguments).
pub const REQUEST_ERROR_MARKER: &str = "Capability request error:";

/// Number of result rows included in a rendered table preview.
/// Full results live in the persisted CSV; the transcript only carries
/// the label and this preview.
pub const PREVIEW_ROWS: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn markers_are_distinct() {
        let markers = [
            SQL_ERROR_MARKER,
            CODE_ERROR_MARKER,
            METADATA_ERROR_MARKER,
            SIMILARITY_ERROR_MARKER,
            REQUEST_ERROR_MARKER,
        ];
        for (i, a) in markers.iter().enumerate() {
            for b in &markers[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn sentinels_do_not_contain_markers() {
        for sentinel in [NO_METADATA, NO_DATA, NO_ANALYSIS] {
            assert!(!sentinel.contains(SQL_ERROR_MARKER));
            assert!(!sentinel.contains(CODE_ERROR_MARKER));
        }
    }
}
