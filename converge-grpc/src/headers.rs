use tonic::metadata::MetadataMap;

/// Back-compat flags carried on every incoming monitor call, read once at the
/// edge so the rest of the engine only ever sees normalized values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorHeaders {
    /// Set when the calling SDK predates alias specs: an alias with an empty
    /// parent URN means "no parent" rather than "unset, inherit mine".
    pub old_sdk: bool,
    /// Whether the SDK opted into structured alias specs (`aliasSpecs`). When
    /// false, only the legacy `aliasURNs` list is honored.
    pub alias_specs: bool,
}

const OLD_SDK_HEADER: &str = "pulumi-rpc-old-sdk";
const ALIAS_SPECS_HEADER: &str = "pulumi-rpc-alias-specs";

impl MonitorHeaders {
    /// Read the back-compat headers from an incoming request's metadata.
    /// Missing or unparseable headers default to the modern behavior
    /// (`old_sdk: false`, `alias_specs: true`) rather than failing the call.
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        Self {
            old_sdk: flag(metadata, OLD_SDK_HEADER, false),
            alias_specs: flag(metadata, ALIAS_SPECS_HEADER, true),
        }
    }
}

fn flag(metadata: &MetadataMap, key: &str, default: bool) -> bool {
    metadata
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_headers_default_to_modern_sdk() {
        let headers = MonitorHeaders::from_metadata(&MetadataMap::new());
        assert!(!headers.old_sdk);
        assert!(headers.alias_specs);
    }

    #[test]
    fn old_sdk_header_is_honored() {
        let mut metadata = MetadataMap::new();
        metadata.insert(OLD_SDK_HEADER, "true".parse().unwrap());
        metadata.insert(ALIAS_SPECS_HEADER, "false".parse().unwrap());
        let headers = MonitorHeaders::from_metadata(&metadata);
        assert!(headers.old_sdk);
        assert!(!headers.alias_specs);
    }
}
