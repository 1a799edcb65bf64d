//! Registry of recognized compression types, with the file-extension and
//! human-readable description associated with each — used by callers that
//! want to, e.g., suggest a save-as extension for a given input.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
    Uncompressed,
    Gzip,
    Zstd,
    Lz4,
}

struct CompressionTypeInfo {
    kind: CompressionType,
    extension: Option<&'static str>,
    description: Option<&'static str>,
}

/// Only gzip carries a conventional extension; zstd and lz4 are recognized
/// purely by magic bytes and have no writer support in this crate, matching
/// the original registry's asymmetry (it only ever emitted gzip).
static COMPRESSION_TYPES: &[CompressionTypeInfo] = &[
    CompressionTypeInfo {
        kind: CompressionType::Uncompressed,
        extension: None,
        description: None,
    },
    CompressionTypeInfo {
        kind: CompressionType::Gzip,
        extension: Some("gz"),
        description: Some("gzip compressed"),
    },
    CompressionTypeInfo {
        kind: CompressionType::Zstd,
        extension: None,
        description: Some("zstd compressed"),
    },
    CompressionTypeInfo {
        kind: CompressionType::Lz4,
        extension: None,
        description: Some("lz4 compressed"),
    },
];

pub fn extension_for(kind: CompressionType) -> Option<&'static str> {
    COMPRESSION_TYPES.iter().find(|e| e.kind == kind).and_then(|e| e.extension)
}

pub fn description_for(kind: CompressionType) -> Option<&'static str> {
    COMPRESSION_TYPES.iter().find(|e| e.kind == kind).and_then(|e| e.description)
}

/// Every extension any known compression type is conventionally saved with.
pub fn known_extensions() -> Vec<&'static str> {
    COMPRESSION_TYPES.iter().filter_map(|e| e.extension).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_gzip_has_an_extension() {
        assert_eq!(extension_for(CompressionType::Gzip), Some("gz"));
        assert_eq!(extension_for(CompressionType::Zstd), None);
        assert_eq!(extension_for(CompressionType::Lz4), None);
        assert_eq!(extension_for(CompressionType::Uncompressed), None);
        assert_eq!(known_extensions(), vec!["gz"]);
    }
}
