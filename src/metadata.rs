use crate::stream::SourceInfo;

/// Repairs probed metadata once after open. Container-format-specific
/// heuristics (frame counts, odd frame rates) live behind this seam, not in
/// the pipeline.
pub trait MetadataFixer: Send + Sync {
    fn fix(&self, info: &mut SourceInfo);
}

/// Leaves the probed info untouched.
pub struct NullFixer;

impl MetadataFixer for NullFixer {
    fn fix(&self, _info: &mut SourceInfo) {}
}
