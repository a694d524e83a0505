// Feature modules - self-contained registries merged into a host

use crate::error::OrbisResult;
use crate::metadata::OrbisMetadata;

/// A reusable package of declarations, such as authentication.
///
/// The registry returned by `metadata` must not contain the built-in types;
/// the host already has those and merging rejects duplicates.
pub trait OrbisModule: Send + Sync {
    fn name(&self) -> &str;

    /// Other names the module answers to in `Orbis::has_module`.
    fn provided_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn metadata(&self) -> OrbisResult<OrbisMetadata>;
}
