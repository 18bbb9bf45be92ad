#![forbid(unsafe_code)]

use crate::error::{AssetsError, AssetsResult};

/// Validate a caller-supplied asset id.
///
/// Ids become relative paths, so the same rules apply as for any cache path:
/// no absolute paths, no `..`, no empty segments. `/` is allowed for
/// namespacing (`env/forest/oak_01`). Backslashes are not normalized here;
/// an id is an identifier, not a Windows path.
pub(crate) fn validate_id(id: &str) -> AssetsResult<()> {
    if id.is_empty()
        || id.contains('\\')
        || id.starts_with('/')
        || id.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(AssetsError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Deterministic relative path for an asset: `<id>.<ext>`.
///
/// Stable across process restarts, which is what makes cross-run rediscovery
/// of materialized assets possible without re-registration of paths.
pub(crate) fn local_rel_path(id: &str, extension: &str) -> String {
    format!("{id}.{extension}")
}
