//! Node path validation and chroot mapping.

use tracing::warn;

use crate::ClientResult;
use crate::ZkError;

/// Checks that `path` is a well-formed absolute node path.
///
/// A sequential create may end with `/`: the ensemble appends the suffix.
pub(crate) fn validate_path(
    path: &str,
    sequential: bool,
) -> ClientResult<()> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(ZkError::BadArguments);
    }
    if path == "/" {
        return Ok(());
    }

    let body = if sequential && path.ends_with('/') {
        &path[1..path.len() - 1]
    } else {
        &path[1..]
    };
    if path.ends_with('/') && !sequential {
        return Err(ZkError::BadArguments);
    }
    if body.is_empty() {
        // "/" + sequential suffix
        return Ok(());
    }

    for segment in body.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ZkError::BadArguments);
        }
        if segment.chars().any(is_illegal_char) {
            return Err(ZkError::BadArguments);
        }
    }
    Ok(())
}

fn is_illegal_char(c: char) -> bool {
    matches!(c,
        '\u{0}'..='\u{1f}'
        | '\u{7f}'..='\u{9f}'
        | '\u{e000}'..='\u{f8ff}'
        | '\u{fff0}'..='\u{ffff}')
}

/// Prefix applied to every path the caller sends and removed from every path
/// the ensemble returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Chroot(Option<String>);

impl Chroot {
    /// `""` and `"/"` mean no chroot.
    pub(crate) fn parse(raw: &str) -> ClientResult<Self> {
        if raw.is_empty() || raw == "/" {
            return Ok(Self(None));
        }
        validate_path(raw, false)?;
        Ok(Self(Some(raw.to_string())))
    }

    pub(crate) fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub(crate) fn prepend(
        &self,
        path: &str,
    ) -> String {
        match &self.0 {
            None => path.to_string(),
            Some(root) if path == "/" => root.clone(),
            Some(root) => format!("{root}{path}"),
        }
    }

    pub(crate) fn strip(
        &self,
        server_path: &str,
    ) -> String {
        let Some(root) = &self.0 else {
            return server_path.to_string();
        };
        if server_path == root {
            return "/".to_string();
        }
        match server_path.strip_prefix(root.as_str()) {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => {
                warn!(%server_path, chroot = %root, "path outside chroot returned by server");
                server_path.to_string()
            }
        }
    }
}
