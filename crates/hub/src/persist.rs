// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store persistence: load/save JSON files with atomic writes.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load a JSON value from a file.
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)?;
    let value: T = serde_json::from_str(&contents)?;
    Ok(value)
}

/// Save a JSON value to a file atomically (write tmp + rename), mode 0600.
///
/// Owner-only permissions are set on the tmp file before the rename so the
/// final path never exists with wider access.
pub fn save<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
