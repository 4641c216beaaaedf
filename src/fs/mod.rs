// src/fs/mod.rs

//! Small filesystem queries used by launcher resolution.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::EnvMap;

/// True only for an existing regular file (not a directory).
pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::metadata(path.as_ref())
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Look `name` up on `PATH`, taken from `env` when given and from the
/// process environment otherwise. A name containing a path separator is
/// checked directly.
pub async fn executable_exists(name: &str, env: Option<&EnvMap>) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        return is_executable(Path::new(name)).await;
    }

    let path_var: Option<OsString> = match env {
        Some(env) => env.get("PATH").map(OsString::from),
        None => std::env::var_os("PATH"),
    };
    let Some(path_var) = path_var else {
        return false;
    };

    for dir in std::env::split_paths(&path_var) {
        for candidate in candidates(&dir, name) {
            if is_executable(&candidate).await {
                debug!(name, path = ?candidate, "executable found");
                return true;
            }
        }
    }
    false
}

/// Copy of `env` with `dir` prepended to `PATH`.
pub fn add_to_path(dir: impl AsRef<Path>, env: &EnvMap) -> EnvMap {
    let mut dirs = vec![dir.as_ref().to_path_buf()];
    if let Some(existing) = env.get("PATH") {
        dirs.extend(std::env::split_paths(existing));
    }
    let mut env = env.clone();
    match std::env::join_paths(dirs) {
        Ok(joined) => {
            env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
        }
        Err(e) => debug!(error = %e, "cannot extend PATH"),
    }
    env
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    if cfg!(windows) {
        ["", ".exe", ".cmd", ".bat"]
            .iter()
            .map(|ext| dir.join(format!("{name}{ext}")))
            .collect()
    } else {
        vec![dir.join(name)]
    }
}

async fn is_executable(path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_path_prepends() {
        let env = EnvMap::from([("PATH".to_string(), "/usr/bin".to_string())]);
        let env = add_to_path("/opt/tools", &env);
        let dirs: Vec<PathBuf> = std::env::split_paths(&env["PATH"]).collect();
        assert_eq!(dirs[0], PathBuf::from("/opt/tools"));
        assert_eq!(dirs[1], PathBuf::from("/usr/bin"));
    }

    #[test]
    fn add_to_path_without_existing_path() {
        let env = add_to_path("/opt/tools", &EnvMap::new());
        assert_eq!(env.get("PATH").map(String::as_str), Some("/opt/tools"));
    }
}
