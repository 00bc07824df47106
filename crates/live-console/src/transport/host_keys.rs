use std::path::{Path, PathBuf};

use russh_keys::key::KeyPair;
use tracing::{debug, info, warn};

use crate::error::ConsoleError;

/// Key algorithms probed in `<key_dir>`, in load order.
pub const HOST_KEY_ALGORITHMS: [&str; 4] = ["dsa", "ecdsa", "ed25519", "rsa"];

pub fn host_key_path(key_dir: &Path, algorithm: &str) -> PathBuf {
    key_dir.join(format!("ssh_host_{}_key", algorithm))
}

/// Loads every `ssh_host_<algorithm>_key` in `key_dir` the SSH stack can
/// use. Missing files and unsupported or unreadable keys are skipped.
pub fn load_host_keys(key_dir: &Path) -> Result<Vec<KeyPair>, ConsoleError> {
    let mut keys = Vec::new();
    for algorithm in HOST_KEY_ALGORITHMS {
        let path = host_key_path(key_dir, algorithm);
        if !path.is_file() {
            debug!(path = %path.display(), "Host key not present");
            continue;
        }
        match russh_keys::load_secret_key(&path, None) {
            Ok(key) => {
                info!(path = %path.display(), algorithm, "Loaded SSH host key");
                keys.push(key);
            }
            Err(e) => {
                warn!(path = %path.display(), algorithm, error = %e, "Skipping unusable SSH host key");
            }
        }
    }

    if keys.is_empty() {
        return Err(ConsoleError::HostKeys(key_dir.display().to_string()));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_paths_follow_naming_convention() {
        let path = host_key_path(Path::new("/etc/console"), "ed25519");
        assert_eq!(path, PathBuf::from("/etc/console/ssh_host_ed25519_key"));
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_host_keys(dir.path()).unwrap_err();
        assert!(matches!(err, ConsoleError::HostKeys(_)));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_unparseable_keys_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(host_key_path(dir.path(), "rsa"), "not a key").unwrap();
        std::fs::write(host_key_path(dir.path(), "dsa"), "").unwrap();
        assert!(matches!(
            load_host_keys(dir.path()),
            Err(ConsoleError::HostKeys(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(load_host_keys(&missing).is_err());
    }
}
