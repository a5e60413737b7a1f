use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use nix::unistd::{access, AccessFlags};
use tracing::debug;

pub fn is_usable_socket(path: &Path) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "socket candidate not found");
            return false;
        }
    };
    if !metadata.file_type().is_socket() {
        debug!(path = %path.display(), "socket candidate is not a socket");
        return false;
    }
    match access(path, AccessFlags::R_OK | AccessFlags::W_OK) {
        Ok(()) => true,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "socket candidate not accessible");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn bound_socket_is_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        assert!(is_usable_socket(&path));
    }

    #[test]
    fn directory_is_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_usable_socket(dir.path()));
    }
}
