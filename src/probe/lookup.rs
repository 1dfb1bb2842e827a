//! PATH-based executable lookup with fallback locations.

use std::path::PathBuf;

/// Directories checked when an executable is not on PATH.
///
/// Freshly installed runtimes often land here before the user's shell
/// session picks up the new PATH.
#[cfg(not(windows))]
const FALLBACK_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/opt/homebrew/bin",
    "/Applications/Docker.app/Contents/Resources/bin",
];

#[cfg(windows)]
const FALLBACK_DIRS: &[&str] = &[r"C:\Program Files\Docker\Docker\resources\bin"];

/// Find an executable by name.
///
/// Tries the system PATH via `which` first, then the fallback directories.
pub(crate) fn find_executable(name: &str) -> Option<PathBuf> {
    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    FALLBACK_DIRS
        .iter()
        .map(|dir| PathBuf::from(dir).join(executable_file_name(name)))
        .find(|path| path.is_file())
}

#[cfg(windows)]
fn executable_file_name(name: &str) -> String {
    if name.ends_with(".exe") {
        name.to_string()
    } else {
        format!("{}.exe", name)
    }
}

#[cfg(not(windows))]
fn executable_file_name(name: &str) -> String {
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_find_common_executable() {
        let path = find_executable("sh").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_find_nonexistent_executable() {
        assert!(find_executable("definitely_not_a_real_executable_12345").is_none());
    }
}
