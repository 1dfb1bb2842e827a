//! Parsing of version and OS release output.

use crate::ProbeError;
use regex::Regex;
use semver::Version;

/// Extract a `major.minor.patch` version from CLI output.
///
/// Handles the usual runtime banners:
///
/// - `Docker version 27.3.1, build ce12230` -> 27.3.1
/// - `podman version 5.2.2` -> 5.2.2
pub(crate) fn parse_version(output: &str) -> Result<Version, ProbeError> {
    let re = Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("Invalid regex pattern");
    let parse_failed = || ProbeError::QueryFailed {
        query: "runtime version".to_string(),
        message: format!("no version in {:?}", output.trim()),
    };

    let caps = re.captures(output).ok_or_else(parse_failed)?;
    let found = caps.get(0).map(|m| m.as_str()).ok_or_else(parse_failed)?;
    Version::parse(found).map_err(|_| parse_failed())
}

/// `VERSION_ID` from the contents of `/etc/os-release`.
pub(crate) fn parse_os_release(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let value = line.trim().strip_prefix("VERSION_ID=")?;
        let value = value.trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Build number from `cmd /c ver` output, e.g.
/// `Microsoft Windows [Version 10.0.22631.4317]` -> `10.0.22631.4317`.
pub(crate) fn parse_windows_ver(output: &str) -> Option<String> {
    let re = Regex::new(r"(\d+\.\d+\.\d+(?:\.\d+)?)").expect("Invalid regex pattern");
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First non-empty line of a release query, trimmed.
pub(crate) fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
