//! Path resolution: confine file tools to the scope of an [`AccessLevel`].
//!
//! Resolution is lexical first (no filesystem access needed to reject an
//! input), then re-checked on the canonical form of the nearest existing
//! ancestor so a symlink can lead neither outside a confined root nor into a
//! forbidden one.

use ironloop_core::SecurityError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Roots rejected at every level, compared component-wise and case-insensitively.
pub const DEFAULT_FORBIDDEN_ROOTS: &[&str] = &[
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/root/.ssh",
    "/var/run",
    "/private/etc",
    "/private/var/run",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
    "C:\\ProgramData",
];

/// Graduated filesystem trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Relative paths under a dedicated sandbox directory
    Sandbox,
    /// Relative paths under the process working directory
    Project,
    /// Absolute paths anywhere outside the deny-list
    System,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Project => "project",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "project" => Ok(Self::Project),
            "system" => Ok(Self::System),
            other => Err(format!(
                "unknown access level '{other}' (expected sandbox, project or system)"
            )),
        }
    }
}

/// Resolve `raw` under `level` using the built-in deny-list.
///
/// `root` is the sandbox directory for [`AccessLevel::Sandbox`], the working
/// directory for [`AccessLevel::Project`], and the base for relative inputs at
/// [`AccessLevel::System`].
pub fn resolve_path(raw: &str, level: AccessLevel, root: &Path) -> Result<PathBuf, SecurityError> {
    PathGuard::new(level, root).resolve(raw)
}

/// A reusable resolver carrying the level, root and deny-list.
#[derive(Debug, Clone)]
pub struct PathGuard {
    level: AccessLevel,
    root: PathBuf,
    forbidden: Vec<String>,
}

impl PathGuard {
    pub fn new(level: AccessLevel, root: impl Into<PathBuf>) -> Self {
        Self {
            level,
            root: root.into(),
            forbidden: DEFAULT_FORBIDDEN_ROOTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add deny-list entries on top of the defaults.
    pub fn with_forbidden(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.forbidden.extend(extra);
        self
    }

    pub fn level(&self) -> AccessLevel {
        self.level
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, raw: &str) -> Result<PathBuf, SecurityError> {
        if raw.trim().is_empty() {
            return Err(SecurityError::EmptyPath);
        }
        if raw.contains('\0') {
            return Err(SecurityError::NullByte);
        }

        let absolute = is_absolute(raw);
        let segments = segments(raw);
        if segments.iter().any(|s| *s == "..") {
            return Err(SecurityError::PathTraversal { path: raw.into() });
        }

        match self.level {
            AccessLevel::Sandbox | AccessLevel::Project => {
                if absolute {
                    return Err(SecurityError::AbsolutePathDenied {
                        path: raw.into(),
                        level: self.level.to_string(),
                    });
                }
                let segments = if self.level == AccessLevel::Sandbox {
                    self.collapse_root_prefix(segments)
                } else {
                    segments
                };
                let resolved = segments.iter().fold(self.root.clone(), |p, s| p.join(s));
                self.check_contained(raw, &resolved)?;
                self.check_forbidden(raw, &resolved)?;
                Ok(resolved)
            }
            AccessLevel::System => {
                let resolved = if absolute {
                    PathBuf::from(raw)
                } else {
                    segments.iter().fold(self.root.clone(), |p, s| p.join(s))
                };
                self.check_forbidden(raw, &resolved)?;
                Ok(resolved)
            }
        }
    }

    /// Drop any number of leading segments that repeat the root's own name.
    fn collapse_root_prefix<'a>(&self, segments: Vec<&'a str>) -> Vec<&'a str> {
        let Some(name) = self.root.file_name().and_then(|n| n.to_str()) else {
            return segments;
        };
        let skip = segments
            .iter()
            .take_while(|s| s.eq_ignore_ascii_case(name))
            .count();
        segments[skip..].to_vec()
    }

    fn check_contained(&self, raw: &str, resolved: &Path) -> Result<(), SecurityError> {
        let Ok(real_root) = self.root.canonicalize() else {
            return Ok(());
        };
        match real_path(resolved) {
            Some(real) if !real.starts_with(&real_root) => Err(SecurityError::OutsideRoot {
                path: raw.into(),
                root: self.root.display().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Deny-list check on the lexical path and, when it differs, the real one.
    fn check_forbidden(&self, raw: &str, resolved: &Path) -> Result<(), SecurityError> {
        self.check_forbidden_form(raw, resolved)?;
        match real_path(resolved) {
            Some(real) if real != resolved => self.check_forbidden_form(raw, &real),
            _ => Ok(()),
        }
    }

    fn check_forbidden_form(&self, raw: &str, path: &Path) -> Result<(), SecurityError> {
        let path_str = path.to_string_lossy();
        let path_parts = lowered(&segments(&path_str));

        for forbidden in &self.forbidden {
            let forbidden_parts = lowered(&segments(forbidden));
            if !forbidden_parts.is_empty() && path_parts.starts_with(&forbidden_parts) {
                return Err(SecurityError::ForbiddenPath {
                    path: raw.into(),
                    forbidden: forbidden.clone(),
                });
            }
        }
        Ok(())
    }
}

/// True when a word would be read as a path outside the working root:
/// anything absolute or anything with a `..` segment.
pub fn is_path_like(word: &str) -> bool {
    is_absolute(word) || segments(word).iter().any(|s| *s == "..")
}

/// Canonical form of the nearest existing ancestor, with the missing tail
/// re-joined. `None` when no ancestor exists.
fn real_path(path: &Path) -> Option<PathBuf> {
    let mut tail = Vec::new();
    let mut current = path;
    loop {
        if let Ok(real) = current.canonicalize() {
            return Some(tail.iter().rev().fold(real, |p, s| p.join(s)));
        }
        tail.push(current.file_name()?);
        current = current.parent()?;
    }
}

/// Unix roots, UNC shares, drive letters and `~` all count as absolute.
fn is_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    raw.starts_with('/')
        || raw.starts_with('\\')
        || raw.starts_with('~')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Split on either separator, dropping empty and `.` segments.
fn segments(raw: &str) -> Vec<&str> {
    raw.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn lowered(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_root() -> PathBuf {
        PathBuf::from("/srv/agent/sandbox")
    }

    #[test]
    fn access_level_parsing() {
        assert_eq!("Sandbox".parse::<AccessLevel>().unwrap(), AccessLevel::Sandbox);
        assert_eq!(" system ".parse::<AccessLevel>().unwrap(), AccessLevel::System);
        assert!("root".parse::<AccessLevel>().is_err());
        assert_eq!(AccessLevel::Project.to_string(), "project");
    }

    #[test]
    fn empty_and_null_rejected_at_every_level() {
        for level in [AccessLevel::Sandbox, AccessLevel::Project, AccessLevel::System] {
            assert_eq!(resolve_path("", level, &sandbox_root()), Err(SecurityError::EmptyPath));
            assert_eq!(resolve_path("   ", level, &sandbox_root()), Err(SecurityError::EmptyPath));
            assert_eq!(
                resolve_path("notes\0.txt", level, &sandbox_root()),
                Err(SecurityError::NullByte)
            );
        }
    }

    #[test]
    fn traversal_rejected_at_every_level() {
        let inputs = [
            "../etc/passwd",
            "a/../../b",
            "a/b/..",
            "..\\windows",
            "/home/user/../../etc/passwd",
            "..",
        ];
        for level in [AccessLevel::Sandbox, AccessLevel::Project, AccessLevel::System] {
            for input in inputs {
                let result = resolve_path(input, level, &sandbox_root());
                assert!(result.is_err(), "{level} accepted {input}");
            }
        }
    }

    #[test]
    fn absolute_rejected_when_confined() {
        let inputs = ["/etc/passwd", "\\\\server\\share", "C:\\Windows\\x", "c:/data", "~/.ssh/id_rsa"];
        for level in [AccessLevel::Sandbox, AccessLevel::Project] {
            for input in inputs {
                assert!(
                    matches!(
                        resolve_path(input, level, &sandbox_root()),
                        Err(SecurityError::AbsolutePathDenied { .. })
                    ),
                    "{level} accepted {input}"
                );
            }
        }
    }

    #[test]
    fn legitimate_relative_paths_stay_under_root() {
        let root = sandbox_root();
        let cases = [
            ("notes.txt", "notes.txt"),
            ("./notes.txt", "notes.txt"),
            ("data/report.csv", "data/report.csv"),
            ("data\\report.csv", "data/report.csv"),
            ("a//b/./c", "a/b/c"),
            (".", ""),
        ];
        for (input, expected) in cases {
            let resolved = resolve_path(input, AccessLevel::Sandbox, &root).unwrap();
            assert!(resolved.starts_with(&root));
            assert_eq!(resolved, root.join(expected), "{input}");
        }
    }

    #[test]
    fn duplicated_sandbox_prefix_collapsed() {
        let root = sandbox_root();
        for input in ["sandbox/out.txt", "sandbox/sandbox/out.txt", "Sandbox/sandbox\\out.txt"] {
            assert_eq!(
                resolve_path(input, AccessLevel::Sandbox, &root).unwrap(),
                root.join("out.txt"),
                "{input}"
            );
        }
        assert_eq!(
            resolve_path("sandbox/out.txt", AccessLevel::Project, Path::new("/work")).unwrap(),
            PathBuf::from("/work/sandbox/out.txt")
        );
    }

    #[test]
    fn system_allows_absolute_outside_deny_list() {
        let resolved = resolve_path("/home/user/notes.txt", AccessLevel::System, Path::new("/")).unwrap();
        assert_eq!(resolved, PathBuf::from("/home/user/notes.txt"));
    }

    #[test]
    fn system_deny_list_is_component_wise_and_case_insensitive() {
        let root = Path::new("/home/user");
        for input in ["/etc/passwd", "/ETC/shadow", "/usr/bin/env", "/proc", "C:\\WINDOWS\\system32", "c:/program files/app"] {
            assert!(
                matches!(
                    resolve_path(input, AccessLevel::System, root),
                    Err(SecurityError::ForbiddenPath { .. })
                ),
                "accepted {input}"
            );
        }
        // prefix match is per component, not per character
        assert!(resolve_path("/etcetera/file", AccessLevel::System, root).is_ok());
        assert!(resolve_path("/usr/binaries", AccessLevel::System, root).is_ok());
    }

    #[test]
    fn extra_forbidden_roots() {
        let guard = PathGuard::new(AccessLevel::System, "/").with_forbidden(["/srv/secrets".to_string()]);
        assert!(matches!(
            guard.resolve("/srv/secrets/key.pem"),
            Err(SecurityError::ForbiddenPath { .. })
        ));
        assert!(guard.resolve("/srv/public/index.html").is_ok());
    }

    #[test]
    fn deny_list_applies_when_confined() {
        assert!(matches!(
            resolve_path("etc/passwd", AccessLevel::Project, Path::new("/")),
            Err(SecurityError::ForbiddenPath { .. })
        ));
        assert!(matches!(
            resolve_path("passwd", AccessLevel::Sandbox, Path::new("/etc")),
            Err(SecurityError::ForbiddenPath { .. })
        ));
        assert!(resolve_path("home/user/notes.txt", AccessLevel::Project, Path::new("/")).is_ok());
    }

    #[test]
    fn path_like_words() {
        for word in ["/etc/hostname", "~/.ssh", "C:\\x", "\\\\server\\share", "../up", "a/../b", ".."] {
            assert!(is_path_like(word), "{word}");
        }
        for word in ["-la", "notes.txt", "data/report.csv", "a..b", "--name=x"] {
            assert!(!is_path_like(word), "{word}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_into_forbidden_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("cfg");
        std::os::unix::fs::symlink("/etc", &link).unwrap();

        let target = link.join("passwd");
        let result = resolve_path(target.to_str().unwrap(), AccessLevel::System, Path::new("/"));
        assert!(matches!(result, Err(SecurityError::ForbiddenPath { .. })));

        // missing files under the link are still caught through the ancestor
        let missing = link.join("nested/new.conf");
        let result = resolve_path(missing.to_str().unwrap(), AccessLevel::System, Path::new("/"));
        assert!(matches!(result, Err(SecurityError::ForbiddenPath { .. })));

        // a confined root that is itself a link into a forbidden root
        let result = resolve_path("hostname", AccessLevel::Sandbox, &link);
        assert!(matches!(result, Err(SecurityError::ForbiddenPath { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
        std::fs::write(outside.path().join("secret.txt"), "x").unwrap();

        let result = resolve_path("link/secret.txt", AccessLevel::Sandbox, root.path());
        assert!(matches!(result, Err(SecurityError::OutsideRoot { .. })));

        std::fs::write(root.path().join("ok.txt"), "x").unwrap();
        assert!(resolve_path("ok.txt", AccessLevel::Sandbox, root.path()).is_ok());
        assert!(resolve_path("new.txt", AccessLevel::Sandbox, root.path()).is_ok());
    }
}
