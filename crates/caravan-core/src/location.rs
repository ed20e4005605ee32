//! Location references.

use std::convert::Infallible;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Scheme used for entries on the local disk.
pub const LOCAL_SCHEME: &str = "file";

/// Scheme used for entries staged in a trash backend.
pub const TRASH_SCHEME: &str = "trash";

/// An opaque, comparable handle to a filesystem entry.
///
/// Identity is the scheme plus a lexically normalised absolute path. A
/// reference says nothing about whether the entry exists: two references to
/// the same location always compare equal, before and after the entry is
/// created, moved or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRef {
    scheme: CompactString,
    path: PathBuf,
}

impl FileRef {
    /// Create a reference with an explicit scheme.
    pub fn new(scheme: &str, path: impl AsRef<Path>) -> Self {
        Self {
            scheme: CompactString::from(scheme.to_ascii_lowercase()),
            path: normalize(&rooted(path.as_ref())),
        }
    }

    /// Create a reference to a local path.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn local(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = std::path::absolute(path).unwrap_or_else(|_| rooted(path));
        Self {
            scheme: CompactString::const_new(LOCAL_SCHEME),
            path: normalize(&absolute),
        }
    }

    /// Parse either a `scheme://path` URI or a bare local path.
    pub fn parse(input: &str) -> Self {
        match input.split_once("://") {
            Some((scheme, rest)) if is_scheme(scheme) => Self::new(scheme, rest),
            _ => Self::local(input),
        }
    }

    /// The URI scheme, lowercase.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The normalised path within the scheme.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether this reference points at the local disk.
    pub fn is_local(&self) -> bool {
        self.scheme == LOCAL_SCHEME
    }

    /// The local path, if this is a local reference.
    pub fn as_local_path(&self) -> Option<&Path> {
        self.is_local().then_some(self.path.as_path())
    }

    /// The final path component, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// The final path component, lossily converted.
    pub fn name_lossy(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Reference to an entry inside this one.
    pub fn child(&self, name: impl AsRef<Path>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            path: normalize(&self.path.join(name)),
        }
    }

    /// Reference to the containing directory, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|parent| Self {
            scheme: self.scheme.clone(),
            path: parent.to_path_buf(),
        })
    }

    /// Reference to a sibling entry with a different name.
    pub fn with_name(&self, name: impl AsRef<Path>) -> Self {
        match self.parent() {
            Some(parent) => parent.child(name),
            None => self.child(name),
        }
    }

    /// Check whether this location lies strictly inside `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &FileRef) -> bool {
        self.scheme == ancestor.scheme
            && self.path != ancestor.path
            && self.path.starts_with(&ancestor.path)
    }

    /// Check whether this location is `other` or lies inside it.
    pub fn is_within(&self, other: &FileRef) -> bool {
        self == other || self.is_descendant_of(other)
    }

    /// Translate a location under `from` to the same relative location under `to`.
    pub fn rebase(&self, from: &FileRef, to: &FileRef) -> Option<Self> {
        if self.scheme != from.scheme {
            return None;
        }
        let relative = self.path.strip_prefix(&from.path).ok()?;
        Some(if relative.as_os_str().is_empty() {
            to.clone()
        } else {
            to.child(relative)
        })
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "{}", self.path.display())
        } else {
            write!(f, "{}://{}", self.scheme, self.path.display())
        }
    }
}

impl FromStr for FileRef {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&Path> for FileRef {
    fn from(path: &Path) -> Self {
        Self::local(path)
    }
}

impl From<PathBuf> for FileRef {
    fn from(path: PathBuf) -> Self {
        Self::local(path)
    }
}

impl From<&PathBuf> for FileRef {
    fn from(path: &PathBuf) -> Self {
        Self::local(path)
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn rooted(path: &Path) -> PathBuf {
    if path.has_root() {
        path.to_path_buf()
    } else {
        Path::new("/").join(path)
    }
}

/// Lexical normalisation: drops `.`, resolves `..` and trailing separators.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
