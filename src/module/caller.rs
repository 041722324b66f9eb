//! Requester locations.
//!
//! Every resolve request carries a [`Requester`] marker describing where the
//! request came from. The [`PathResolver`] turns that marker into the
//! [`RequesterDir`] used as the secondary cache key, so two files in
//! different directories asking for the same name can receive different
//! modules.
//!
//! Call-site capture relies on `#[track_caller]`: public entry points are
//! annotated so that wrapper functions are skipped and the recorded location
//! is the external caller's, never the resolver's own source file.

use std::fmt;
use std::panic::Location;
use std::path::{Component, Path, PathBuf};

use crate::error::ResolveError;

/// Marker identifying the code that issued a resolve request.
#[derive(Debug, Clone)]
pub enum Requester {
    /// A call-site location captured with `#[track_caller]`.
    Location(&'static Location<'static>),
    /// A source file captured by the `require!` macro: the caller crate's
    /// manifest directory and the file name rustc recorded for the call site.
    Source {
        root: &'static str,
        file: &'static str,
    },
    /// The file issuing the request.
    File(PathBuf),
    /// The directory issuing the request.
    Directory(PathBuf),
}

impl Requester {
    /// Capture the location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        Requester::Location(Location::caller())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Requester::File(path.into())
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Requester::Directory(path.into())
    }
}

impl From<RequesterDir> for Requester {
    fn from(dir: RequesterDir) -> Self {
        Requester::Directory(dir.0)
    }
}

/// Absolute, lexically normalized directory of a requester.
///
/// Normalization is idempotent: `RequesterDir::new(d.as_path())` yields `d`
/// again. The path is never opened; it is only compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequesterDir(PathBuf);

impl RequesterDir {
    /// Normalize an absolute directory path.
    ///
    /// Returns `None` for relative paths.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return None;
        }
        Some(RequesterDir(normalize(path)))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// True when `self` is a strict ancestor of `other`.
    ///
    /// The test is component-wise, so `/a/b` is an ancestor of `/a/b/c` but
    /// not of `/a/bc`.
    pub fn is_ancestor_of(&self, other: &RequesterDir) -> bool {
        self != other && other.0.starts_with(&self.0)
    }

    /// Iterate over this directory and all of its ancestors, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Path> {
        self.0.ancestors()
    }

    pub fn join(&self, child: impl AsRef<Path>) -> PathBuf {
        self.0.join(child)
    }

    /// Length of the normalized path, used to rank ancestor matches.
    pub(crate) fn specificity(&self) -> usize {
        self.0.as_os_str().len()
    }
}

impl AsRef<Path> for RequesterDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for RequesterDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Computes requester directories from [`Requester`] markers.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    /// Root used to anchor relative `#[track_caller]` file names.
    source_root: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(source_root: Option<PathBuf>) -> Self {
        PathResolver { source_root }
    }

    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    /// Compute the directory of the code that issued a request.
    ///
    /// An unanchored relative location is an error; the working directory
    /// is never used as a fallback.
    pub fn caller_directory(&self, requester: &Requester) -> Result<RequesterDir, ResolveError> {
        let file = match requester {
            Requester::Directory(dir) => {
                let dir = absolute(dir)?;
                return RequesterDir::new(&dir).ok_or_else(|| {
                    ResolveError::caller_unknown(format!("{} is not absolute", dir.display()))
                });
            }
            Requester::File(path) => absolute(path)?,
            Requester::Source { root, file } => anchor(Path::new(root), file)?,
            Requester::Location(location) => {
                let file = location.file();
                if Path::new(file).is_absolute() {
                    PathBuf::from(file)
                } else {
                    let root = self.source_root.as_deref().ok_or_else(|| {
                        ResolveError::caller_unknown(format!(
                            "relative call site '{}:{}' and no source root configured",
                            file,
                            location.line()
                        ))
                    })?;
                    anchor(root, file)?
                }
            }
        };

        let parent = file.parent().filter(|p| !p.as_os_str().is_empty());
        parent.and_then(RequesterDir::new).ok_or_else(|| {
            ResolveError::caller_unknown(format!("{} has no parent directory", file.display()))
        })
    }
}

/// Join a compile-time file name onto a root.
///
/// rustc records file names relative to the directory cargo was invoked
/// from, which for workspace members is an ancestor of the member's manifest
/// directory. The root and then each of its ancestors is tried until the
/// joined file exists; if none does, the root itself is used.
fn anchor(root: &Path, file: &str) -> Result<PathBuf, ResolveError> {
    if file.is_empty() {
        return Err(ResolveError::caller_unknown("empty source file name"));
    }
    let file = Path::new(file);
    if file.is_absolute() {
        return Ok(file.to_path_buf());
    }
    let root = absolute(root)?;
    let found = root
        .ancestors()
        .map(|base| base.join(file))
        .find(|candidate| candidate.is_file());
    Ok(found.unwrap_or_else(|| root.join(file)))
}

fn absolute(path: &Path) -> Result<PathBuf, ResolveError> {
    if path.as_os_str().is_empty() {
        return Err(ResolveError::caller_unknown("empty path"));
    }
    std::path::absolute(path).map_err(|e| {
        ResolveError::caller_unknown(format!("cannot absolutize {}: {}", path.display(), e))
    })
}

/// Lexically normalize an absolute path: drop `.` and fold `..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !matches!(
                    out.components().next_back(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) | None
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
