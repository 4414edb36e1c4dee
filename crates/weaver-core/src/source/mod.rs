// Source resolution: class name -> source text
//
// Resolvers are the only place that touches the file system. The async read
// path lives in `AstParser`, which asks `locate` for a path and reads it with
// tokio itself.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    ast::{ClassName, InvalidClassName},
    proxy::ProxyError,
};

/// Default file extension for Weave sources
pub const DEFAULT_EXTENSION: &str = "wv";

/// Fully-qualified name of the embedded aspect trait
pub const ASPECT_CLASS: &str = "weaver.aop.Aspect";

const BUILTIN_SOURCES: &[(&str, &str)] = &[(
    ASPECT_CLASS,
    include_str!("../../builtin/weaver/aop/Aspect.wv"),
)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    File(PathBuf),
    Memory,
    Builtin,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::File(path) => write!(f, "{}", path.display()),
            SourceOrigin::Memory => f.write_str("<memory>"),
            SourceOrigin::Builtin => f.write_str("<builtin>"),
        }
    }
}

/// Source text of one class, immutable once read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub class: ClassName,
    pub text: String,
    pub origin: SourceOrigin,
}

/// Maps a class name to its source
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, class: &ClassName) -> Result<SourceUnit, ProxyError>;

    /// Path of the backing file, for resolvers that read from disk
    fn locate(&self, _class: &ClassName) -> Option<PathBuf> {
        None
    }

    /// Resolver name for logging
    fn name(&self) -> &'static str;
}

/// Looks classes up as `<root>/<package dirs>/<ShortName>.<ext>`
#[derive(Debug, Clone)]
pub struct FileSourceResolver {
    roots: Vec<PathBuf>,
    extension: String,
}

impl FileSourceResolver {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn relative_path(&self, class: &ClassName) -> PathBuf {
        let mut path = PathBuf::new();
        if let Some(pkg) = class.package() {
            path.extend(pkg.split('.'));
        }
        path.push(format!("{}.{}", class.short_name(), self.extension));
        path
    }

    // Class names are case-insensitive; fall back to a directory scan when the
    // spelling on disk differs from the requested one
    fn find_case_insensitive(root: &Path, relative: &Path) -> Option<PathBuf> {
        let mut current = root.to_path_buf();
        for component in relative.components() {
            let wanted = component.as_os_str().to_string_lossy().to_lowercase();
            let entry = std::fs::read_dir(&current).ok()?.find_map(|entry| {
                let entry = entry.ok()?;
                (entry.file_name().to_string_lossy().to_lowercase() == wanted)
                    .then(|| entry.path())
            })?;
            current = entry;
        }
        current.is_file().then_some(current)
    }
}

impl SourceResolver for FileSourceResolver {
    fn resolve(&self, class: &ClassName) -> Result<SourceUnit, ProxyError> {
        let path = self.locate(class).ok_or_else(|| {
            ProxyError::resolution(
                class,
                format!(
                    "no {} found under {} source root(s)",
                    self.relative_path(class).display(),
                    self.roots.len()
                ),
            )
        })?;
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ProxyError::resolution(class, format!("{}: {e}", path.display())))?;
        Ok(SourceUnit {
            class: class.clone(),
            text,
            origin: SourceOrigin::File(path),
        })
    }

    fn locate(&self, class: &ClassName) -> Option<PathBuf> {
        let relative = self.relative_path(class);
        self.roots.iter().find_map(|root| {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                Some(candidate)
            } else {
                Self::find_case_insensitive(root, &relative)
            }
        })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// In-memory sources, for embedders and tests
#[derive(Debug, Default)]
pub struct MemorySourceResolver {
    sources: DashMap<ClassName, String>,
}

impl MemorySourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, class: &str, text: impl Into<String>) -> Result<(), InvalidClassName> {
        self.sources.insert(ClassName::parse(class)?, text.into());
        Ok(())
    }

    pub fn with_source(self, class: &str, text: impl Into<String>) -> Result<Self, InvalidClassName> {
        self.add(class, text)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceResolver for MemorySourceResolver {
    fn resolve(&self, class: &ClassName) -> Result<SourceUnit, ProxyError> {
        let text = self
            .sources
            .get(class)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ProxyError::resolution(class, "not registered in memory"))?;
        Ok(SourceUnit {
            class: class.clone(),
            text,
            origin: SourceOrigin::Memory,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Sources compiled into the crate
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSourceResolver;

impl SourceResolver for BuiltinSourceResolver {
    fn resolve(&self, class: &ClassName) -> Result<SourceUnit, ProxyError> {
        BUILTIN_SOURCES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(class.as_str()))
            .map(|(_, text)| SourceUnit {
                class: class.clone(),
                text: (*text).to_string(),
                origin: SourceOrigin::Builtin,
            })
            .ok_or_else(|| ProxyError::resolution(class, "not a builtin class"))
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

/// Tries resolvers in order; the first one that knows the class wins
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn SourceResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl SourceResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn push(&mut self, resolver: Arc<dyn SourceResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl SourceResolver for ResolverChain {
    fn resolve(&self, class: &ClassName) -> Result<SourceUnit, ProxyError> {
        let mut misses = Vec::new();
        for resolver in &self.resolvers {
            match resolver.resolve(class) {
                Ok(unit) => {
                    debug!("Resolved {} via {} ({})", class, resolver.name(), unit.origin);
                    return Ok(unit);
                }
                Err(ProxyError::Resolution { message, .. }) => {
                    misses.push(format!("{}: {message}", resolver.name()));
                }
                Err(other) => return Err(other),
            }
        }
        if misses.is_empty() {
            misses.push("no resolvers configured".to_string());
        }
        Err(ProxyError::resolution(class, misses.join("; ")))
    }

    fn locate(&self, class: &ClassName) -> Option<PathBuf> {
        // Only the resolver that would win may supply a path
        for resolver in &self.resolvers {
            if let Some(path) = resolver.locate(class) {
                return Some(path);
            }
            if resolver.resolve(class).is_ok() {
                return None;
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
