//! Scoped ignore rules.
//!
//! Rules come from ignore files. Files passed to [`IgnoreRuleSet::load`] apply
//! to the whole tree; files found in subdirectories during
//! [`IgnoreRuleSet::discover`] apply only beneath the directory holding them.
//!
//! Matching follows gitignore conventions: scopes are consulted from the
//! root downwards, later rules win over earlier ones, `!` re-includes, and
//! nothing beneath an excluded directory can be re-included.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use lsync_core::SyncError;

use crate::scanner::ScanOptions;

/// An ignore file applied at the root of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreFile {
    pub path: PathBuf,
    /// Missing optional files are treated as empty.
    pub optional: bool,
}

impl IgnoreFile {
    /// An ignore file that must exist.
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            optional: false,
        }
    }

    /// An ignore file that may be absent.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            optional: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    negated: bool,
    dir_only: bool,
    glob: Glob,
}

/// Rules declared for one directory, compiled into a single glob set.
#[derive(Debug, Clone)]
struct ScopeRules {
    rules: Vec<Rule>,
    set: GlobSet,
}

impl ScopeRules {
    fn compile(rules: Vec<Rule>) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for rule in &rules {
            builder.add(rule.glob.clone());
        }
        Ok(Self {
            set: builder.build()?,
            rules,
        })
    }

    /// The last rule matching `path`, honoring directory-only rules.
    fn last_match(&self, path: &str, is_dir: bool) -> Option<&Rule> {
        self.set
            .matches(path)
            .into_iter()
            .filter(|&i| is_dir || !self.rules[i].dir_only)
            .max()
            .map(|i| &self.rules[i])
    }
}

/// Immutable tree of ignore rules keyed by the directory that declared them.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    scopes: BTreeMap<String, ScopeRules>,
}

impl IgnoreRuleSet {
    /// Create a rule set that matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load root-scoped ignore files in order.
    ///
    /// A missing file is an error unless it is optional; an empty file adds
    /// no rules.
    pub fn load(files: &[IgnoreFile]) -> Result<Self, SyncError> {
        let mut set = Self::new();
        for file in files {
            match fs::read_to_string(&file.path) {
                Ok(text) => set.extend_scope("", &text, &file.path.display().to_string())?,
                Err(err) if err.kind() == ErrorKind::NotFound && file.optional => {
                    debug!(path = %file.path.display(), "optional ignore file not present");
                }
                Err(err) => {
                    return Err(SyncError::config(format!(
                        "cannot read ignore file {}: {err}",
                        file.path.display()
                    )));
                }
            }
        }
        Ok(set)
    }

    /// Add patterns declared in directory `scope` (`""` for the root).
    pub fn with_patterns(mut self, scope: &str, text: &str) -> Result<Self, SyncError> {
        self.extend_scope(scope, text, "<inline>")?;
        Ok(self)
    }

    /// Walk `root` for per-directory ignore files named in `filenames`.
    ///
    /// Directories excluded by rules gathered so far are not descended
    /// into, so an ignore file inside an ignored directory has no effect.
    pub fn discover(
        mut self,
        root: &Path,
        filenames: &[String],
        options: &ScanOptions,
    ) -> Result<Self, SyncError> {
        if filenames.is_empty() {
            return Ok(self);
        }

        let mut pending = vec![String::new()];
        while let Some(dir) = pending.pop() {
            let abs = if dir.is_empty() {
                root.to_path_buf()
            } else {
                root.join(&dir)
            };

            for name in filenames {
                let file = abs.join(name);
                match fs::read_to_string(&file) {
                    Ok(text) => {
                        debug!(scope = %dir, file = %file.display(), "loading ignore file");
                        self.extend_scope(&dir, &text, &file.display().to_string())?;
                    }
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => warn!(file = %file.display(), "skipping unreadable ignore file: {err}"),
                }
            }

            let read_dir = match fs::read_dir(&abs) {
                Ok(read_dir) => read_dir,
                Err(err) => {
                    debug!(dir = %abs.display(), "cannot list directory: {err}");
                    continue;
                }
            };

            for child in read_dir.flatten() {
                let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir {
                    continue;
                }
                let Some(name) = child.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                let rel = if dir.is_empty() {
                    name
                } else {
                    format!("{dir}/{name}")
                };
                if options.is_reserved(&rel) || self.excludes(&rel, true) {
                    continue;
                }
                pending.push(rel);
            }
        }

        Ok(self)
    }

    /// Check whether `path` is excluded, including through an excluded
    /// ancestor directory.
    pub fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.scopes.is_empty() {
            return false;
        }
        for (idx, _) in path.match_indices('/') {
            if self.excludes(&path[..idx], true) {
                return true;
            }
        }
        self.excludes(path, is_dir)
    }

    /// Decide `path` alone, assuming its ancestors are already included.
    ///
    /// Walkers that prune excluded directories use this to avoid rechecking
    /// every ancestor.
    pub fn excludes(&self, path: &str, is_dir: bool) -> bool {
        let mut excluded = false;
        for (scope, rules) in self.scopes_for(path) {
            let relative = if scope.is_empty() {
                path
            } else {
                &path[scope.len() + 1..]
            };
            if let Some(rule) = rules.last_match(relative, is_dir) {
                excluded = !rule.negated;
            }
        }
        excluded
    }

    /// Total number of rules across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.values().map(|s| s.rules.len()).sum()
    }

    /// Check if the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scopes whose subtree contains `path`, shallowest first.
    fn scopes_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a str, &'a ScopeRules)> {
        std::iter::once("")
            .chain(path.match_indices('/').map(move |(idx, _)| &path[..idx]))
            .filter_map(move |scope| self.scopes.get(scope).map(|rules| (scope, rules)))
    }

    fn extend_scope(&mut self, scope: &str, text: &str, origin: &str) -> Result<(), SyncError> {
        let parsed = parse_rules(text, origin)?;
        if parsed.is_empty() {
            return Ok(());
        }

        let mut rules = self
            .scopes
            .remove(scope)
            .map(|existing| existing.rules)
            .unwrap_or_default();
        rules.extend(parsed);

        let compiled = ScopeRules::compile(rules)
            .map_err(|err| SyncError::config(format!("{origin}: {err}")))?;
        self.scopes.insert(scope.to_string(), compiled);
        Ok(())
    }
}

fn parse_rules(text: &str, origin: &str) -> Result<Vec<Rule>, SyncError> {
    let mut rules = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let Some((negated, dir_only, pattern)) = parse_line(line) else {
            continue;
        };
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| SyncError::config(format!("{origin}:{}: {err}", lineno + 1)))?;
        rules.push(Rule {
            negated,
            dir_only,
            glob,
        });
    }
    Ok(rules)
}

/// Translate one ignore-file line into `(negated, dir_only, glob)`.
fn parse_line(line: &str) -> Option<(bool, bool, String)> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (negated, body) = if line.starts_with("\\#") || line.starts_with("\\!") {
        (false, &line[1..])
    } else if let Some(rest) = line.strip_prefix('!') {
        (true, rest)
    } else {
        (false, line)
    };

    let (dir_only, body) = match body.strip_suffix('/') {
        Some(body) => (true, body),
        None => (false, body),
    };
    if body.is_empty() {
        return None;
    }

    let pattern = if body.contains('/') {
        body.strip_prefix('/').unwrap_or(body).to_string()
    } else {
        format!("**/{body}")
    };
    if pattern.is_empty() {
        return None;
    }
    Some((negated, dir_only, pattern))
}
