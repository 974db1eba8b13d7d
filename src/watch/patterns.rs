// src/watch/patterns.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::config::model::WatchSection;
use crate::watch::path_utils::relative_str;

/// Paths the watch loop never registers and never pushes.
///
/// A path is ignored when any regex or glob matches its path relative to
/// the watch root. The root itself is never ignored, so directories above it
/// (say `me.github.io`) cannot hide the whole project.
#[derive(Clone)]
pub struct IgnoreMatcher {
    regexes: Vec<Regex>,
    globs: GlobSet,
}

impl fmt::Debug for IgnoreMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreMatcher")
            .field("regexes", &self.regexes.iter().map(Regex::as_str).collect::<Vec<_>>())
            .field("globs", &self.globs.len())
            .finish()
    }
}

impl IgnoreMatcher {
    pub fn new(regexes: &[String], globs: &[String]) -> Result<Self> {
        let regexes = regexes
            .iter()
            .map(|r| Regex::new(r).with_context(|| format!("invalid ignore regex: {r}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            regexes,
            globs: build_globset(globs)?,
        })
    }

    pub fn from_config(watch: &WatchSection) -> Result<Self> {
        Self::new(&watch.ignore_regex, &watch.ignore)
    }

    pub fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        match relative_str(root, path) {
            Some(rel) if !rel.is_empty() => {
                self.regexes.iter().any(|r| r.is_match(&rel)) || self.globs.is_match(&rel)
            }
            _ => false,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::default_ignore_regex;

    #[test]
    fn default_regex_ignores_git_paths() {
        let m = IgnoreMatcher::new(&default_ignore_regex(), &[]).unwrap();
        let root = Path::new("/p");

        assert!(m.is_ignored(root, Path::new("/p/.git")));
        assert!(m.is_ignored(root, Path::new("/p/.git/objects/ab")));
        assert!(m.is_ignored(root, Path::new("/p/.gitignore")));
        assert!(!m.is_ignored(root, Path::new("/p/src/main.js")));
    }

    #[test]
    fn globs_match_relative_paths() {
        let m = IgnoreMatcher::new(&[], &["node_modules/**".to_string(), "*.log".to_string()])
            .unwrap();
        let root = Path::new("/p");

        assert!(m.is_ignored(root, Path::new("/p/node_modules/x/index.js")));
        assert!(m.is_ignored(root, Path::new("/p/debug.log")));
        assert!(!m.is_ignored(root, Path::new("/p/src/app.js")));
        assert!(!m.is_ignored(root, Path::new("/p")));
    }

    #[test]
    fn regexes_do_not_see_the_root_path() {
        let m = IgnoreMatcher::new(&default_ignore_regex(), &[]).unwrap();
        let root = Path::new("/home/me/me.github.io");

        assert!(!m.is_ignored(root, root));
        assert!(!m.is_ignored(root, Path::new("/home/me/me.github.io/index.html")));
        assert!(!m.is_ignored(root, Path::new("/home/me/me.github.io/assets")));
        assert!(m.is_ignored(root, Path::new("/home/me/me.github.io/.git/HEAD")));
    }

    #[test]
    fn invalid_regex_is_reported() {
        assert!(IgnoreMatcher::new(&["(".to_string()], &[]).is_err());
    }
}
