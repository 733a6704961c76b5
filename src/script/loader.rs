//! Discovery of scripts and projects on the file system.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::types::ScriptKind;
use crate::Result;

/// File extension of script sources.
pub const SCRIPT_EXTENSION: &str = "lua";

/// A script or project found on disk, before options are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub path: PathBuf,
    pub kind: ScriptKind,
}

/// Scans the scripts and projects folders.
pub struct ScriptDiscovery {
    scripts_dir: PathBuf,
    projects_dir: PathBuf,
}

impl ScriptDiscovery {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(scripts_dir: P, projects_dir: Q) -> Self {
        Self {
            scripts_dir: scripts_dir.as_ref().to_path_buf(),
            projects_dir: projects_dir.as_ref().to_path_buf(),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Create both folders if they do not exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.scripts_dir, &self.projects_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Every script file under the scripts folder, sorted.
    pub fn script_paths(&self) -> BTreeSet<PathBuf> {
        collect_modules(&self.scripts_dir)
    }

    /// Every immediate subfolder of the projects folder, sorted.
    pub fn project_paths(&self) -> BTreeSet<PathBuf> {
        let mut paths = BTreeSet::new();
        let entries = match fs::read_dir(&self.projects_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "Cannot read projects folder {}: {}",
                    self.projects_dir.display(),
                    e
                );
                return paths;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                paths.insert(path);
            }
        }
        paths
    }

    /// Find a script file by name, ignoring case.
    pub fn find_script(&self, name: &str) -> Option<PathBuf> {
        self.script_paths()
            .into_iter()
            .find(|p| name_matches(p, name))
    }

    /// Find a project folder by name, ignoring case.
    pub fn find_project(&self, name: &str) -> Option<PathBuf> {
        self.project_paths()
            .into_iter()
            .find(|p| name_matches(p, name))
    }

    /// Scripts first, then projects. A name seen twice keeps its first
    /// occurrence and logs a warning for the rest.
    pub fn candidates(&self) -> Vec<Candidate> {
        let singles = self
            .script_paths()
            .into_iter()
            .map(|path| (path, ScriptKind::Single));
        let projects = self
            .project_paths()
            .into_iter()
            .map(|path| (path, ScriptKind::Project));

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (path, kind) in singles.chain(projects) {
            let name = entry_name(&path);
            if !seen.insert(name.clone()) {
                warn!(
                    "Found a duplicate script or project named '{}' at {}; only the first one will be loaded",
                    name,
                    path.display()
                );
                continue;
            }
            candidates.push(Candidate { name, path, kind });
        }
        candidates
    }
}

/// Every script file under `dir`, recursively.
pub fn collect_modules(dir: &Path) -> BTreeSet<PathBuf> {
    let mut found = BTreeSet::new();
    scan_directory(dir, &mut found);
    found
}

fn scan_directory(dir: &Path, found: &mut BTreeSet<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_directory(&path, found);
        } else if path.extension().is_some_and(|ext| ext == SCRIPT_EXTENSION) {
            found.insert(path);
        }
    }
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn name_matches(path: &Path, name: &str) -> bool {
    entry_name(path).eq_ignore_ascii_case(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ScriptDiscovery) {
        let dir = TempDir::new().unwrap();
        let discovery = ScriptDiscovery::new(dir.path().join("scripts"), dir.path().join("projects"));
        discovery.ensure_dirs().unwrap();
        (dir, discovery)
    }

    #[test]
    fn test_empty_folders() {
        let (_dir, discovery) = setup();
        assert!(discovery.script_paths().is_empty());
        assert!(discovery.project_paths().is_empty());
        assert!(discovery.candidates().is_empty());
    }

    #[test]
    fn test_missing_folders() {
        let dir = TempDir::new().unwrap();
        let discovery = ScriptDiscovery::new(dir.path().join("nope"), dir.path().join("nada"));
        assert!(discovery.candidates().is_empty());
    }

    #[test]
    fn test_scan_recursive() {
        let (_dir, discovery) = setup();
        let scripts = discovery.scripts_dir().to_path_buf();
        fs::create_dir_all(scripts.join("sub")).unwrap();
        fs::write(scripts.join("a.lua"), "").unwrap();
        fs::write(scripts.join("sub").join("b.lua"), "").unwrap();
        fs::write(scripts.join("readme.md"), "").unwrap();

        let paths = discovery.script_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&scripts.join("sub").join("b.lua")));
    }

    #[test]
    fn test_projects_are_subfolders() {
        let (_dir, discovery) = setup();
        let projects = discovery.projects_dir().to_path_buf();
        fs::create_dir_all(projects.join("shop")).unwrap();
        fs::write(projects.join("stray.lua"), "").unwrap();

        let paths: Vec<PathBuf> = discovery.project_paths().into_iter().collect();
        assert_eq!(paths, vec![projects.join("shop")]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let (_dir, discovery) = setup();
        let scripts = discovery.scripts_dir().to_path_buf();
        fs::create_dir_all(scripts.join("nested")).unwrap();
        fs::write(scripts.join("a.lua"), "").unwrap();
        fs::write(scripts.join("nested").join("a.lua"), "").unwrap();

        let candidates = discovery.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, scripts.join("a.lua"));
    }

    #[test]
    fn test_candidates_mix_kinds() {
        let (_dir, discovery) = setup();
        fs::write(discovery.scripts_dir().join("hello.lua"), "").unwrap();
        fs::create_dir_all(discovery.projects_dir().join("shop")).unwrap();

        let candidates = discovery.candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].kind, ScriptKind::Single);
        assert_eq!(candidates[1].name, "shop");
        assert_eq!(candidates[1].kind, ScriptKind::Project);
    }

    #[test]
    fn test_find_ignores_case() {
        let (_dir, discovery) = setup();
        fs::write(discovery.scripts_dir().join("Hello.lua"), "").unwrap();
        fs::create_dir_all(discovery.projects_dir().join("Shop")).unwrap();

        assert!(discovery.find_script("hello.lua").is_some());
        assert!(discovery.find_project("SHOP").is_some());
        assert!(discovery.find_script("missing.lua").is_none());
    }
}
