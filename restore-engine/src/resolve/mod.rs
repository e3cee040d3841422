//! Conflict resolver - classifies extracted files against the target tree.
//!
//! Two passes, both free of writes:
//! - `analyze` walks the extraction tree, applies the path filter and marks
//!   candidates whose target path already exists
//! - `resolve` decides an action per candidate from the session's strategy
//!
//! The executor copies nothing until every candidate carries a resolution.

pub mod filter;

pub use filter::PathFilter;

use crate::fs::walker::walk_files;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// How to treat a file that already exists at the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    Overwrite,
    Skip,
    Rename,
    /// Non-interactive: newer file wins
    #[default]
    Prompt,
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(ConflictStrategy::Overwrite),
            "skip" => Ok(ConflictStrategy::Skip),
            "rename" => Ok(ConflictStrategy::Rename),
            "prompt" => Ok(ConflictStrategy::Prompt),
            other => Err(format!("unknown conflict strategy: {}", other)),
        }
    }
}

/// Action decided for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Resolution {
    /// Nothing exists at the target path
    Create,
    Overwrite,
    Skip,
    Rename { target: PathBuf },
}

impl Resolution {
    /// Where the executor writes, or None for `Skip`
    pub fn destination<'a>(&'a self, candidate: &'a FileCandidate) -> Option<&'a Path> {
        match self {
            Resolution::Create | Resolution::Overwrite => Some(&candidate.target_path),
            Resolution::Rename { target } => Some(target),
            Resolution::Skip => None,
        }
    }
}

/// One extracted file that passed the filter
#[derive(Debug, Clone)]
pub struct FileCandidate {
    /// Path inside the extraction tree
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub relative_path: String,
    pub size: u64,
    pub modified: SystemTime,
    pub permissions: Option<u32>,
    pub exists_at_target: bool,
    pub target_modified: Option<SystemTime>,
    pub conflict: bool,
    pub resolution: Option<Resolution>,
    pub reason: Option<String>,
}

/// Walk `tree_root` and build candidates for everything `filter` accepts.
///
/// Blocking: call from `spawn_blocking`.
pub fn analyze(
    tree_root: &Path,
    target_root: &Path,
    filter: &PathFilter,
) -> std::io::Result<Vec<FileCandidate>> {
    let mut candidates = Vec::new();

    for file in walk_files(tree_root)? {
        if !filter.matches(&file.relative_path) {
            continue;
        }

        let target_path = target_root.join(&file.relative_path);
        let existing = std::fs::symlink_metadata(&target_path).ok();
        let exists_at_target = existing.is_some();

        candidates.push(FileCandidate {
            source_path: file.path,
            target_path,
            relative_path: file.relative_path,
            size: file.metadata.size,
            modified: file.metadata.modified,
            permissions: file.metadata.permissions,
            exists_at_target,
            target_modified: existing.and_then(|m| m.modified().ok()),
            conflict: exists_at_target,
            resolution: None,
            reason: None,
        });
    }

    Ok(candidates)
}

/// Annotate every candidate with a resolution. Copies nothing.
///
/// Blocking: `rename` probes the target directory.
pub fn resolve(candidates: &mut [FileCandidate], strategy: ConflictStrategy) {
    // Target paths this session will write to; rename probing must avoid
    // them as well as whatever is already on disk.
    let mut claimed: HashSet<PathBuf> = candidates.iter().map(|c| c.target_path.clone()).collect();

    for candidate in candidates.iter_mut() {
        let (resolution, reason) = resolve_candidate(candidate, strategy, &mut claimed);
        candidate.resolution = Some(resolution);
        candidate.reason = Some(reason);
    }
}

/// Decide the action for a single candidate.
pub fn resolve_candidate(
    candidate: &FileCandidate,
    strategy: ConflictStrategy,
    claimed: &mut HashSet<PathBuf>,
) -> (Resolution, String) {
    if !candidate.conflict {
        return (Resolution::Create, "no conflict".to_string());
    }

    match strategy {
        ConflictStrategy::Overwrite => (Resolution::Overwrite, "overwrite policy".to_string()),
        ConflictStrategy::Skip => (Resolution::Skip, "skip policy".to_string()),
        ConflictStrategy::Rename => {
            let target = next_free_name(&candidate.target_path, claimed);
            claimed.insert(target.clone());
            (Resolution::Rename { target }, "rename policy".to_string())
        }
        ConflictStrategy::Prompt => match candidate.target_modified {
            Some(existing) if candidate.modified > existing => {
                (Resolution::Overwrite, "backup newer".to_string())
            }
            Some(existing) if candidate.modified < existing => {
                (Resolution::Skip, "existing newer".to_string())
            }
            Some(_) => (Resolution::Skip, "same time".to_string()),
            // Existing entry without a readable mtime: keep it
            None => (Resolution::Skip, "existing newer".to_string()),
        },
    }
}

/// `name.ext` -> `name_1.ext`, `name_2.ext`, ... until unused.
pub fn next_free_name(path: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().to_string());

    let mut counter = 1u64;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let probe = parent.join(name);
        if !claimed.contains(&probe) && std::fs::symlink_metadata(&probe).is_err() {
            return probe;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn set_mtime(path: &Path, secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        tree: PathBuf,
        target: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        let target = dir.path().join("target");
        fs::create_dir_all(tree.join("docs")).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(tree.join("a.txt"), b"backup a").unwrap();
        fs::write(tree.join("docs/b.md"), b"backup b").unwrap();
        fs::write(tree.join("c.tmp"), b"temp").unwrap();
        Fixture { _dir: dir, tree, target }
    }

    #[test]
    fn test_analyze_marks_conflicts_and_filters() {
        let fx = fixture();
        fs::write(fx.target.join("a.txt"), b"existing").unwrap();

        let filter = PathFilter::new(&[], &["*.tmp".to_string()]).unwrap();
        let candidates = analyze(&fx.tree, &fx.target, &filter).unwrap();

        let rels: Vec<_> = candidates.iter().map(|c| c.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["a.txt", "docs/b.md"]);
        assert!(candidates[0].conflict);
        assert!(!candidates[1].conflict);
        assert_eq!(candidates[1].target_path, fx.target.join("docs/b.md"));
        assert!(candidates.iter().all(|c| c.resolution.is_none()));
    }

    #[test]
    fn test_prompt_strategy_compares_mtimes() {
        let fx = fixture();
        fs::write(fx.target.join("a.txt"), b"existing").unwrap();
        fs::create_dir_all(fx.target.join("docs")).unwrap();
        fs::write(fx.target.join("docs/b.md"), b"existing").unwrap();
        fs::write(fx.target.join("c.tmp"), b"existing").unwrap();

        set_mtime(&fx.tree.join("a.txt"), 2_000);
        set_mtime(&fx.target.join("a.txt"), 1_000);
        set_mtime(&fx.tree.join("docs/b.md"), 1_000);
        set_mtime(&fx.target.join("docs/b.md"), 2_000);
        set_mtime(&fx.tree.join("c.tmp"), 1_500);
        set_mtime(&fx.target.join("c.tmp"), 1_500);

        let mut candidates = analyze(&fx.tree, &fx.target, &PathFilter::allow_all()).unwrap();
        resolve(&mut candidates, ConflictStrategy::Prompt);

        let by_rel = |rel: &str| candidates.iter().find(|c| c.relative_path == rel).unwrap();
        assert_eq!(by_rel("a.txt").resolution, Some(Resolution::Overwrite));
        assert_eq!(by_rel("a.txt").reason.as_deref(), Some("backup newer"));
        assert_eq!(by_rel("docs/b.md").resolution, Some(Resolution::Skip));
        assert_eq!(by_rel("docs/b.md").reason.as_deref(), Some("existing newer"));
        assert_eq!(by_rel("c.tmp").resolution, Some(Resolution::Skip));
        assert_eq!(by_rel("c.tmp").reason.as_deref(), Some("same time"));
    }

    #[test]
    fn test_fixed_strategies() {
        let fx = fixture();
        fs::write(fx.target.join("a.txt"), b"existing").unwrap();

        for (strategy, expected) in [
            (ConflictStrategy::Overwrite, Resolution::Overwrite),
            (ConflictStrategy::Skip, Resolution::Skip),
        ] {
            let mut candidates = analyze(&fx.tree, &fx.target, &PathFilter::allow_all()).unwrap();
            resolve(&mut candidates, strategy);
            assert_eq!(candidates[0].resolution, Some(expected));
            assert!(candidates[1..]
                .iter()
                .all(|c| c.resolution == Some(Resolution::Create)));
        }
    }

    #[test]
    fn test_rename_probes_past_existing_and_claimed_names() {
        let fx = fixture();
        fs::write(fx.target.join("a.txt"), b"existing").unwrap();
        fs::write(fx.target.join("a_1.txt"), b"older rename").unwrap();
        // The backup itself carries a_2.txt, so that name is claimed too
        fs::write(fx.tree.join("a_2.txt"), b"backup a_2").unwrap();

        let mut candidates = analyze(&fx.tree, &fx.target, &PathFilter::allow_all()).unwrap();
        resolve(&mut candidates, ConflictStrategy::Rename);

        let a = candidates.iter().find(|c| c.relative_path == "a.txt").unwrap();
        assert_eq!(
            a.resolution,
            Some(Resolution::Rename {
                target: fx.target.join("a_3.txt")
            })
        );
    }

    #[test]
    fn test_rename_without_extension() {
        let claimed = HashSet::new();
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Makefile"), b"x").unwrap();
        assert_eq!(
            next_free_name(&dir.path().join("Makefile"), &claimed),
            dir.path().join("Makefile_1")
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let fx = fixture();
        fs::write(fx.target.join("a.txt"), b"existing").unwrap();
        fs::write(fx.target.join("c.tmp"), b"existing").unwrap();

        let run = || {
            let mut candidates = analyze(&fx.tree, &fx.target, &PathFilter::allow_all()).unwrap();
            resolve(&mut candidates, ConflictStrategy::Rename);
            candidates
                .into_iter()
                .map(|c| (c.relative_path, c.resolution))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("SKIP".parse::<ConflictStrategy>(), Ok(ConflictStrategy::Skip));
        assert!("merge".parse::<ConflictStrategy>().is_err());
    }
}
