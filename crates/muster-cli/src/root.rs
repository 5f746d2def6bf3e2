use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `MUSTER_ROOT` env var (passed in as `explicit`)
/// 2. `CLAUDE_PROJECT_DIR`, set by the agent runtime for hook commands
/// 3. Walk upward from `cwd` looking for `.muster/`
/// 4. Walk upward from `cwd` looking for `.git/`
/// 5. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    let project_dir = std::env::var_os("CLAUDE_PROJECT_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(explicit, project_dir.as_deref(), &cwd)
}

fn resolve_from(explicit: Option<&Path>, project_dir: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(p) = explicit.or(project_dir) {
        return p.to_path_buf();
    }
    find_upward(cwd, muster_core::paths::MUSTER_DIR)
        .or_else(|| find_upward(cwd, ".git"))
        .unwrap_or_else(|| cwd.to_path_buf())
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let result = resolve_from(Some(dir.path()), Some(other.path()), other.path());
        assert_eq!(result, dir.path());
    }

    #[test]
    fn project_dir_beats_discovery() {
        let dir = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        std::fs::create_dir_all(cwd.path().join(".muster")).unwrap();
        let result = resolve_from(None, Some(dir.path()), cwd.path());
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_muster_dir_above_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".muster")).unwrap();
        let subdir = dir.path().join("src/deep");
        std::fs::create_dir_all(&subdir).unwrap();
        assert_eq!(resolve_from(None, None, &subdir), dir.path());
    }

    #[test]
    fn muster_dir_beats_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let inner = dir.path().join("pkg");
        std::fs::create_dir_all(inner.join(".muster")).unwrap();
        assert_eq!(resolve_from(None, None, &inner), inner);
    }
}
