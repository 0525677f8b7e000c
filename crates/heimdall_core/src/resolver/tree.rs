//! Read-only views over the layered source trees.

use std::io;
use std::path::{Path, PathBuf};

/// One immediate child of a tree directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Existence and listing queries used by resolution and discovery.
///
/// Implementations never write.
pub trait SourceTree: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Lists immediate children of `dir`, sorted by path.
    fn entries(&self, dir: &Path) -> io::Result<Vec<TreeEntry>>;
}

/// Source tree backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSourceTree;

impl SourceTree for FsSourceTree {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn entries(&self, dir: &Path) -> io::Result<Vec<TreeEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            entries.push(TreeEntry {
                path: entry.path(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

/// Recursively lists files under `dir`, relative to `dir`.
pub fn walk_files(tree: &dyn SourceTree, dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in tree.entries(&current)? {
            if entry.is_dir {
                pending.push(entry.path);
            } else if let Ok(relative) = entry.path.strip_prefix(dir) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Appends `ext` to the final path component (`cli/ui` + `.ts` -> `cli/ui.ts`).
pub(crate) fn with_appended_extension(base: &Path, ext: &str) -> PathBuf {
    let mut raw = base.as_os_str().to_owned();
    raw.push(ext);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::{walk_files, with_appended_extension, FsSourceTree, SourceTree};
    use std::path::{Path, PathBuf};

    #[test]
    fn appends_rather_than_replaces_extension() {
        assert_eq!(
            with_appended_extension(Path::new("src/cli.v2"), ".ts"),
            PathBuf::from("src/cli.v2.ts")
        );
    }

    #[test]
    fn walks_nested_files_in_sorted_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("b/c")).expect("mkdir");
        std::fs::write(dir.path().join("b/c/deep.ts"), "").expect("write");
        std::fs::write(dir.path().join("a.ts"), "").expect("write");

        let files = walk_files(&FsSourceTree, dir.path()).expect("walk");
        assert_eq!(
            files,
            vec![PathBuf::from("a.ts"), PathBuf::from("b/c/deep.ts")]
        );
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(FsSourceTree.entries(&dir.path().join("nope")).is_err());
    }
}
