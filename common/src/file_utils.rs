//! Wildcard file listing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns paths to all regular files in `dir` whose file name matches the
/// wildcard `pattern`, sorted by path.
///
/// `*` matches any run of characters, `?` matches exactly one. Matching is
/// case-insensitive.
pub fn files_matching(dir: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| wildcard_match(pattern, name))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Case-insensitive glob match supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0usize, 0usize);
    // Position of the last `*` in the pattern and the name index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = backtrack {
            p = star_p + 1;
            n = star_n + 1;
            backtrack = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
