use glob_match::glob_match;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Filename patterns tried when no input file is given, highest priority first.
pub const CANDIDATE_PATTERNS: [&str; 6] = ["*.txt", "*.csv", "Batch*", "*maude*", "*fda*", "*url*"];

/// How much of each candidate is sniffed for MAUDE URLs.
const SNIFF_BYTES: u64 = 1000;

/// Find a batch links file in `dir`.
///
/// Regular, non-hidden files (symlinks followed) are matched against
/// [`CANDIDATE_PATTERNS`] in order; the first whose opening bytes mention both `MDRFOI__ID=` and
/// `accessdata.fda.gov` wins. Unreadable files are passed over.
pub fn auto_detect_input(dir: &Path) -> Option<PathBuf> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot scan directory for input");
            return None;
        }
    };
    names.sort();

    for pattern in CANDIDATE_PATTERNS {
        for name in names.iter().filter(|n| glob_match(pattern, n)) {
            let path = dir.join(name);
            if looks_like_batch_links(&path) {
                tracing::debug!(path = %path.display(), pattern, "Detected batch links file");
                return Some(path);
            }
        }
    }

    None
}

fn looks_like_batch_links(path: &Path) -> bool {
    let mut head = Vec::with_capacity(SNIFF_BYTES as usize);
    let read = fs::File::open(path).and_then(|f| f.take(SNIFF_BYTES).read_to_end(&mut head));
    if let Err(e) = read {
        tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable candidate");
        return false;
    }

    let head = String::from_utf8_lossy(&head);
    head.contains("MDRFOI__ID=") && head.contains("accessdata.fda.gov")
}
