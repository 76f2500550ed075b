//! Subject names from line-delimited text files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Name files read when none are given, in processing order.
pub const DEFAULT_NAME_FILES: [&str; 3] =
    ["contemporary.txt", "classical_new.txt", "classical_old.txt"];

pub fn default_name_files() -> Vec<PathBuf> {
    DEFAULT_NAME_FILES.iter().map(PathBuf::from).collect()
}

/// Read one subject per non-blank line, trimmed, in file order.
///
/// A file that cannot be read contributes nothing; the problem is logged
/// and the run carries on.
pub fn read_names(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let names = parse_names(&content);
            debug!("Read {} name(s) from {}", names.len(), path.display());
            names
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Warning: File {} not found", path.display());
            Vec::new()
        }
        Err(e) => {
            warn!("Warning: could not read {}: {e}", path.display());
            Vec::new()
        }
    }
}

pub fn parse_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Concatenate the names from every file, keeping duplicates.
pub fn load_subjects<P: AsRef<Path>>(paths: &[P]) -> Vec<String> {
    paths.iter().flat_map(|p| read_names(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn blank_lines_dropped() {
        assert_eq!(
            parse_names("Linus Torvalds\n\nElon Musk\n"),
            vec!["Linus Torvalds", "Elon Musk"]
        );
    }

    #[test]
    fn lines_are_trimmed() {
        assert_eq!(
            parse_names("  Naval Ravikant  \r\n\t\n Paul Graham"),
            vec!["Naval Ravikant", "Paul Graham"]
        );
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "Linus Torvalds\n\nElon Musk\n").unwrap();
        assert_eq!(read_names(&path), vec!["Linus Torvalds", "Elon Musk"]);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_names(dir.path().join("absent.txt")).is_empty());
    }

    #[test]
    fn files_concatenate_in_order_without_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let contemporary = dir.path().join("contemporary.txt");
        let classical_new = dir.path().join("classical_new.txt");
        let classical_old = dir.path().join("classical_old.txt");
        fs::write(&contemporary, "Sam Altman\nPeter Thiel\n").unwrap();
        fs::write(&classical_new, "\nFriedrich Nietzsche\nPeter Thiel\n").unwrap();
        fs::write(&classical_old, "Socrates\n").unwrap();

        let subjects = load_subjects(&[contemporary, classical_new, classical_old]);
        assert_eq!(
            subjects,
            vec![
                "Sam Altman",
                "Peter Thiel",
                "Friedrich Nietzsche",
                "Peter Thiel",
                "Socrates"
            ]
        );
    }

    #[test]
    fn missing_file_skipped_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        fs::write(&first, "Jeff Dean\n").unwrap();
        let subjects = load_subjects(&[first, dir.path().join("nope.txt")]);
        assert_eq!(subjects, vec!["Jeff Dean"]);
    }

    #[test]
    fn default_order() {
        let files = default_name_files();
        assert_eq!(files[0], PathBuf::from("contemporary.txt"));
        assert_eq!(files[2], PathBuf::from("classical_old.txt"));
    }
}
