use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

pub const DEFAULT_PATH: &str = "banned_words.txt";

/// Read one term per line, trimmed, skipping blank lines. Case is left alone.
///
/// A missing file yields an empty list; other I/O errors are returned.
pub fn load(path: &Path) -> Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            println!(
                "Error: {} not found. Proceeding without banned words check.",
                path.display()
            );
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {}", path.display()));
        }
    };

    let mut words = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let term = line.trim();
        if !term.is_empty() {
            words.push(term.to_string());
        }
    }

    if words.is_empty() {
        println!("No banned words found in {}.", path.display());
    } else {
        println!("Loaded {} banned words from {}.", words.len(), path.display());
    }
    debug!(?words, "banned words");
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn trims_and_skips_blank_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "  Lead \n\n\tasbestos\n   \nToxic Waste\n").unwrap();
        let words = load(f.path()).unwrap();
        assert_eq!(words, vec!["Lead", "asbestos", "Toxic Waste"]);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let words = load(&dir.path().join("banned_words.txt")).unwrap();
        assert!(words.is_empty());
    }

    #[test]
    fn directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).is_err());
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[b'o', b'k', b'\n', 0xff, 0xfe, b'\n']).unwrap();
        assert!(load(f.path()).is_err());
    }
}
