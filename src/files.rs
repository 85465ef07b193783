use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const RECEIVED_PREFIX: &str = "recvd_";

/// Refuses names that would put `recvd_<name>` outside the output directory
/// or could not travel in a NUL-terminated command.
pub fn check_request_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Usage("FILENAME must not be empty".to_string()));
    }
    if name.contains(['/', '\\']) {
        return Err(Error::Usage(format!(
            "FILENAME {} contains a path separator; {}{} would land outside the output directory",
            name, RECEIVED_PREFIX, name
        )));
    }
    if name.contains('\0') {
        return Err(Error::Usage("FILENAME must not contain NUL bytes".to_string()));
    }
    Ok(())
}

pub fn received_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", RECEIVED_PREFIX, name))
}

pub fn build_file_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(m) => { return Err(Error::Io(std::io::Error::new(m.kind(), format!("Error opening file {} for writing: {}", path.display(), m)))); }
    };
    Ok(BufWriter::new(file))
}

/// Creates (or truncates) `recvd_<name>` in `dir` and writes `data` verbatim.
pub fn write_received_file(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = received_path(dir, name);
    let mut writer = build_file_writer(&path)?;
    writer.write_all(data)?;
    writer.flush()?;
    Ok(path)
}

/// Entry names of `root`, sorted, one per line with no trailing newline.
pub fn list_directory(root: &Path) -> Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names.join("\n"))
}

/// Contents of `name` inside `root`, or `None` if it cannot be served.
pub fn read_served_file(root: &Path, name: &str) -> Option<Vec<u8>> {
    if check_request_name(name).is_err() {
        return None;
    }
    let path = root.join(name);
    if !path.is_file() {
        return None;
    }
    fs::read(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_files_get_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_received_file(dir.path(), "report.txt", b"abc").unwrap();
        assert_eq!(path, dir.path().join("recvd_report.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn existing_output_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("recvd_a"), b"a much longer old body").unwrap();
        write_received_file(dir.path(), "a", b"new").unwrap();
        assert_eq!(fs::read(dir.path().join("recvd_a")).unwrap(), b"new");
    }

    #[test]
    fn separators_are_refused() {
        assert!(check_request_name("../x").is_err());
        assert!(check_request_name("/etc/passwd").is_err());
        assert!(check_request_name("a\\b").is_err());
        assert!(check_request_name("").is_err());
        assert!(check_request_name("..").is_ok());
        assert!(check_request_name("notes v2.txt").is_ok());
    }

    #[test]
    fn listing_is_sorted_and_newline_joined() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"").unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        assert_eq!(list_directory(dir.path()).unwrap(), "a.txt\nb.txt\nsub");
    }

    #[test]
    fn served_files_stay_inside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        assert_eq!(read_served_file(dir.path(), "a.txt"), Some(b"abc".to_vec()));
        assert_eq!(read_served_file(dir.path(), "missing"), None);
        assert_eq!(read_served_file(dir.path(), "sub"), None);
        assert_eq!(read_served_file(dir.path(), "../a.txt"), None);
    }
}
