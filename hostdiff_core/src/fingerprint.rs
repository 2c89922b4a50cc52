use hostdiff_common::{Fingerprint, HostDiffError};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024; // 64KB buffer

/// Streaming BLAKE3 content fingerprinter
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprinter;

impl ContentFingerprinter {
    pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
        blake3::hash(bytes).into()
    }

    /// Hash a file, returning its fingerprint and the number of bytes read.
    pub fn fingerprint_file(path: &Path) -> Result<(Fingerprint, u64), HostDiffError> {
        let wrap = |source: std::io::Error| HostDiffError::Fingerprint {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(wrap)?;
        Self::fingerprint_reader(file).map_err(wrap)
    }

    pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<(Fingerprint, u64)> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
            total += n as u64;
        }

        Ok((hasher.finalize().into(), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_matches_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.html");
        fs::write(&path, b"<h1>hello</h1>").unwrap();

        let (fp, size) = ContentFingerprinter::fingerprint_file(&path).unwrap();
        assert_eq!(size, 14);
        assert_eq!(fp, ContentFingerprinter::fingerprint_bytes(b"<h1>hello</h1>"));
    }

    #[test]
    fn test_empty_file_has_stable_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, b"").unwrap();

        let (fp, size) = ContentFingerprinter::fingerprint_file(&path).unwrap();
        assert_eq!(size, 0);
        assert_eq!(fp, Fingerprint::from(blake3::hash(b"")));
        assert_ne!(fp, ContentFingerprinter::fingerprint_bytes(b"\0"));
    }

    #[test]
    fn test_large_input_spans_buffers() {
        let data = vec![7u8; BUFFER_SIZE * 3 + 17];
        let (fp, size) = ContentFingerprinter::fingerprint_reader(&data[..]).unwrap();
        assert_eq!(size, data.len() as u64);
        assert_eq!(fp, ContentFingerprinter::fingerprint_bytes(&data));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.css");

        let err = ContentFingerprinter::fingerprint_file(&path).unwrap_err();
        match err {
            HostDiffError::Fingerprint { path: failed, source } => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
