// Audio intake module
// Builds batches of audio sources from a local directory or from uploaded buffers

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::AudioSource;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Directory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No .wav files found in {0}")]
    NoMatchingFiles(String),
}

/// A named byte buffer as received from an upload form
#[derive(Debug, Clone, Deserialize)]
pub struct Upload {
    pub name: String,
    pub data: Vec<u8>,
}

/// True when the name ends in `.wav`, ignoring case
pub fn is_wav_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".wav")
}

/// Enumerate `.wav` files directly inside `dir` (no recursion).
/// Entries are sorted by file name so repeated scans produce the same batch.
pub fn scan_directory(dir: &Path) -> Result<Vec<AudioSource>, IntakeError> {
    let metadata = fs::metadata(dir).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IntakeError::NotFound(dir.to_path_buf()),
        _ => IntakeError::Io {
            path: dir.to_path_buf(),
            source: e,
        },
    })?;

    if !metadata.is_dir() {
        return Err(IntakeError::NotADirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| IntakeError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IntakeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            log::warn!("Skipping non UTF-8 file name: {}", path.display());
            continue;
        };

        if is_wav_name(&name) && path.is_file() {
            sources.push(AudioSource::on_disk(name, path));
        }
    }

    if sources.is_empty() {
        return Err(IntakeError::NoMatchingFiles(dir.display().to_string()));
    }

    sources.sort_by(|a, b| a.name().cmp(b.name()));
    log::info!("Found {} .wav files in {}", sources.len(), dir.display());

    Ok(sources)
}

/// Turn uploads into in-memory sources, skipping anything that is not a `.wav`
pub fn sources_from_uploads(uploads: Vec<Upload>) -> Result<Vec<AudioSource>, IntakeError> {
    let total = uploads.len();
    let sources: Vec<AudioSource> = uploads
        .into_iter()
        .filter_map(|upload| {
            if is_wav_name(&upload.name) {
                Some(AudioSource::in_memory(upload.name, upload.data))
            } else {
                log::warn!("Skipping upload without .wav extension: {}", upload.name);
                None
            }
        })
        .collect();

    if sources.is_empty() {
        return Err(IntakeError::NoMatchingFiles(format!("{} uploaded files", total)));
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_wav_name_case_insensitive() {
        assert!(is_wav_name("a.wav"));
        assert!(is_wav_name("B.WAV"));
        assert!(is_wav_name("c.Wav"));
        assert!(!is_wav_name("d.wav.txt"));
        assert!(!is_wav_name("wav"));
    }

    #[test]
    fn test_scan_directory_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["zeta.WAV", "alpha.wav", "notes.txt", "mid.Wav"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.wav")).unwrap();

        let sources = scan_directory(dir.path()).unwrap();
        let names: Vec<&str> = sources.iter().map(AudioSource::name).collect();

        assert_eq!(names, vec!["alpha.wav", "mid.Wav", "zeta.WAV"]);
    }

    #[test]
    fn test_scan_directory_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("deep.wav"), b"").unwrap();
        std::fs::write(dir.path().join("top.wav"), b"").unwrap();

        let sources = scan_directory(dir.path()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "top.wav");
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = scan_directory(&dir.path().join("missing"));
        assert!(matches!(result, Err(IntakeError::NotFound(_))));
    }

    #[test]
    fn test_scan_file_path_is_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.wav");
        std::fs::write(&file, b"").unwrap();

        assert!(matches!(
            scan_directory(&file),
            Err(IntakeError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_scan_directory_without_wavs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.md"), b"").unwrap();

        assert!(matches!(
            scan_directory(dir.path()),
            Err(IntakeError::NoMatchingFiles(_))
        ));
    }

    #[test]
    fn test_uploads_skip_non_wav() {
        let uploads = vec![
            Upload { name: "a.wav".to_string(), data: vec![1, 2] },
            Upload { name: "cover.png".to_string(), data: vec![3] },
            Upload { name: "B.WAV".to_string(), data: vec![4] },
        ];

        let sources = sources_from_uploads(uploads).unwrap();
        let names: Vec<&str> = sources.iter().map(AudioSource::name).collect();
        assert_eq!(names, vec!["a.wav", "B.WAV"]);
    }

    #[test]
    fn test_uploads_without_wavs_is_intake_error() {
        let uploads = vec![Upload { name: "x.mp3".to_string(), data: vec![] }];
        assert!(matches!(
            sources_from_uploads(uploads),
            Err(IntakeError::NoMatchingFiles(_))
        ));
    }
}
