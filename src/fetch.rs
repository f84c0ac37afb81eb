//! Placing model artifacts on disk before the cache needs them.
//!
//! The cache never downloads; this runs ahead of it, from the `fetch`
//! subcommand.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::{error::MaiaError, types::ModelVariant};

/// Download `url` into `<model_dir>/maia_<variant>.onnx` unless the file
/// already exists (or `force` is set). Returns the artifact path.
pub fn fetch_model(
    url: &str,
    model_dir: &Path,
    variant: ModelVariant,
    force: bool,
) -> Result<PathBuf, MaiaError> {
    let path = model_dir.join(variant.artifact_name());
    if path.is_file() && !force {
        tracing::info!(path = %path.display(), "model already present");
        return Ok(path);
    }

    fs::create_dir_all(model_dir)?;
    tracing::info!(%url, path = %path.display(), "downloading model");

    let mut response = reqwest::blocking::get(url)?;
    if !response.status().is_success() {
        return Err(MaiaError::DownloadStatus(response.status()));
    }

    install_artifact(&mut response, &path)?;

    tracing::info!(path = %path.display(), "download complete");
    Ok(path)
}

/// Stream `source` into `<path>.part`, then rename it over `path`. The
/// final name only ever holds a complete artifact; on any failure the
/// partial file is removed.
fn install_artifact(source: &mut impl Read, path: &Path) -> io::Result<()> {
    let partial = path.with_extension("onnx.part");
    let written = write_partial(source, &partial).and_then(|()| fs::rename(&partial, path));
    if written.is_err() {
        let _ = fs::remove_file(&partial);
    }
    written
}

fn write_partial(source: &mut impl Read, partial: &Path) -> io::Result<()> {
    let mut dest = fs::File::create(partial)?;
    io::copy(source, &mut dest)?;
    dest.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_artifact_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maia_rapid.onnx");
        fs::write(&path, b"onnx").unwrap();

        // the URL is never contacted
        let got = fetch_model("http://127.0.0.1:9/unused", dir.path(), ModelVariant::Rapid, false)
            .unwrap();
        assert_eq!(got, path);
        assert_eq!(fs::read(&path).unwrap(), b"onnx");
    }

    #[test]
    fn install_replaces_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maia_blitz.onnx");

        install_artifact(&mut &b"weights"[..], &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"weights");
        assert!(!dir.path().join("maia_blitz.onnx.part").exists());
    }

    #[test]
    fn failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maia_blitz.onnx");
        // a non-empty directory cannot be replaced by a file
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        assert!(install_artifact(&mut &b"weights"[..], &path).is_err());
        assert!(!dir.path().join("maia_blitz.onnx.part").exists());
    }
}
