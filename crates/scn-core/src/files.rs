use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::FileError;
use crate::schema::ProjectDesc;

pub const SCENE_SUFFIX: &str = ".scene.json";

pub fn load_project_file(path: &Path) -> Result<ProjectDesc, FileError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Untyped load, for pointer queries over files that may not be valid mappings.
pub fn load_json_value(path: &Path) -> Result<serde_json::Value, FileError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

pub fn save_project_file(path: &Path, desc: &ProjectDesc) -> Result<(), FileError> {
    let s = serde_json::to_string_pretty(desc)?;
    fs::write(path, s)?;
    Ok(())
}

pub fn find_scene_files(dir: &Path) -> Result<Vec<PathBuf>, FileError> {
    if !dir.is_dir() {
        return Err(FileError::NotADirectory(dir.to_path_buf()));
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        let p = entry.path();
        if p.is_file()
            && p
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|n| n.ends_with(SCENE_SUFFIX))
        {
            out.push(p.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

/// Zips every scene file under `dir` into `<dir>_<timestamp>.zip` beside it.
/// Other files in the tree are not part of the snapshot.
pub fn snapshot_dir(dir: &Path) -> Result<PathBuf, FileError> {
    let files = find_scene_files(dir)?;
    let stem = dir.file_name().and_then(|s| s.to_str()).unwrap_or("scenes");
    let dest = beside(dir, stem);
    write_zip(&dest, dir, &files)?;
    log::info!(
        "snapshot of {} scene files under {} written to {}",
        files.len(),
        dir.display(),
        dest.display()
    );
    Ok(dest)
}

/// Zips `path` into `<name>_<timestamp>.zip` beside it, before it gets
/// overwritten. `None` when there is nothing to keep yet.
pub fn snapshot_file(path: &Path) -> Result<Option<PathBuf>, FileError> {
    if !path.is_file() {
        return Ok(None);
    }
    let base = path.parent().unwrap_or(Path::new(""));
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("scene");
    let stem = name.strip_suffix(SCENE_SUFFIX).unwrap_or(name);
    let dest = beside(path, stem);
    write_zip(&dest, base, &[path.to_path_buf()])?;
    log::info!("snapshot of {} written to {}", path.display(), dest.display());
    Ok(Some(dest))
}

fn beside(path: &Path, stem: &str) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let name = format!("{}_{}.zip", stem, ts);
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Entries are named by their path relative to `base`, with `/` separators.
fn write_zip(dest: &Path, base: &Path, files: &[PathBuf]) -> Result<(), FileError> {
    let mut zip = zip::ZipWriter::new(fs::File::create(dest)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    for file in files {
        let rel = file.strip_prefix(base).unwrap_or(file);
        let entry = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(entry, options)?;
        io::copy(&mut fs::File::open(file)?, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}
