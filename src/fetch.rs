use crate::config::BoundariesConfig;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::ZipArchive;

/// Resolves the boundary geometry file, downloading and extracting the
/// configured archive when no local path is given.
///
/// Downloads are cached: an archive that already exists in the cache
/// directory is not fetched again, and an already-extracted archive is not
/// re-extracted.
pub async fn resolve_boundaries(config: &BoundariesConfig) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("Boundaries config needs either 'path' or 'url'"))?;

    let archive_name = url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Cannot derive an archive name from URL: {}", url))?;
    fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("Failed to create cache dir: {:?}", config.cache_dir))?;
    let archive_path = config.cache_dir.join(archive_name);

    if archive_path.exists() {
        info!(path = ?archive_path, "Using cached boundary archive");
    } else {
        download(url, &archive_path).await?;
    }

    let extract_dir = config
        .cache_dir
        .join(archive_path.file_stem().unwrap_or_default());
    if !extract_dir.exists() {
        extract_archive(&archive_path, &extract_dir)?;
    }

    find_shapefile(&extract_dir)?
        .ok_or_else(|| anyhow!("No .shp file found in extracted archive: {:?}", extract_dir))
}

async fn download(url: &str, dest: &Path) -> Result<()> {
    info!(url, "Downloading boundary archive");
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to request {}", url))?
        .error_for_status()
        .with_context(|| format!("Server rejected request for {}", url))?;
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read response body from {}", url))?;
    let mut file = fs::File::create(dest)
        .with_context(|| format!("Failed to create archive file: {:?}", dest))?;
    file.write_all(&bytes)?;
    info!(bytes = bytes.len(), path = ?dest, "Download complete");
    Ok(())
}

fn extract_archive(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    info!(archive = ?archive_path, dest = ?extract_dir, "Extracting archive");
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {:?}", archive_path))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("Not a ZIP archive: {:?}", archive_path))?;
    fs::create_dir_all(extract_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        // enclosed_name rejects absolute paths and ".." traversal.
        let rel_path = entry
            .enclosed_name()
            .ok_or_else(|| anyhow!("Archive entry has an unsafe path: {:?}", entry.name()))?;
        let out_path = extract_dir.join(rel_path);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = fs::File::create(&out_path)
            .with_context(|| format!("Failed to create extracted file: {:?}", out_path))?;
        std::io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

fn find_shapefile(dir: &Path) -> Result<Option<PathBuf>> {
    let mut found = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if let Some(nested) = find_shapefile(&path)? {
                return Ok(Some(nested));
            }
        } else if path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("shp"))
            .unwrap_or(false)
        {
            found = Some(path);
            break;
        }
    }
    Ok(found)
}
