//! Working-directory layout: initialization, composer selection, flattening
//! and merging externally produced splits.

use crate::discover::{is_archive, is_midi};
use anyhow::{Context, Result};
use maestroconf::CorpusConfig;
use std::path::{Path, PathBuf};

pub const SPLITS: [&str; 3] = ["train", "test", "val"];

/// Remove everything inside `dir`, creating it when missing. Entries that
/// cannot be removed are logged.
pub fn clear_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(ft) if ft.is_dir() => std::fs::remove_dir_all(&path),
            _ => std::fs::remove_file(&path),
        };
        if let Err(e) = removed {
            tracing::warn!("Failed to delete {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// Reset the working directories, then lay out one folder per composer in
/// the output directory and one per split in the chunked directory.
pub fn init(config: &CorpusConfig) -> Result<()> {
    let dirs = [
        &config.output_dir,
        &config.extracted_features_dir,
        &config.reports_dir,
        &config.train_test_val_dir,
        &config.chunked_output_dir,
    ];
    for dir in dirs {
        clear_dir(dir)?;
    }

    for composer in &config.composers {
        let path = config.output_dir.join(composer);
        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!("Failed to create {}: {}", path.display(), e);
        }
    }
    for split in SPLITS {
        let path = config.chunked_output_dir.join(split);
        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!("Failed to create {}: {}", path.display(), e);
        }
    }

    tracing::info!(
        "Initialized {}",
        dirs.iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Copy a directory tree, merging into whatever already exists at `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy each configured composer's folder from the input root into the output
/// directory, optionally flattening it afterwards. Returns the composers copied.
pub fn select(config: &CorpusConfig, flatten: bool) -> Result<Vec<String>> {
    let mut selected = Vec::new();
    for composer in &config.composers {
        let src = config.input_dir.join(composer);
        if !src.is_dir() {
            tracing::warn!("No folder for {} under {}", composer, config.input_dir.display());
            continue;
        }

        let dst = config.output_dir.join(composer);
        match copy_tree(&src, &dst) {
            Ok(count) => tracing::info!("Selected {} ({} files)", composer, count),
            Err(e) => {
                tracing::warn!("Failed to copy the files of {}: {:#}", composer, e);
                continue;
            }
        }

        if flatten {
            let stats = flatten_dir(&dst)?;
            tracing::info!(
                "Flattened {}: {} extracted, {} moved, {} removed",
                composer,
                stats.extracted,
                stats.moved,
                stats.removed
            );
        }
        selected.push(composer.clone());
    }
    Ok(selected)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlattenStats {
    /// MIDI files unpacked from zip archives.
    pub extracted: usize,
    pub moved: usize,
    pub removed: usize,
}

fn nested_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Unpack the MIDI entries of a zip archive into a folder named after it,
/// next to the archive. Returns the number of files written.
fn extract_archive(archive: &Path) -> Result<usize> {
    let file = std::fs::File::open(archive)
        .with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to read {}", archive.display()))?;

    let stem = archive.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let dest = archive.with_file_name(stem);

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        // Entries escaping the archive root are skipped
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        if entry.is_dir() || !is_midi(&relative) {
            continue;
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = std::fs::File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to unpack {}", relative.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Unpack zip archives, move every nested MIDI file up into `dir`, delete
/// other files and remove folders left empty. Archives that cannot be read
/// are left in place.
///
/// A moved file whose name is already taken is prefixed with the folders it
/// came from, so `suites/no1/prelude.mid` becomes `suites_no1_prelude.mid`.
/// Archive contents count as a folder named after the archive.
pub fn flatten_dir(dir: &Path) -> Result<FlattenStats> {
    let mut stats = FlattenStats::default();

    for archive in nested_files(dir).into_iter().filter(|p| is_archive(p)) {
        match extract_archive(&archive) {
            Ok(count) => {
                stats.extracted += count;
                if let Err(e) = std::fs::remove_file(&archive) {
                    tracing::warn!("Failed to delete {}: {}", archive.display(), e);
                }
            }
            Err(e) => tracing::warn!("Skipping archive {}: {:#}", archive.display(), e),
        }
    }

    for path in nested_files(dir) {
        if is_archive(&path) {
            continue;
        }

        if !is_midi(&path) {
            match std::fs::remove_file(&path) {
                Ok(()) => stats.removed += 1,
                Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
            }
            continue;
        }

        if path.parent() == Some(dir) {
            continue;
        }
        let target = flattened_target(dir, &path);
        match move_file(&path, &target) {
            Ok(()) => stats.moved += 1,
            Err(e) => tracing::warn!("Failed to move {}: {:#}", path.display(), e),
        }
    }

    let folders: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    for folder in folders {
        let empty = std::fs::read_dir(&folder)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            if let Err(e) = std::fs::remove_dir(&folder) {
                tracing::warn!("Failed to remove {}: {}", folder.display(), e);
            }
        }
    }

    Ok(stats)
}

fn flattened_target(dir: &Path, path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    let plain = dir.join(&name);
    if !plain.exists() {
        return plain;
    }

    let prefix = path
        .parent()
        .and_then(|p| p.strip_prefix(dir).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("_")
        })
        .unwrap_or_default();
    dir.join(format!("{}_{}", prefix, name.to_string_lossy()))
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, dst).with_context(|| format!("Failed to copy to {}", dst.display()))?;
    std::fs::remove_file(src).with_context(|| format!("Failed to delete {}", src.display()))?;
    Ok(())
}

/// Move `<splits>/{train,test,val}/<composer>/*` into `<chunked>/{train,test,val}/`.
/// Missing split or composer folders are skipped. Returns the number of files moved.
pub fn merge_splits(splits_dir: &Path, chunked_dir: &Path, composers: &[String]) -> Result<usize> {
    let mut moved = 0;
    for split in SPLITS {
        let destination = chunked_dir.join(split);
        std::fs::create_dir_all(&destination)
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        for composer in composers {
            let source = splits_dir.join(split).join(composer);
            let entries = match std::fs::read_dir(&source) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", source.display(), e);
                    continue;
                }
            };

            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let target = destination.join(entry.file_name());
                match move_file(&path, &target) {
                    Ok(()) => moved += 1,
                    Err(e) => tracing::warn!("Failed to move {}: {:#}", path.display(), e),
                }
            }
        }
    }

    tracing::info!("Moved {} split files into {}", moved, chunked_dir.display());
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn config_in(root: &Path) -> CorpusConfig {
        CorpusConfig {
            input_dir: root.join("raw"),
            output_dir: root.join("selected"),
            extracted_features_dir: root.join("features"),
            reports_dir: root.join("reports"),
            train_test_val_dir: root.join("splits"),
            chunked_output_dir: root.join("chunked"),
            composers: vec!["Bach".into(), "Mozart".into()],
            num_segments: 3,
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn init_clears_and_lays_out() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        touch(&config.output_dir.join("stale/old.mid"));
        touch(&config.reports_dir.join("old.html"));

        init(&config).unwrap();

        assert_eq!(names(&config.output_dir), vec!["Bach", "Mozart"]);
        assert_eq!(names(&config.chunked_output_dir), vec!["test", "train", "val"]);
        assert!(names(&config.reports_dir).is_empty());
        assert!(config.train_test_val_dir.is_dir());
    }

    #[test]
    fn select_copies_only_configured_composers() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        touch(&config.input_dir.join("Bach/a.mid"));
        touch(&config.input_dir.join("Liszt/b.mid"));

        let selected = select(&config, false).unwrap();

        assert_eq!(selected, vec!["Bach".to_string()]);
        assert!(config.output_dir.join("Bach/a.mid").is_file());
        assert!(!config.output_dir.join("Liszt").exists());
    }

    #[test]
    fn flatten_moves_midi_and_prunes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Bach");
        touch(&root.join("top.mid"));
        touch(&root.join("suites/no1/prelude.mid"));
        touch(&root.join("suites/no2/prelude.mid"));
        touch(&root.join("suites/readme.txt"));

        let stats = flatten_dir(&root).unwrap();

        assert_eq!(
            stats,
            FlattenStats {
                extracted: 0,
                moved: 2,
                removed: 1,
            }
        );
        assert_eq!(names(&root), vec!["prelude.mid", "suites_no2_prelude.mid", "top.mid"]);
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        use std::io::Write;

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, bytes) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn flatten_unpacks_archives() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Bach");
        touch(&root.join("prelude.mid"));
        write_zip(
            &root.join("bundles/set.zip"),
            &[
                ("partitas/no1/prelude.mid", b"MThd"),
                ("gigue.MID", b"MThd"),
                ("notes.txt", b"x"),
            ],
        );

        let stats = flatten_dir(&root).unwrap();

        assert_eq!(
            stats,
            FlattenStats {
                extracted: 2,
                moved: 2,
                removed: 0,
            }
        );
        assert_eq!(
            names(&root),
            vec!["bundles_set_partitas_no1_prelude.mid", "gigue.MID", "prelude.mid"]
        );
        assert_eq!(std::fs::read(root.join("gigue.MID")).unwrap(), b"MThd");
    }

    #[test]
    fn unreadable_archive_is_left_in_place() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Bach");
        touch(&root.join("bundles/broken.zip"));

        let stats = flatten_dir(&root).unwrap();

        assert_eq!(stats, FlattenStats::default());
        assert!(root.join("bundles/broken.zip").is_file());
    }

    #[test]
    fn merge_splits_moves_files_and_skips_missing() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        touch(&config.train_test_val_dir.join("train/Bach/a.mid"));
        touch(&config.train_test_val_dir.join("train/Mozart/b.mid"));
        touch(&config.train_test_val_dir.join("val/Mozart/c.mid"));

        let moved = merge_splits(
            &config.train_test_val_dir,
            &config.chunked_output_dir,
            &config.composers,
        )
        .unwrap();

        assert_eq!(moved, 3);
        assert_eq!(names(&config.chunked_output_dir.join("train")), vec!["a.mid", "b.mid"]);
        assert_eq!(names(&config.chunked_output_dir.join("val")), vec!["c.mid"]);
        assert!(names(&config.chunked_output_dir.join("test")).is_empty());
        assert!(!config.train_test_val_dir.join("train/Bach/a.mid").exists());
    }
}
