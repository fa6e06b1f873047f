use crate::core::models::RunDirs;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Creates `<output_root>/<run_id>/{scans,report,wordlists}`.
pub fn prepare_run_dirs(output_root: &Path, run_id: &str) -> Result<RunDirs> {
    let root = output_root.join(run_id);

    let dirs = RunDirs {
        root: root.clone(),
        scans: root.join("scans"),
        report: root.join("report"),
        wordlists: root.join("wordlists"),
    };

    for dir in [&dirs.root, &dirs.scans, &dirs.report, &dirs.wordlists] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }

    verify_writable(&dirs.scans)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        for dir in [&dirs.root, &dirs.scans, &dirs.report, &dirs.wordlists] {
            let _ = fs::OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_DIRECTORY)
                .open(dir)?
                .sync_all();
        }
    }

    Ok(dirs)
}

fn verify_writable(path: &Path) -> Result<()> {
    let probe = path.join(".write_test");
    fs::write(&probe, b"test").with_context(|| format!("Directory not writable: {:?}", path))?;
    fs::remove_file(&probe)
        .with_context(|| format!("Failed to remove test file: {:?}", probe))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_run_dirs_creates_tree() {
        let tmp = TempDir::new().unwrap();
        let dirs = prepare_run_dirs(tmp.path(), "10.0.0.1_20260101_000000").unwrap();
        assert_eq!(dirs.root, tmp.path().join("10.0.0.1_20260101_000000"));
        for dir in [&dirs.scans, &dirs.report, &dirs.wordlists] {
            assert!(dir.is_dir());
            assert!(dir.starts_with(&dirs.root));
        }
        assert!(!dirs.scans.join(".write_test").exists());
    }

    #[test]
    fn test_prepare_run_dirs_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        prepare_run_dirs(tmp.path(), "run").unwrap();
        assert!(prepare_run_dirs(tmp.path(), "run").is_ok());
    }
}
