use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Refuse an output path that resolves to the network file itself or to an existing regular file.
pub fn ensure_out_dir_safe(out_dir: &Path, input: &Path) -> Result<()> {
    let out_norm = normalize_for_compare(out_dir)
        .with_context(|| format!("failed to normalize output path {}", out_dir.display()))?;
    let in_norm = normalize_for_compare(input)
        .with_context(|| format!("failed to normalize input path {}", input.display()))?;

    if out_norm == in_norm {
        bail!(
            "refusing to overwrite network file: output {} matches input {}",
            out_dir.display(),
            input.display()
        );
    }
    if out_norm.is_file() {
        bail!("output {} exists and is not a directory", out_dir.display());
    }
    Ok(())
}

fn normalize_for_compare(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path
            .canonicalize()
            .with_context(|| format!("canonicalize {}", path.display()));
    }

    // `..` is not resolved for paths that do not exist yet.
    let base = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().context("current_dir")?
    };

    Ok(base.join(path))
}

#[cfg(test)]
mod tests {
    use super::ensure_out_dir_safe;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_input_file_as_out_dir() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("networks.toml");
        fs::write(&input, "").expect("write");
        let err = ensure_out_dir_safe(&input, &input).expect_err("same path");
        assert!(err.to_string().contains("refusing to overwrite"));
        assert!(ensure_out_dir_safe(&dir.path().join("out"), &input).is_ok());
    }

    #[test]
    fn rejects_existing_regular_file_but_allows_parent_dir() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("networks.toml");
        let other = dir.path().join("notes.txt");
        fs::write(&input, "").expect("write");
        fs::write(&other, "").expect("write");
        let err = ensure_out_dir_safe(&other, &input).expect_err("regular file");
        assert!(err.to_string().contains("is not a directory"));
        assert!(ensure_out_dir_safe(dir.path(), &input).is_ok());
    }
}
