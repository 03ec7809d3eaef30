//! Per-kernel working directories.
//!
//! Each kernel owns one freshly-created directory under
//! `<working_dir>/drivers/<batch label>/` for the duration of the run;
//! nothing is ever shared between kernels, which is what makes the
//! compile/run fan-out safe.

use fpforge_core::{FPCore, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Handle to one kernel's exclusively-owned working directory.
#[derive(Debug, Clone)]
pub struct DriverDir {
    pub key: String,
    pub path: PathBuf,
}

/// Create one fresh directory per kernel, namespaced by the kernel's
/// provenance label. Fails if a directory already exists or cannot be
/// created.
pub fn make_driver_dirs(root: &Path, cores: &[FPCore]) -> Result<Vec<DriverDir>> {
    let mut dirs = Vec::with_capacity(cores.len());
    for (idx, core) in cores.iter().enumerate() {
        let dir = root
            .join(core.provenance.label())
            .join(format!("{:03}_{}", idx, core.key));
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&dir)?;
        dirs.push(DriverDir {
            key: core.key.clone(),
            path: dir,
        });
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpforge_core::Expr;

    fn core(key: &str) -> FPCore {
        FPCore::new(key, vec!["x".into()], Expr::Var("x".into()))
    }

    #[test]
    fn test_dirs_are_fresh_and_owned() {
        let tmp = tempfile::tempdir().unwrap();
        let cores = vec![core("a"), core("b")];
        let dirs = make_driver_dirs(tmp.path(), &cores).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].path.is_dir());
        assert_ne!(dirs[0].path, dirs[1].path);
    }

    #[test]
    fn test_collision_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cores = vec![core("a")];
        make_driver_dirs(tmp.path(), &cores).unwrap();
        assert!(make_driver_dirs(tmp.path(), &cores).is_err());
    }
}
