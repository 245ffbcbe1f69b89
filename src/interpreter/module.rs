//! Module resolution and the per-[`Interpreter`] import cache (spec §4.4).
//!
//! The cache and the in-progress set live on the `Thorn` instance, not behind
//! a process-global, so two independent `Thorn`s (as in the test suite) never
//! see each other's imports and a circular-import error in one doesn't leak
//! state into the next test.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{ThornError, ThornResult};
use crate::interpreter::value::Value;

#[derive(Default)]
pub struct ModuleLoader {
    in_progress: HashSet<PathBuf>,
    executed: HashMap<PathBuf, HashMap<String, Value>>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search order: alongside the importing file, then `./stdlib`, then each
    /// directory in `THORN_PATH` (`:`-separated), then as an absolute path.
    pub fn resolve(&self, from_dir: &Path, module: &str, keyword_line: usize) -> ThornResult<PathBuf> {
        let file_name = if module.ends_with(".thorn") {
            module.to_string()
        } else {
            format!("{module}.thorn")
        };

        if Path::new(&file_name).is_absolute() {
            let candidate = PathBuf::from(&file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        let mut candidates = vec![from_dir.join(&file_name), from_dir.join("stdlib").join(&file_name)];

        if let Ok(thorn_path) = std::env::var("THORN_PATH") {
            for dir in thorn_path.split(':').filter(|s| !s.is_empty()) {
                candidates.push(Path::new(dir).join(&file_name));
            }
        }

        candidates
            .into_iter()
            .find(|c| c.is_file())
            .ok_or_else(|| ThornError::Import {
                path: module.to_string(),
                reason: format!("Cannot find module '{module}' (import at line {keyword_line})"),
            })
    }

    pub fn begin(&mut self, path: &Path, module: &str) -> ThornResult<()> {
        if self.in_progress.contains(path) {
            return Err(ThornError::Import {
                path: path.display().to_string(),
                reason: format!("Circular dependency detected for module '{module}'"),
            });
        }
        self.in_progress.insert(path.to_path_buf());
        Ok(())
    }

    pub fn finish(&mut self, path: &Path, exports: HashMap<String, Value>) {
        self.in_progress.remove(path);
        self.executed.insert(path.to_path_buf(), exports);
    }

    pub fn cached(&self, path: &Path) -> Option<HashMap<String, Value>> {
        self.executed.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reentrant_load_of_same_path() {
        let mut loader = ModuleLoader::new();
        let path = PathBuf::from("/tmp/does-not-matter.thorn");
        loader.begin(&path, "does-not-matter").unwrap();
        assert!(loader.begin(&path, "does-not-matter").is_err());
    }

    #[test]
    fn caches_exports_after_finish() {
        let mut loader = ModuleLoader::new();
        let path = PathBuf::from("/tmp/does-not-matter-2.thorn");
        loader.begin(&path, "does-not-matter-2").unwrap();
        let mut exports = HashMap::new();
        exports.insert("pi".to_string(), Value::Number(3.14));
        loader.finish(&path, exports);
        assert!(loader.cached(&path).is_some());
    }
}
