//! Extraction of bundled helper scripts to stable filesystem paths.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Always-writable path which discards everything. Invoking the engine
/// against it is a no-op, which is exactly the degraded behavior we want
/// when a bundled script can't be extracted.
pub const DISCARD_PATH: &str = "/dev/null";

/// Engine entry wrapper, compiled into the binary and written out on
/// startup. The engine's own module is deployment configuration, not a
/// bundled resource.
const ENTRY_NAME: &str = "send_emails";
const ENTRY_CONTENTS: &str = include_str!("../assets/send_emails.py");

/// Materialized script paths. Built once at startup, immutable afterwards,
/// and shared read-only across concurrent pushes.
#[derive(Debug, Clone)]
pub struct Scripts {
    /// Path of the extracted engine entry wrapper.
    pub entry: PathBuf,
}

impl Scripts {
    pub fn materialize() -> Self {
        Self::materialize_in(std::env::temp_dir())
    }

    pub fn materialize_in(dir: impl AsRef<Path>) -> Self {
        Scripts {
            entry: materialize_resource(dir.as_ref(), ENTRY_NAME, ENTRY_CONTENTS),
        }
    }
}

/// Write a bundled resource to a uniquely-named file and return its path.
///
/// Failure degrades to the discard path: notification is silently disabled,
/// but the push pipeline hosting us keeps running.
fn materialize_resource(dir: &Path, name: &str, contents: &str) -> PathBuf {
    match write_resource(dir, name, contents) {
        Ok(path) => path,
        Err(error) => {
            tracing::error!(
                %name,
                %error,
                "failed to materialize bundled script; notifications are disabled"
            );
            PathBuf::from(DISCARD_PATH)
        }
    }
}

fn write_resource(dir: &Path, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(name)
        .suffix(".py")
        .tempfile_in(dir)?;
    file.write_all(contents.as_bytes())?;

    let (_file, path) = file.keep().map_err(|err| err.error)?;
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::{Scripts, DISCARD_PATH, ENTRY_CONTENTS};

    #[test]
    fn test_materialize_writes_the_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = Scripts::materialize_in(dir.path());

        assert!(scripts.entry.starts_with(dir.path()));
        assert_eq!(std::fs::read_to_string(&scripts.entry).unwrap(), ENTRY_CONTENTS);
    }

    #[test]
    fn test_materialize_failure_degrades_to_discard_path() {
        let scripts = Scripts::materialize_in("/this/dir/does/not/exist");
        assert_eq!(scripts.entry.to_str(), Some(DISCARD_PATH));
    }
}
