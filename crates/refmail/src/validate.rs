//! Server-side validation of the user-supplied ref-filter pattern.
//!
//! The pattern is ultimately evaluated by the external runtime, not by us,
//! so compilation is delegated to that same runtime. Validation errors are
//! form feedback for the person editing settings; they are never system-log
//! errors.

use crate::config::FieldErrors;
use std::path::Path;
use subprocess::{Invocation, RunError};

/// Settings field the filter pattern is attributed to.
pub const FILTER_FIELD: &str = "ref_filter_regex";

/// Program handed to the runtime: compile the pattern given as the sole
/// argument and report any failure on stderr.
const COMPILE_SNIPPET: &str = "\
import re, sys
try:
    re.compile(sys.argv[1])
except re.error as error:
    sys.stderr.write(str(error))
    sys.exit(1)
";

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The runtime compiled the pattern and rejected it.
    #[error("invalid filter pattern: {detail}")]
    BadPattern { detail: String },

    /// The runtime itself couldn't be started. Distinct from a bad pattern:
    /// the pattern may well be fine, we just can't tell.
    #[error("could not check the filter pattern: the validation runtime is unavailable ({source})")]
    Unavailable {
        #[source]
        source: RunError,
    },
}

/// Check a filter pattern by compiling it in the external runtime.
/// An empty pattern disables filtering and is always valid.
pub async fn validate_filter(runtime: &Path, pattern: &str) -> Result<(), ValidationError> {
    if pattern.is_empty() {
        return Ok(());
    }

    let invocation = Invocation {
        program: runtime.to_path_buf(),
        args: vec![
            "-c".to_string(),
            COMPILE_SNIPPET.to_string(),
            pattern.to_string(),
        ],
        ..Default::default()
    };

    match subprocess::run(invocation).await {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => {
            let detail = match output.stderr.trim() {
                "" => output.stdout.trim(),
                stderr => stderr,
            };
            Err(ValidationError::BadPattern {
                detail: detail.to_string(),
            })
        }
        Err(source) => Err(ValidationError::Unavailable { source }),
    }
}

/// Validate and record the result as a field error for the settings form.
pub async fn validate_into(runtime: &Path, pattern: &str, errors: &mut FieldErrors) {
    if let Err(error) = validate_filter(runtime, pattern).await {
        errors.add(FILTER_FIELD, error.to_string());
    }
}
