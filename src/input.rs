//! Catalogue document sources - files on disk or stdin

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{RegulatorError, Result};

/// Where one catalogue document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    File(PathBuf),
    Stdin,
}

impl fmt::Display for SpecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// Validate the requested sources.
///
/// Stdin and files are mutually exclusive, at least one source is required,
/// and every file must exist.
pub fn choose_sources(files: &[PathBuf], use_stdin: bool) -> Result<Vec<SpecSource>> {
    if use_stdin {
        if !files.is_empty() {
            return Err(RegulatorError::InvalidInput(
                "Cannot specify both a file and to use stdin".to_string(),
            ));
        }
        return Ok(vec![SpecSource::Stdin]);
    }

    if files.is_empty() {
        return Err(RegulatorError::InvalidInput(
            "--file must be given at least once (or use --stdin)".to_string(),
        ));
    }

    files
        .iter()
        .map(|path| {
            if path.as_os_str().is_empty() {
                Err(RegulatorError::InvalidInput("--file cannot be empty".to_string()))
            } else if !path.is_file() {
                Err(RegulatorError::InvalidInput(format!(
                    "--file '{}' is not a file",
                    path.display()
                )))
            } else {
                Ok(SpecSource::File(path.clone()))
            }
        })
        .collect()
}

/// Raw bytes of a source
pub fn read_source(source: &SpecSource) -> Result<Vec<u8>> {
    match source {
        SpecSource::File(path) => read_file(path),
        SpecSource::Stdin => {
            let mut raw = Vec::new();
            std::io::stdin()
                .read_to_end(&mut raw)
                .map_err(|e| RegulatorError::Io(format!("Failed to read stdin:\n{}", e)))?;
            Ok(raw)
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| RegulatorError::Io(format!("Failed to read file '{}':\n{}", path.display(), e)))
}
