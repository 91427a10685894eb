//! Input conversion
//!
//! Turns one discovered input into the text logs the parser reads:
//! - text logs are used as-is
//! - `.edf` recordings are converted with `edf2asc -y <in> <out>`
//! - `.tar.gz`/`.tgz`/`.tar.xz` archives are extracted and every member is
//!   expanded again
//!
//! Everything produced here lives in a caller-provided scratch directory.

use crate::config::ConverterConfig;
use crate::discover::has_extension;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use xz2::read::XzDecoder;

/// Conversion failures; each one excludes a single input
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to start converter {binary:?}: {source}")]
    ConverterMissing {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Converter failed: `{command}` (status: {status}){stderr_suffix}")]
    ConverterFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("Converter produced no output at {0:?}")]
    MissingOutput(PathBuf),

    #[error("Failed to extract archive {archive:?}: {source}")]
    Archive {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A text log ready for parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedInput {
    /// File to read
    pub path: PathBuf,
    /// Name recorded in the `path` column
    pub source: String,
}

const GZIP_EXTENSIONS: [&str; 2] = ["tar.gz", "tgz"];
const XZ_EXTENSIONS: [&str; 2] = ["tar.xz", "txz"];

/// Converts and unpacks inputs
#[derive(Debug, Clone)]
pub struct Converter {
    edf2asc_binary: PathBuf,
    extensions: Vec<String>,
}

impl Converter {
    /// `extensions` decides which archive members are kept
    pub fn new(config: &ConverterConfig, extensions: &[String]) -> Self {
        Self {
            edf2asc_binary: config.edf2asc_binary.clone(),
            extensions: extensions.to_vec(),
        }
    }

    /// Expand one input into zero or more text logs inside `workdir`
    pub fn expand_input(&self, path: &Path, workdir: &Path) -> Result<Vec<ExpandedInput>, ConvertError> {
        self.expand(path, &path.display().to_string(), workdir)
    }

    /// `workdir` receives whatever this input produces; archive members use
    /// their own directory so equal file names never share an output path.
    fn expand(&self, path: &Path, label: &str, workdir: &Path) -> Result<Vec<ExpandedInput>, ConvertError> {
        if GZIP_EXTENSIONS.iter().any(|ext| has_extension(path, ext)) {
            return self.expand_archive(path, label, workdir, |file| Box::new(GzDecoder::new(file)));
        }
        if XZ_EXTENSIONS.iter().any(|ext| has_extension(path, ext)) {
            return self.expand_archive(path, label, workdir, |file| Box::new(XzDecoder::new(file)));
        }
        if has_extension(path, "edf") {
            let converted = self.edf2asc(path, workdir)?;
            return Ok(vec![ExpandedInput {
                path: converted,
                source: label.to_string(),
            }]);
        }
        Ok(vec![ExpandedInput {
            path: path.to_path_buf(),
            source: label.to_string(),
        }])
    }

    /// Run the converter into `<workdir>/<file name>.asc`.
    ///
    /// The full file name is kept so `s01.edf` never lands on an extracted
    /// `s01.asc`. A stale output is removed first.
    fn edf2asc(&self, path: &Path, workdir: &Path) -> Result<PathBuf, ConvertError> {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());
        let target = workdir.join(format!("{}.asc", name));
        if target.exists() {
            fs::remove_file(&target)?;
        }

        log::info!("Converting {:?} with {:?}", path, self.edf2asc_binary);
        let output = Command::new(&self.edf2asc_binary)
            .arg("-y")
            .arg(path)
            .arg(&target)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ConvertError::ConverterMissing {
                binary: self.edf2asc_binary.clone(),
                source,
            })?;

        let command = format!(
            "{} -y {} {}",
            self.edf2asc_binary.display(),
            path.display(),
            target.display()
        );
        check_converter_output(&command, &output, &target)?;
        Ok(target)
    }

    fn expand_archive<F>(
        &self,
        path: &Path,
        label: &str,
        workdir: &Path,
        decoder: F,
    ) -> Result<Vec<ExpandedInput>, ConvertError>
    where
        F: FnOnce(BufReader<File>) -> Box<dyn Read>,
    {
        let archive_error = |source: io::Error| ConvertError::Archive {
            archive: path.to_path_buf(),
            source,
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let target = workdir.join(format!("{}.d", name));
        fs::create_dir_all(&target)?;

        log::info!("Extracting {:?}", path);
        let file = File::open(path).map_err(archive_error)?;
        let mut archive = tar::Archive::new(decoder(BufReader::new(file)));

        let mut members = Vec::new();
        for entry in archive.entries().map_err(archive_error)? {
            let mut entry = entry.map_err(archive_error)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let member = entry.path().map_err(archive_error)?.into_owned();
            if !entry.unpack_in(&target).map_err(archive_error)? {
                log::warn!("Skipping archive member outside the archive root: {:?}", member);
                continue;
            }
            members.push(member);
        }
        members.sort();

        let mut expanded = Vec::new();
        for member in members {
            let extracted = target.join(&member);
            if !self.extensions.iter().any(|ext| has_extension(&extracted, ext)) {
                log::debug!("Ignoring archive member {:?}", member);
                continue;
            }
            let member_label = format!("{}/{}", label, member.display());
            let member_dir = extracted.parent().unwrap_or(target.as_path()).to_path_buf();
            expanded.extend(self.expand(&extracted, &member_label, &member_dir)?);
        }
        log::debug!("{:?}: {} logs extracted", path, expanded.len());
        Ok(expanded)
    }
}

/// A non-zero exit is tolerated when the output file was still written
fn check_converter_output(command: &str, output: &Output, target: &Path) -> Result<(), ConvertError> {
    if target.is_file() {
        if !output.status.success() {
            log::debug!("`{}` exited with {} but wrote {:?}", command, output.status, target);
        }
        return Ok(());
    }
    if output.status.success() {
        return Err(ConvertError::MissingOutput(target.to_path_buf()));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    Err(ConvertError::ConverterFailed {
        command: command.to_string(),
        status: output.status.code().unwrap_or(-1),
        stderr_suffix: if stderr.is_empty() {
            String::new()
        } else {
            format!(": {}", stderr)
        },
    })
}
