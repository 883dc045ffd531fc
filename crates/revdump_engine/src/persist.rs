use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub const DUMP_HEADER: &str = concat!(
    r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xsi:schemaLocation="http://www.mediawiki.org/xml/export-0.11/ "#,
    r#"http://www.mediawiki.org/xml/export-0.11.xsd" version="0.11" xml:lang="en">"#,
    "\n"
);
pub const DUMP_FOOTER: &str = "</mediawiki>\n";

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Streams an XML dump into a temp file next to its target.
///
/// The target only appears once [`finish`](Self::finish) succeeds, so a dump
/// file with the final name is always complete.
pub struct DumpWriter {
    target: PathBuf,
    out: BufWriter<NamedTempFile>,
    fragments: u64,
}

impl DumpWriter {
    pub fn create(dir: &Path, filename: &str) -> Result<Self, PersistError> {
        ensure_output_dir(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        let mut out = BufWriter::new(tmp);
        out.write_all(DUMP_HEADER.as_bytes())?;
        Ok(Self {
            target: dir.join(filename),
            out,
            fragments: 0,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    pub fn write_fragment(&mut self, fragment: &str) -> Result<(), PersistError> {
        self.out.write_all(fragment.as_bytes())?;
        if !fragment.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        self.fragments += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<PathBuf, PersistError> {
        let target = self.target.clone();
        self.persist_to(target)
    }

    /// Keeps what was written under `<target>.incomplete`.
    pub fn finish_incomplete(self) -> Result<PathBuf, PersistError> {
        let mut name = self.target.clone().into_os_string();
        name.push(".incomplete");
        self.persist_to(PathBuf::from(name))
    }

    fn persist_to(mut self, target: PathBuf) -> Result<PathBuf, PersistError> {
        self.out.write_all(DUMP_FOOTER.as_bytes())?;
        let mut tmp = self.out.into_inner().map_err(|e| e.into_error())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // Replace existing file if present to keep determinism.
        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
