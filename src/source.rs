//! Where raw tool output comes from.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Supplies the complete text captured from a tool.
pub trait TextSource {
    fn read_text(&self) -> io::Result<String>;
}

/// A captured output file.
#[derive(Clone, Debug)]
pub struct FileSource(PathBuf);

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl TextSource for FileSource {
    fn read_text(&self) -> io::Result<String> {
        fs::read_to_string(&self.0)
    }
}

/// Output piped into the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinSource;

impl TextSource for StdinSource {
    fn read_text(&self) -> io::Result<String> {
        let mut text = String::new();
        io::stdin().lock().read_to_string(&mut text)?;
        Ok(text)
    }
}

/// A file source for `path`, or standard input when there is none.
pub fn open(path: Option<&Path>) -> Box<dyn TextSource> {
    match path {
        Some(path) => Box::new(FileSource::new(path)),
        None => Box::new(StdinSource),
    }
}
