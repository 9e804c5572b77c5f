//! Line input from files and standard input.
//!
//! Files ending in `.gz` are decompressed on the fly. Bytes that are not
//! valid UTF-8 are replaced with U+FFFD rather than failing the read, so
//! logs with stray latin-1 text still plot. Trailing `\n` / `\r\n` is
//! stripped from every line.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::InputError;

/// Name used for standard input in diagnostics and on the command line.
pub const STDIN_NAME: &str = "-";

/// One place to read lines from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Standard input.
    Stdin,
    /// A file on disk, gzip-compressed if its name ends in `.gz`.
    File(PathBuf),
}

impl Source {
    /// Maps `-` to stdin and anything else to a file.
    pub fn from_arg(path: &Path) -> Self {
        if path.as_os_str() == STDIN_NAME {
            Self::Stdin
        } else {
            Self::File(path.to_path_buf())
        }
    }

    /// Name for diagnostics.
    pub fn name(&self) -> String {
        match self {
            Self::Stdin => STDIN_NAME.to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Opens the source for buffered reading.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Open`] if the file cannot be opened.
    pub fn open(&self) -> Result<Box<dyn BufRead>, InputError> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            Self::File(path) => {
                let file = File::open(path).map_err(|source| InputError::Open {
                    path: path.clone(),
                    source,
                })?;
                if is_gzip(path) {
                    Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
                } else {
                    Ok(Box::new(BufReader::new(file)))
                }
            }
        }
    }
}

/// Returns true if `path` names a gzip file.
pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Lines from a sequence of sources, read one after another.
///
/// With no sources given, reads standard input.
pub struct InputLines {
    pending: VecDeque<Source>,
    current: Option<(String, Box<dyn BufRead>)>,
    buf: Vec<u8>,
}

impl InputLines {
    /// Reads `sources` in order.
    pub fn new(sources: Vec<Source>) -> Self {
        let pending = if sources.is_empty() {
            VecDeque::from([Source::Stdin])
        } else {
            sources.into()
        };
        Self {
            pending,
            current: None,
            buf: Vec::new(),
        }
    }

    /// Reads the given paths in order (`-` is stdin; none means stdin).
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self::new(paths.iter().map(|p| Source::from_arg(p.as_ref())).collect())
    }

    /// Reads any [`BufRead`], e.g. an in-memory buffer.
    pub fn from_reader(name: &str, reader: Box<dyn BufRead>) -> Self {
        Self {
            pending: VecDeque::new(),
            current: Some((name.to_string(), reader)),
            buf: Vec::new(),
        }
    }
}

impl Iterator for InputLines {
    type Item = Result<String, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let source = self.pending.pop_front()?;
                tracing::info!(input = %source.name(), "reading");
                match source.open() {
                    Ok(reader) => self.current = Some((source.name(), reader)),
                    Err(e) => return Some(Err(e)),
                }
            }
            let (name, reader) = self.current.as_mut()?;

            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.current = None,
                Ok(_) => return Some(Ok(decode_line(&self.buf))),
                Err(source) => {
                    let name = name.clone();
                    self.current = None;
                    return Some(Err(InputError::Read { name, source }));
                }
            }
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Recursively finds files under `dir` whose name starts with `prefix`.
///
/// Rendered `.html` outputs are skipped. Results are sorted by path.
///
/// # Errors
///
/// Returns [`InputError::Read`] if a directory cannot be listed.
pub fn find_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, InputError> {
    let mut found = Vec::new();
    walk(dir, prefix, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, prefix: &str, found: &mut Vec<PathBuf>) -> Result<(), InputError> {
    let read_err = |source| InputError::Read {
        name: dir.display().to_string(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            walk(&path, prefix, found)?;
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && !name.contains("html") {
            found.push(path);
        }
    }
    Ok(())
}
