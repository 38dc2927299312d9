//! A rewinding reader for statistics pseudo-files
//!
//! Files such as /proc/stat are tiny, generated on the fly by the kernel, and
//! regenerated whenever one seeks back to their beginning. So the cheapest way
//! to sample them repeatedly is to keep one handle open, read the whole text in
//! one go, hand it to a parser, then rewind for the next sample.
//!
//! Since tests need to feed synthetic statistics, the reader works on any path
//! and not just on the real procfs files. A regular file behaves the same way.

use crate::error::SampleError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};


/// Sampling-oriented reader for a statistics pseudo-file
pub(crate) struct PseudoFileReader {
    /// Where the statistics come from, kept around for error reporting
    path: PathBuf,

    /// Persistent handle to the file being sampled
    file_handle: File,

    /// Buffer in which the text of the file is read out, reused across samples
    readout_buffer: String,
}
//
impl PseudoFileReader {
    /// Attempt to open a statistics pseudo-file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SampleError> {
        let path = path.as_ref().to_owned();
        let file_handle = File::open(&path).map_err(|source| {
            SampleError::SourceUnavailable { path: path.clone(), source }
        })?;
        Ok(
            Self {
                path,
                file_handle,
                readout_buffer: String::new(),
            }
        )
    }

    /// Path of the file being sampled
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents of the file and hand them to a parser
    ///
    /// The file is rewound afterwards, whether or not parsing succeeded, so
    /// that the next call observes a fresh snapshot.
    ///
    pub fn sample<F, R>(&mut self, parser: F) -> Result<R, SampleError>
        where F: FnOnce(&Path, &str) -> Result<R, SampleError>
    {
        self.readout_buffer.clear();
        self.file_handle.read_to_string(&mut self.readout_buffer)
                        .map_err(|source| self.unavailable(source))?;

        let result = parser(&self.path, &self.readout_buffer);

        self.file_handle.seek(SeekFrom::Start(0u64))
                        .map_err(|source| self.unavailable(source))?;
        result
    }

    // INTERNAL: Wrap an I/O failure on the underlying file
    fn unavailable(&self, source: std::io::Error) -> SampleError {
        SampleError::SourceUnavailable { path: self.path.clone(), source }
    }
}
