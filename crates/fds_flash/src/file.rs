//! File-backed flash image.

use crate::driver::{first_conflict, FlashDriver, FlashGeometry, FlashOp, ERASED_WORD, WORD_SIZE};
use crate::error::{FlashError, FlashResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A flash driver persisted in a file.
///
/// The file holds the raw little-endian words of the whole region, exactly
/// as they would appear on the device. Data survives process restarts, which
/// makes this driver suitable for host tooling that inspects or prepares
/// flash images.
///
/// # Durability
///
/// Completed operations are written through to the file and flushed before
/// `poll` reports them.
///
/// # Example
///
/// ```no_run
/// use fds_flash::{FileFlash, FlashDriver, FlashGeometry};
/// use std::path::Path;
///
/// let geometry = FlashGeometry::new(0, 1024, 4);
/// let mut flash = FileFlash::create(Path::new("flash.img"), geometry).unwrap();
/// flash.start_write(0, &[0xDEAD_C0DE]).unwrap();
/// flash.poll().unwrap().unwrap();
/// ```
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    geometry: FlashGeometry,
    file: RwLock<File>,
    pending: Option<FlashOp>,
}

impl FileFlash {
    /// Creates a new, fully erased image, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn create(path: &Path, geometry: FlashGeometry) -> FlashResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let page = vec![0xFFu8; geometry.page_bytes() as usize];
        for _ in 0..geometry.page_count {
            file.write_all(&page)?;
        }
        file.flush()?;
        debug!(path = %path.display(), bytes = geometry.total_bytes(), "created flash image");

        Ok(Self {
            path: path.to_path_buf(),
            geometry,
            file: RwLock::new(file),
            pending: None,
        })
    }

    /// Opens an existing image.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its size does not
    /// match the geometry.
    pub fn open(path: &Path, geometry: FlashGeometry) -> FlashResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual = file.metadata()?.len();
        let expected = geometry.total_bytes();
        if actual != expected {
            return Err(FlashError::ImageSize { expected, actual });
        }

        Ok(Self {
            path: path.to_path_buf(),
            geometry,
            file: RwLock::new(file),
            pending: None,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_words(&self, index: usize, out: &mut [u32]) -> FlashResult<()> {
        let mut bytes = vec![0u8; out.len() * WORD_SIZE as usize];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(index as u64 * u64::from(WORD_SIZE)))?;
            file.read_exact(&mut bytes)?;
        }
        for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(WORD_SIZE as usize)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    fn write_words(&self, index: usize, words: &[u32]) -> FlashResult<()> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(index as u64 * u64::from(WORD_SIZE)))?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }

    fn apply(&self, op: &FlashOp) -> FlashResult<()> {
        match op {
            FlashOp::Write { address, words } => {
                let index = self.geometry.word_index(*address, words.len())?;
                let mut current = vec![0u32; words.len()];
                self.read_words(index, &mut current)?;
                for (slot, word) in current.iter_mut().zip(words) {
                    *slot &= *word;
                }
                self.write_words(index, &current)
            }
            FlashOp::Erase { address, pages } => {
                let range = self.geometry.erase_range(*address, *pages)?;
                self.write_words(range.start, &vec![ERASED_WORD; range.len()])
            }
        }
    }
}

impl FlashDriver for FileFlash {
    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn read(&self, address: u32, out: &mut [u32]) -> FlashResult<()> {
        let index = self.geometry.word_index(address, out.len())?;
        if out.is_empty() {
            return Ok(());
        }
        self.read_words(index, out)
    }

    fn start_write(&mut self, address: u32, words: &[u32]) -> FlashResult<()> {
        if self.pending.is_some() {
            return Err(FlashError::Busy);
        }
        let index = self.geometry.word_index(address, words.len())?;
        let mut current = vec![0u32; words.len()];
        self.read_words(index, &mut current)?;
        if let Some(pos) = first_conflict(&current, words) {
            return Err(FlashError::NotErased {
                address: address + pos as u32 * WORD_SIZE,
            });
        }
        self.pending = Some(FlashOp::Write {
            address,
            words: words.to_vec(),
        });
        Ok(())
    }

    fn start_erase(&mut self, address: u32, pages: u32) -> FlashResult<()> {
        if self.pending.is_some() {
            return Err(FlashError::Busy);
        }
        self.geometry.erase_range(address, pages)?;
        self.pending = Some(FlashOp::Erase { address, pages });
        Ok(())
    }

    fn poll(&mut self) -> Option<FlashResult<()>> {
        let op = self.pending.take()?;
        Some(self.apply(&op))
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}
