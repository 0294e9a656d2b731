//! Test fixtures and store helpers.
//!
//! Provides mounted stores over simulated or file-backed flash, with the
//! event stream captured for inspection.

use bytes::Bytes;
use fds_core::{
    Config, Descriptor, FindToken, FlashStore, MountDecision, RecordKey, StoreError, StoreEvent,
    StoreResult,
};
use fds_flash::{FileFlash, FlashGeometry, SimFlash};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use tempfile::TempDir;

/// Number of virtual pages used by the fixtures.
pub const TEST_PAGES: u32 = 3;

/// Flash geometry with one physical page per virtual page.
pub fn test_geometry(page_words: u32) -> FlashGeometry {
    FlashGeometry::new(0, page_words, TEST_PAGES)
}

/// Store configuration matching [`test_geometry`].
pub fn test_config(page_words: u32) -> Config {
    Config::new()
        .virtual_pages(TEST_PAGES)
        .virtual_page_words(page_words)
}

/// Packs words into a chunk in flash byte order.
pub fn chunk(words: &[u32]) -> Bytes {
    Bytes::from(words.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>())
}

/// A store over simulated flash with its events captured.
pub struct TestStore {
    /// The store instance.
    pub store: FlashStore<SimFlash>,
    events: Receiver<StoreEvent>,
    geometry: FlashGeometry,
    config: Config,
}

impl TestStore {
    /// Creates and mounts a store over erased flash.
    pub fn new(page_words: u32) -> Self {
        let store = Self::unmounted(
            SimFlash::new(test_geometry(page_words)),
            test_config(page_words),
        );
        store.mount().expect("Failed to mount fresh flash");
        store
    }

    /// Creates a store without mounting it.
    pub fn unmounted(flash: SimFlash, config: Config) -> Self {
        let geometry = fds_flash::FlashDriver::geometry(&flash);
        let store = FlashStore::new(flash, config.clone()).expect("Invalid test configuration");
        let events = store.subscribe().expect("Failed to subscribe");
        Self {
            store,
            events,
            geometry,
            config,
        }
    }

    /// Creates an unmounted store over a copy of a flash image.
    pub fn from_image(geometry: FlashGeometry, config: Config, image: Vec<u32>) -> Self {
        Self::unmounted(SimFlash::from_image(geometry, image), config)
    }

    /// Initializes the store and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the synchronous error of `init` or the error reported by the
    /// init event.
    pub fn mount(&self) -> StoreResult<MountDecision> {
        self.store.init()?;
        self.store.run_until_idle()?;
        self.drain()
            .into_iter()
            .find_map(|event| match event {
                StoreEvent::Init { result } => Some(result),
                _ => None,
            })
            .unwrap_or(Err(StoreError::NotInitialized))
    }

    /// Takes the flash image and mounts a new store on it.
    ///
    /// The old store is dropped as if power had been lost.
    pub fn remount(self) -> (Self, StoreResult<MountDecision>) {
        let (geometry, config) = (self.geometry, self.config.clone());
        let image = self.into_flash().image();
        let store = Self::from_image(geometry, config, image);
        let decision = store.mount();
        (store, decision)
    }

    /// Returns every event received since the last call.
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.events.try_iter().collect()
    }

    /// Runs queued commands and returns the events they produced.
    pub fn settle(&self) -> Vec<StoreEvent> {
        self.store
            .run_until_idle()
            .expect("Flash stopped completing operations");
        self.drain()
    }

    /// Writes a record, waits for it and returns its descriptor.
    ///
    /// # Errors
    ///
    /// Returns the synchronous error of `write` or the error reported by
    /// the write event.
    pub fn write_words(&self, key: RecordKey, words: &[u32]) -> StoreResult<Descriptor> {
        let desc = self.store.write(key, &[chunk(words)])?;
        for event in self.settle() {
            if event.record_id() == Some(desc.record_id()) {
                event.result().map_err(Clone::clone)?;
            }
        }
        Ok(desc)
    }

    /// Opens, reads and closes a record.
    ///
    /// # Errors
    ///
    /// Returns the error of `open`.
    pub fn read(&self, desc: &Descriptor) -> StoreResult<Vec<u8>> {
        let mut desc = *desc;
        let view = self.store.open(&mut desc)?;
        self.store.close(&desc)?;
        Ok(view.data)
    }

    /// Reads the first record with the given key.
    pub fn read_key(&self, key: RecordKey) -> Option<Vec<u8>> {
        let desc = self
            .store
            .find(key.record_type, key.instance, &mut FindToken::default())
            .ok()?;
        self.read(&desc).ok()
    }

    /// Returns a copy of the flash content.
    pub fn image(&self) -> Vec<u32> {
        self.store.with_flash(SimFlash::image)
    }

    /// Returns the flash geometry.
    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consumes the fixture and returns the flash.
    pub fn into_flash(self) -> SimFlash {
        self.store.into_flash()
    }
}

impl std::ops::Deref for TestStore {
    type Target = FlashStore<SimFlash>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A flash image file in a temporary directory.
pub struct TestImage {
    path: PathBuf,
    geometry: FlashGeometry,
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestImage {
    /// Creates an erased image file.
    pub fn new(page_words: u32) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("flash.img");
        let geometry = test_geometry(page_words);
        FileFlash::create(&path, geometry).expect("Failed to create flash image");
        Self {
            path,
            geometry,
            config: test_config(page_words),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the image path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the image and mounts a store on it.
    pub fn open(&self) -> FlashStore<FileFlash> {
        let flash = FileFlash::open(&self.path, self.geometry).expect("Failed to open flash image");
        let store = FlashStore::new(flash, self.config.clone()).expect("Invalid test configuration");
        store.init().expect("Failed to mount flash image");
        store
            .run_until_idle()
            .expect("Flash stopped completing operations");
        store
    }
}

/// Runs a test with a freshly mounted store.
///
/// # Example
///
/// ```rust,ignore
/// use fds_testkit::with_store;
///
/// #[test]
/// fn my_test() {
///     with_store(64, |store| {
///         store.write_words(RecordKey::new(1, 1), &[42]).unwrap();
///     });
/// }
/// ```
pub fn with_store<F, R>(page_words: u32, f: F) -> R
where
    F: FnOnce(&TestStore) -> R,
{
    let store = TestStore::new(page_words);
    f(&store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_mounts() {
        with_store(64, |store| {
            assert!(store.is_ready());
            let desc = store.write_words(RecordKey::new(1, 1), &[1, 2]).unwrap();
            assert_eq!(store.read(&desc).unwrap(), chunk(&[1, 2]).to_vec());
        });
    }

    #[test]
    fn remount_sees_records() {
        let store = TestStore::new(64);
        store.write_words(RecordKey::new(2, 2), &[7]).unwrap();
        let (store, decision) = store.remount();
        assert_eq!(decision, Ok(MountDecision::AlreadyInstalled));
        assert_eq!(store.read_key(RecordKey::new(2, 2)), Some(chunk(&[7]).to_vec()));
    }

    #[test]
    fn image_file_round_trip() {
        let image = TestImage::new(64);
        {
            let store = image.open();
            store.write(RecordKey::new(3, 3), &[chunk(&[3])]).unwrap();
            store.run_until_idle().unwrap();
        }
        let store = image.open();
        assert!(store.find(3, 3, &mut FindToken::default()).is_ok());
        assert!(image.path().exists());
    }
}
