//! CLI command implementations.

pub mod dump;
pub mod format;
pub mod gc;
pub mod inspect;
pub mod record;
pub mod verify;

use crate::error::{CliError, CliResult};
use clap::ValueEnum;
use fds_core::{Config, FlashStore, StoreEvent};
use fds_flash::{FileFlash, FlashGeometry};
use serde::Serialize;
use std::path::Path;
use std::sync::mpsc::Receiver;

/// Output format shared by reporting commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text.
    #[default]
    Text,
    /// Pretty printed JSON.
    Json,
}

/// Page layout given on the command line.
///
/// One virtual page maps to one physical page of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Virtual page size in words.
    pub page_words: u32,
    /// Number of virtual pages.
    pub pages: u32,
    /// Whether records carry CRCs.
    pub crc: bool,
}

impl Layout {
    /// Geometry of the image file.
    pub fn geometry(&self) -> FlashGeometry {
        FlashGeometry::new(0, self.page_words, self.pages)
    }

    /// Store configuration.
    pub fn config(&self) -> Config {
        Config::new()
            .virtual_pages(self.pages)
            .virtual_page_words(self.page_words)
            .crc_check(self.crc)
    }
}

/// Opens an existing image.
pub fn open_image(path: &Path, layout: Layout) -> CliResult<FileFlash> {
    if !path.exists() {
        return Err(CliError::MissingImage(path.to_path_buf()));
    }
    Ok(FileFlash::open(path, layout.geometry())?)
}

/// A store mounted on an image file, with its event stream.
pub struct Session {
    /// The mounted store.
    pub store: FlashStore<FileFlash>,
    events: Receiver<StoreEvent>,
}

impl Session {
    /// Opens an image and mounts the store, applying any recovery.
    pub fn mount(path: &Path, layout: Layout) -> CliResult<Self> {
        let flash = open_image(path, layout)?;
        Self::mount_flash(flash, layout)
    }

    /// Mounts the store on an opened image.
    pub fn mount_flash(flash: FileFlash, layout: Layout) -> CliResult<Self> {
        let store = FlashStore::new(flash, layout.config())?;
        let events = store.subscribe()?;
        store.init()?;
        let session = Self { store, events };
        session.settle()?;
        Ok(session)
    }

    /// Runs queued commands and fails on the first failed event.
    pub fn settle(&self) -> CliResult<Vec<StoreEvent>> {
        self.store.run_until_idle()?;
        let events: Vec<StoreEvent> = self.events.try_iter().collect();
        for event in &events {
            tracing::debug!(kind = ?event.kind(), ok = event.is_ok(), "store event");
            event.result().map_err(|e| CliError::Store(e.clone()))?;
        }
        Ok(events)
    }
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
