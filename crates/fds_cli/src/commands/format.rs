//! Format command implementation.

use super::{Layout, Session};
use crate::error::{CliError, CliResult};
use fds_core::StoreEvent;
use fds_flash::FileFlash;
use std::path::Path;

/// Creates an erased image and installs the store on it.
pub fn run(path: &Path, layout: Layout, force: bool) -> CliResult<()> {
    if path.exists() && !force {
        return Err(CliError::ImageExists(path.to_path_buf()));
    }
    layout.config().validate(&layout.geometry())?;

    let flash = FileFlash::create(path, layout.geometry())?;
    let store = fds_core::FlashStore::new(flash, layout.config())?;
    let events = store.subscribe()?;
    store.init()?;
    store.run_until_idle()?;

    for event in events.try_iter() {
        if let StoreEvent::Init { result } = event {
            let decision = result?;
            println!(
                "Formatted {} ({} pages of {} words): {:?}",
                path.display(),
                layout.pages,
                layout.page_words,
                decision
            );
        }
    }
    // Mount again to make sure the image reads back.
    Session::mount(path, layout)?;
    Ok(())
}
