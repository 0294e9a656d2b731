//! Benchmark utilities.

use fds_core::{Bytes, Config, FlashStore, RecordKey};
use fds_flash::{FlashGeometry, SimFlash};

/// Virtual page size used by the store benchmarks, in words.
pub const PAGE_WORDS: u32 = 1024;

/// Number of virtual pages, swap included.
pub const PAGES: u32 = 4;

/// Deterministic payload of `words` words.
///
/// Uses a xorshift sequence so runs are comparable.
pub fn payload(words: usize, seed: u32) -> Bytes {
    let mut state = seed | 1;
    let mut data = Vec::with_capacity(words * 4);
    for _ in 0..words {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        data.extend_from_slice(&state.to_le_bytes());
    }
    Bytes::from(data)
}

/// Keys spread over a few types and instances.
pub fn keys(count: usize) -> Vec<RecordKey> {
    (0..count)
        .map(|i| RecordKey::new(1 + (i % 4) as u16, (i % 16) as u16))
        .collect()
}

/// A mounted store on simulated flash.
pub fn mounted_store(crc_check: bool) -> FlashStore<SimFlash> {
    let flash = SimFlash::new(FlashGeometry::new(0, PAGE_WORDS, PAGES));
    let config = Config::new()
        .virtual_pages(PAGES)
        .virtual_page_words(PAGE_WORDS)
        .crc_check(crc_check);
    let store = FlashStore::new(flash, config).expect("valid config");
    store.init().expect("init");
    store.run_until_idle().expect("mount");
    store
}

/// A store holding `count` records of `words` words each.
pub fn populated_store(count: usize, words: usize) -> FlashStore<SimFlash> {
    let store = mounted_store(false);
    for (i, key) in keys(count).into_iter().enumerate() {
        store.write(key, &[payload(words, i as u32)]).expect("write");
        store.run_until_idle().expect("flush");
    }
    store
}
