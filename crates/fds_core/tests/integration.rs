//! Integration tests for the record store.

use bytes::Bytes;
use fds_core::{
    Config, DirtyThresholdGc, EventKind, FindToken, FlashStore, MountDecision, RecordKey,
    StoreError, StoreEvent,
};
use fds_flash::{FileFlash, FlashError, FlashGeometry, RetryFlash, SimFlash};
use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

const PAGE_WORDS: u32 = 64;

fn geometry(page_words: u32) -> FlashGeometry {
    FlashGeometry::new(0, page_words, 3)
}

fn config(page_words: u32) -> Config {
    Config::new().virtual_pages(3).virtual_page_words(page_words)
}

fn mounted(flash: SimFlash, config: Config) -> (FlashStore<SimFlash>, Receiver<StoreEvent>) {
    let store = FlashStore::new(flash, config).unwrap();
    let events = store.subscribe().unwrap();
    store.init().unwrap();
    store.run_until_idle().unwrap();
    (store, events)
}

fn new_store() -> (FlashStore<SimFlash>, Receiver<StoreEvent>) {
    mounted(SimFlash::new(geometry(PAGE_WORDS)), config(PAGE_WORDS))
}

fn words(values: &[u32]) -> Bytes {
    Bytes::from(values.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>())
}

fn drain(events: &Receiver<StoreEvent>) -> Vec<StoreEvent> {
    events.try_iter().collect()
}

fn read(store: &FlashStore<SimFlash>, record_type: u16, instance: u16) -> Option<Vec<u8>> {
    let mut desc = store
        .find(record_type, instance, &mut FindToken::default())
        .ok()?;
    let view = store.open(&mut desc).unwrap();
    store.close(&desc).unwrap();
    Some(view.data)
}

#[test]
fn fresh_flash_is_installed() {
    let (store, events) = new_store();
    assert!(store.is_ready());
    assert_eq!(
        drain(&events),
        vec![StoreEvent::Init {
            result: Ok(MountDecision::FreshInstall)
        }]
    );

    let stat = store.stat().unwrap();
    assert_eq!(stat.pages_available, 2);
    assert_eq!(stat.valid_records, 0);
    assert_eq!(stat.largest_contig, PAGE_WORDS - 2);
}

#[test]
fn write_find_open_clear_gc() {
    let (store, events) = new_store();
    drain(&events);

    let payload = Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]);
    let desc = store.write(RecordKey::new(5, 7), &[payload.clone()]).unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(
        drain(&events),
        vec![StoreEvent::Write {
            result: Ok(()),
            record_id: desc.record_id(),
            key: RecordKey::new(5, 7),
        }]
    );

    let mut found = store.find(5, 7, &mut FindToken::default()).unwrap();
    assert_eq!(found.record_id(), desc.record_id());
    let view = store.open(&mut found).unwrap();
    assert_eq!(view.data, payload.to_vec());
    assert_eq!(view.key(), RecordKey::new(5, 7));
    store.close(&found).unwrap();

    store.clear(&desc).unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(
        store.find(5, 7, &mut FindToken::default()),
        Err(StoreError::NotFound)
    );
    let before = store.stat().unwrap();
    assert_eq!(before.dirty_records, 1);
    assert_eq!(before.freeable_words, 5);

    store.gc().unwrap();
    store.run_until_idle().unwrap();
    let after = store.stat().unwrap();
    assert!(after.words_used < before.words_used);
    assert_eq!(after.dirty_records, 0);

    // The cleared record held the highest id, so a 3-word id marker stays.
    let gc = drain(&events).pop().unwrap();
    assert_eq!(
        gc,
        StoreEvent::Gc {
            result: Ok(()),
            pages_compacted: 1,
            words_freed: 2,
        }
    );
}

#[test]
fn chunks_are_concatenated() {
    let (store, _events) = new_store();
    store
        .write(
            RecordKey::new(1, 1),
            &[words(&[1]), words(&[2, 3]), words(&[4])],
        )
        .unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(read(&store, 1, 1).unwrap(), words(&[1, 2, 3, 4]).to_vec());
}

#[test]
fn update_replaces_record() {
    let (store, events) = new_store();
    let old = store.write(RecordKey::new(3, 1), &[words(&[10])]).unwrap();
    store.run_until_idle().unwrap();
    drain(&events);

    let new = store
        .update(&old, RecordKey::new(3, 1), &[words(&[20, 21])])
        .unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(
        drain(&events),
        vec![StoreEvent::Update {
            result: Ok(()),
            record_id: new.record_id(),
            old_record_id: old.record_id(),
            key: RecordKey::new(3, 1),
        }]
    );

    let mut token = FindToken::default();
    let found = store.find(3, 1, &mut token).unwrap();
    assert_eq!(found.record_id(), new.record_id());
    assert_eq!(store.find(3, 1, &mut token), Err(StoreError::NotFound));

    let mut stale = old;
    assert_eq!(store.open(&mut stale), Err(StoreError::NotFound));
    assert_eq!(read(&store, 3, 1).unwrap(), words(&[20, 21]).to_vec());
}

#[test]
fn update_of_missing_record_still_writes() {
    let (store, _events) = new_store();
    let ghost = store.descriptor_from_id(fds_core::RecordId::new(999));
    store
        .update(&ghost, RecordKey::new(2, 2), &[words(&[1])])
        .unwrap();
    store.run_until_idle().unwrap();
    assert!(read(&store, 2, 2).is_some());
}

#[test]
fn second_clear_reports_not_found() {
    let (store, _events) = new_store();
    let desc = store.write(RecordKey::new(1, 1), &[words(&[1])]).unwrap();
    store.run_until_idle().unwrap();
    store.clear(&desc).unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(store.clear(&desc), Err(StoreError::NotFound));
}

#[test]
fn find_walks_all_matches_once() {
    let (store, _events) = new_store();
    let mut ids = Vec::new();
    for instance in 1..=4 {
        ids.push(
            store
                .write(RecordKey::new(8, instance), &[words(&[u32::from(instance)])])
                .unwrap()
                .record_id(),
        );
        store.run_until_idle().unwrap();
    }
    store.write(RecordKey::new(9, 1), &[words(&[0])]).unwrap();
    store.run_until_idle().unwrap();

    let mut token = FindToken::default();
    let mut seen = Vec::new();
    while let Ok(desc) = store.find_by_type(8, &mut token) {
        seen.push(desc.record_id());
    }
    assert_eq!(seen, ids);
    assert!(token.is_fresh());

    let mut token = FindToken::default();
    let mut by_instance = 0;
    while store.find_by_instance(1, &mut token).is_ok() {
        by_instance += 1;
    }
    assert_eq!(by_instance, 2);
}

#[test]
fn clear_by_instance_counts_records() {
    let (store, events) = new_store();
    for (record_type, instance) in [(1, 1), (2, 1), (3, 2), (4, 1)] {
        store
            .write(RecordKey::new(record_type, instance), &[words(&[7])])
            .unwrap();
        store.run_until_idle().unwrap();
    }
    drain(&events);

    store.clear_by_instance(1).unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(
        drain(&events),
        vec![StoreEvent::ClearInstance {
            result: Ok(()),
            instance: 1,
            cleared: 3,
        }]
    );
    assert!(store
        .find_by_instance(1, &mut FindToken::default())
        .is_err());
    assert!(read(&store, 3, 2).is_some());
}

#[test]
fn gc_preserves_live_records() {
    let (store, _events) = new_store();
    let mut kept = Vec::new();
    for i in 0..8u16 {
        let desc = store
            .write(RecordKey::new(1, i + 1), &[words(&[u32::from(i); 3])])
            .unwrap();
        store.run_until_idle().unwrap();
        if i % 2 == 0 {
            store.clear(&desc).unwrap();
            store.run_until_idle().unwrap();
        } else {
            kept.push((i, desc));
        }
    }

    store.gc().unwrap();
    store.run_until_idle().unwrap();

    for (i, desc) in &kept {
        let mut desc = *desc;
        let view = store.open(&mut desc).unwrap();
        assert_eq!(view.data, words(&[u32::from(*i); 3]).to_vec());
        store.close(&desc).unwrap();
    }
    assert_eq!(store.stat().unwrap().valid_records, kept.len() as u32);
    assert_eq!(store.stat().unwrap().dirty_records, 0);
}

#[test]
fn gc_skips_pages_with_open_records() {
    let (store, events) = new_store();
    let open = store.write(RecordKey::new(1, 1), &[words(&[1])]).unwrap();
    let dead = store.write(RecordKey::new(1, 2), &[words(&[2])]).unwrap();
    store.run_until_idle().unwrap();
    store.clear(&dead).unwrap();
    store.run_until_idle().unwrap();

    let mut open = open;
    store.open(&mut open).unwrap();
    drain(&events);
    store.gc().unwrap();
    store.run_until_idle().unwrap();
    assert!(matches!(
        drain(&events).as_slice(),
        [StoreEvent::Gc {
            result: Ok(()),
            pages_compacted: 0,
            ..
        }]
    ));

    store.close(&open).unwrap();
    store.gc().unwrap();
    store.run_until_idle().unwrap();
    assert!(matches!(
        drain(&events).as_slice(),
        [StoreEvent::Gc {
            result: Ok(()),
            pages_compacted: 1,
            ..
        }]
    ));
    assert_eq!(read(&store, 1, 1).unwrap(), words(&[1]).to_vec());
}

#[test]
fn largest_record_per_page_size() {
    for page_words in [16, 32, 64, 256] {
        let (store, _events) = mounted(SimFlash::new(geometry(page_words)), config(page_words));
        let key = RecordKey::new(1, 1);
        let fits = words(&vec![0xA5A5_A5A5; (page_words - 5) as usize]);
        let too_big = words(&vec![0; (page_words - 4) as usize]);

        assert_eq!(
            store.write(key, &[too_big]),
            Err(StoreError::RecordTooLarge {
                words: page_words - 1,
                max: page_words - 2,
            })
        );
        store.write(key, &[fits.clone()]).unwrap();
        store.run_until_idle().unwrap();
        assert_eq!(read(&store, 1, 1).unwrap(), fits.to_vec());
    }
}

#[test]
fn full_flash_recovers_after_gc() {
    let (store, _events) = new_store();
    let key = RecordKey::new(4, 4);
    let mut written = Vec::new();
    loop {
        match store.write(key, &[words(&[1, 2, 3, 4])]) {
            Ok(desc) => written.push(desc),
            Err(StoreError::NoSpaceInFlash) => break,
            Err(err) => panic!("unexpected error: {err}"),
        }
        store.run_until_idle().unwrap();
    }
    // Two data pages of 62 usable words hold eight 7-word records each.
    assert_eq!(written.len(), 16);
    assert_eq!(store.stat().unwrap().largest_contig, 6);

    for desc in &written {
        store.clear(desc).unwrap();
        store.run_until_idle().unwrap();
    }
    store.gc().unwrap();
    store.run_until_idle().unwrap();

    assert_eq!(store.stat().unwrap().largest_contig, PAGE_WORDS - 2);
    store.write(key, &[words(&[9])]).unwrap();
    store.run_until_idle().unwrap();
}

#[test]
fn reservation_after_partial_use() {
    let (store, _events) = new_store();
    store.write(RecordKey::new(1, 1), &[words(&[1; 10])]).unwrap();
    store.run_until_idle().unwrap();
    let before = store.stat().unwrap();

    let token = store.reserve(20).unwrap();
    assert_eq!(store.stat().unwrap().words_reserved, 23);
    store.reserve_cancel(token).unwrap();

    let after = store.stat().unwrap();
    assert_eq!(after.words_reserved, 0);
    assert_eq!(after.largest_contig, before.largest_contig);
}

#[test]
fn reservations_hold_space() {
    let (store, _events) = new_store();
    // Fills both data pages.
    let first = store.reserve(59).unwrap();
    let second = store.reserve(59).unwrap();
    assert_eq!(
        store.write(RecordKey::new(1, 1), &[words(&[1])]),
        Err(StoreError::NoSpaceInFlash)
    );
    store.reserve_cancel(second).unwrap();
    store.write(RecordKey::new(1, 1), &[words(&[1])]).unwrap();
    store
        .write_reserved(first, RecordKey::new(2, 2), &[words(&[2; 59])])
        .unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(read(&store, 2, 2).unwrap(), words(&[2; 59]).to_vec());
}

#[test]
fn remount_keeps_records_and_ids() {
    let (store, _events) = new_store();
    let first = store.write(RecordKey::new(6, 1), &[words(&[42])]).unwrap();
    store.run_until_idle().unwrap();
    let image = store.into_flash().image();

    let (store, events) = mounted(SimFlash::from_image(geometry(PAGE_WORDS), image), config(PAGE_WORDS));
    assert_eq!(
        drain(&events),
        vec![StoreEvent::Init {
            result: Ok(MountDecision::AlreadyInstalled)
        }]
    );
    assert_eq!(read(&store, 6, 1).unwrap(), words(&[42]).to_vec());

    let next = store.write(RecordKey::new(6, 2), &[words(&[43])]).unwrap();
    assert!(next.record_id() > first.record_id());
    store.run_until_idle().unwrap();
}

#[test]
fn ids_are_not_reused_after_gc_and_remount() {
    let (store, _events) = new_store();
    store.write(RecordKey::new(1, 1), &[words(&[1])]).unwrap();
    let b = store.write(RecordKey::new(1, 2), &[words(&[2])]).unwrap();
    store.run_until_idle().unwrap();
    store.clear(&b).unwrap();
    store.gc().unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(store.stat().unwrap().dirty_records, 0);
    let image = store.into_flash().image();

    let (store, _events) = mounted(SimFlash::from_image(geometry(PAGE_WORDS), image), config(PAGE_WORDS));
    let c = store.write(RecordKey::new(1, 3), &[words(&[3])]).unwrap();
    store.run_until_idle().unwrap();
    assert!(c.record_id() > b.record_id());
    assert_eq!(
        store.open(&mut store.descriptor_from_id(b.record_id())),
        Err(StoreError::NotFound)
    );
    assert_eq!(
        store.clear(&store.descriptor_from_id(b.record_id())),
        Err(StoreError::NotFound)
    );
    assert_eq!(read(&store, 1, 1).unwrap(), words(&[1]).to_vec());
    assert_eq!(read(&store, 1, 3).unwrap(), words(&[3]).to_vec());
}

#[test]
fn id_marker_is_not_collected_again() {
    let (store, events) = new_store();
    let desc = store.write(RecordKey::new(1, 1), &[words(&[1, 2])]).unwrap();
    store.run_until_idle().unwrap();
    store.clear(&desc).unwrap();
    store.gc().unwrap();
    store.run_until_idle().unwrap();
    let first = store.stat().unwrap();
    assert_eq!(first.valid_records, 0);
    assert_eq!(first.dirty_records, 0);
    assert_eq!(first.freeable_words, 0);
    assert_eq!(first.words_used, 2 + 3 + 2);

    drain(&events);
    store.gc().unwrap();
    store.run_until_idle().unwrap();
    assert!(matches!(
        drain(&events).as_slice(),
        [StoreEvent::Gc {
            result: Ok(()),
            pages_compacted: 0,
            words_freed: 0,
        }]
    ));
    assert_eq!(store.stat().unwrap().words_used, first.words_used);
}

#[test]
fn file_image_persists_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flash.img");

    {
        let flash = FileFlash::create(&path, geometry(PAGE_WORDS)).unwrap();
        let store = FlashStore::new(flash, config(PAGE_WORDS)).unwrap();
        store.init().unwrap();
        store.run_until_idle().unwrap();
        store
            .write(RecordKey::new(11, 3), &[Bytes::from_static(b"persist!")])
            .unwrap();
        store.run_until_idle().unwrap();
    }

    let flash = FileFlash::open(&path, geometry(PAGE_WORDS)).unwrap();
    let store = FlashStore::new(flash, config(PAGE_WORDS)).unwrap();
    store.init().unwrap();
    store.run_until_idle().unwrap();
    let mut desc = store.find(11, 3, &mut FindToken::default()).unwrap();
    assert_eq!(store.open(&mut desc).unwrap().data, b"persist!".to_vec());
}

#[test]
fn failed_write_reports_error_and_frees_space() {
    let (store, events) = new_store();
    drain(&events);
    store.with_flash_mut(|f| f.faults_mut().fail_next = 1);

    let desc = store.write(RecordKey::new(1, 1), &[words(&[1])]).unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(
        drain(&events),
        vec![StoreEvent::Write {
            result: Err(StoreError::Flash(FlashError::OperationFailed)),
            record_id: desc.record_id(),
            key: RecordKey::new(1, 1),
        }]
    );
    assert!(read(&store, 1, 1).is_none());
    assert_eq!(store.stat().unwrap().words_used, 4);

    store.write(RecordKey::new(1, 1), &[words(&[2])]).unwrap();
    store.run_until_idle().unwrap();
    assert_eq!(read(&store, 1, 1).unwrap(), words(&[2]).to_vec());
}

#[test]
fn torn_header_is_sealed_and_skipped() {
    let (store, events) = new_store();
    drain(&events);
    store.with_flash_mut(|f| f.faults_mut().tear_next = 1);

    let torn = store.write(RecordKey::new(1, 1), &[words(&[1, 2])]).unwrap();
    store.write(RecordKey::new(2, 2), &[words(&[3])]).unwrap();
    store.run_until_idle().unwrap();
    let results: Vec<_> = drain(&events)
        .iter()
        .map(|e| e.result().map_err(Clone::clone))
        .collect();
    assert_eq!(
        results,
        vec![Err(StoreError::Flash(FlashError::OperationFailed)), Ok(())]
    );

    // The torn record keeps its 5 words and reads as cleared.
    let stat = store.stat().unwrap();
    assert_eq!(stat.dirty_records, 1);
    assert_eq!(stat.freeable_words, 5);
    assert_eq!(stat.words_used, 2 + 5 + 4 + 2);
    let image = store.into_flash().image();

    let (store, _events) = mounted(SimFlash::from_image(geometry(PAGE_WORDS), image), config(PAGE_WORDS));
    assert!(read(&store, 1, 1).is_none());
    assert_eq!(read(&store, 2, 2).unwrap(), words(&[3]).to_vec());
    let stat = store.stat().unwrap();
    assert_eq!(stat.valid_records, 1);
    assert_eq!(stat.dirty_records, 1);
    assert_eq!(
        store.open(&mut store.descriptor_from_id(torn.record_id())),
        Err(StoreError::NotFound)
    );
}

#[test]
fn retry_wrapper_hides_transient_failures() {
    let flash = RetryFlash::new(SimFlash::new(geometry(PAGE_WORDS)), RetryFlash::<SimFlash>::DEFAULT_RETRIES);
    let store = FlashStore::new(flash, config(PAGE_WORDS)).unwrap();
    let events = store.subscribe().unwrap();
    store.init().unwrap();
    store.run_until_idle().unwrap();
    drain(&events);

    store.with_flash_mut(|f| f.inner_mut().faults_mut().fail_next = 2);
    store.write(RecordKey::new(1, 1), &[words(&[5])]).unwrap();
    store.run_until_idle().unwrap();
    assert!(drain(&events).iter().all(StoreEvent::is_ok));

    store.with_flash_mut(|f| f.inner_mut().faults_mut().fail_next = 10);
    store.write(RecordKey::new(1, 2), &[words(&[6])]).unwrap();
    store.run_until_idle().unwrap();
    let failed = drain(&events);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].result(), Err(&StoreError::Timeout));
}

#[test]
fn threshold_policy_collects_automatically() {
    let store = FlashStore::with_policy(
        SimFlash::new(geometry(PAGE_WORDS)),
        config(PAGE_WORDS),
        DirtyThresholdGc::new(10),
    )
    .unwrap();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    store
        .register(Box::new(move |event: &StoreEvent| sink.lock().push(event.kind())))
        .unwrap();
    store.init().unwrap();
    store.run_until_idle().unwrap();

    for _ in 0..3 {
        let desc = store.write(RecordKey::new(1, 1), &[words(&[1, 2])]).unwrap();
        store.run_until_idle().unwrap();
        store.clear(&desc).unwrap();
        store.run_until_idle().unwrap();
    }

    // Two cleared 5-word records reach the threshold.
    let kinds = kinds.lock().clone();
    assert_eq!(
        kinds,
        vec![
            EventKind::Init,
            EventKind::Write,
            EventKind::Clear,
            EventKind::Write,
            EventKind::Clear,
            EventKind::Gc,
            EventKind::Write,
            EventKind::Clear,
        ]
    );
    assert_eq!(store.stat().unwrap().dirty_records, 1);
}
