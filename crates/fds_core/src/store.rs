//! Store facade.

use crate::command::{ClearCommand, ClearInstanceCommand, Command, GcCommand, InitCommand, WriteCommand};
use crate::config::Config;
use crate::error::{ReservedWriteError, StoreError, StoreResult};
use crate::events::{EventHandler, EventFeed, StoreEvent};
use crate::mount;
use crate::page::{PageTable, SwapPage};
use crate::policy::{GcPolicy, ManualGc};
use crate::queue::{ChunkQueue, Ring};
use crate::record::{
    words_to_bytes, Crc16, RecordHeader, HEADER_WORDS, ID_UNWRITTEN, INSTANCE_INVALID,
    PAGE_TAG_WORDS,
};
use crate::scan::{self, KeyFilter, Located};
use crate::stats::{self, StoreStat};
use crate::types::{
    CachedLocation, Descriptor, FindToken, RecordId, RecordKey, RecordView, ReserveToken,
};
use bytes::Bytes;
use fds_flash::FlashDriver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use tracing::{debug, info};

/// Polls without a completion after which [`FlashStore::run_until_idle`]
/// gives up.
const IDLE_POLL_LIMIT: u32 = 10_000;

/// Largest payload a header can describe. `0xFFFF` together with type
/// `0xFFFF` would read back as an erased word.
const MAX_LENGTH_WORDS: u32 = 0xFFFE;

/// Lifecycle of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Uninitialized,
    Initializing,
    Ready,
}

/// Space held by a [`ReserveToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
    pub(crate) page: usize,
    pub(crate) words: u32,
}

/// An opened record and how many times it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenRecord {
    pub(crate) page: usize,
    pub(crate) count: u32,
}

/// Mutable store state. Guarded by the store mutex.
pub(crate) struct Inner<F> {
    pub(crate) flash: F,
    pub(crate) config: Config,
    /// Physical pages per virtual page.
    pub(crate) erase_pages: u32,
    pub(crate) state: State,
    pub(crate) table: PageTable,
    pub(crate) commands: Ring<Command>,
    pub(crate) chunks: ChunkQueue,
    /// A flash operation is in flight.
    pub(crate) processing: bool,
    pub(crate) latest_id: u32,
    pub(crate) gc_generation: u32,
    pub(crate) reservations: HashMap<u32, Reservation>,
    pub(crate) next_token: u32,
    pub(crate) opened: HashMap<RecordId, OpenRecord>,
    pub(crate) policy: Box<dyn GcPolicy>,
}

impl<F: FlashDriver> Inner<F> {
    fn ensure_ready(&self) -> StoreResult<()> {
        match self.state {
            State::Ready => Ok(()),
            State::Uninitialized | State::Initializing => Err(StoreError::NotInitialized),
        }
    }

    fn init(&mut self, events: &mut Vec<StoreEvent>) -> StoreResult<()> {
        match self.state {
            State::Ready => return Ok(()),
            State::Initializing => return Err(StoreError::AlreadyInitializing),
            State::Uninitialized => {}
        }
        let plan = mount::plan(&self.flash, &self.config)?;
        self.table = plan.table;
        self.latest_id = plan.latest_id.unwrap_or(0);
        self.reservations.clear();
        self.opened.clear();
        self.state = State::Initializing;
        self.commands
            .push_back(Command::Init(InitCommand::new(plan.decision, plan.ops)))?;
        self.process(events);
        Ok(())
    }

    /// Largest record, header included, that fits on an empty page.
    fn max_record_total(&self) -> u32 {
        (self.table.page_words - PAGE_TAG_WORDS).min(HEADER_WORDS + MAX_LENGTH_WORDS)
    }

    fn check_size(&self, length_words: u32) -> StoreResult<u32> {
        let total = length_words.saturating_add(HEADER_WORDS);
        let max = self.max_record_total();
        if total > max {
            return Err(StoreError::RecordTooLarge { words: total, max });
        }
        Ok(total)
    }

    /// Validates a key and its chunks. Returns the payload length in words.
    fn check_write(&self, key: RecordKey, chunks: &[Bytes]) -> StoreResult<u32> {
        if !key.is_valid() {
            return Err(StoreError::InvalidKeys);
        }
        if chunks.is_empty() {
            return Err(StoreError::NullParameter("chunks"));
        }
        let mut bytes = 0usize;
        for chunk in chunks {
            if chunk.is_empty() {
                return Err(StoreError::NullParameter("chunk"));
            }
            if chunk.len() % 4 != 0 {
                return Err(StoreError::Unaligned);
            }
            bytes += chunk.len();
        }
        let length_words = u32::try_from(bytes / 4).unwrap_or(u32::MAX);
        self.check_size(length_words)?;
        Ok(length_words)
    }

    fn next_record_id(&self) -> StoreResult<RecordId> {
        match self.latest_id.checked_add(1) {
            Some(id) if id != ID_UNWRITTEN => Ok(RecordId::new(id)),
            _ => Err(StoreError::Internal("record id space exhausted")),
        }
    }

    fn enqueue_write(
        &mut self,
        key: RecordKey,
        chunks: &[Bytes],
        length_words: u32,
        reservation: Option<Reservation>,
        old: Option<Descriptor>,
        events: &mut Vec<StoreEvent>,
    ) -> StoreResult<Descriptor> {
        if self.commands.free() == 0 || !self.chunks.has_room(chunks.len()) {
            return Err(StoreError::NoSpaceInQueues);
        }
        let id = self.next_record_id()?;
        let total = HEADER_WORDS + length_words;
        let reservation = match reservation {
            Some(reservation) => reservation,
            None => Reservation {
                page: self.table.reserve(total)?,
                words: total,
            },
        };

        let mut header = RecordHeader::new(key, length_words as u16, id);
        if self.config.crc_check {
            header.crc16 = record_crc(&header, chunks);
        }
        self.chunks.push_all(chunks)?;
        self.commands.push_back(Command::Write(WriteCommand::new(
            header,
            reservation.page,
            reservation.words,
            chunks.len(),
            old,
        )))?;
        self.latest_id = id.as_u32();
        debug!(
            %id,
            %key,
            words = total,
            page = reservation.page,
            commands = self.commands.len(),
            chunks = self.chunks.len(),
            "write queued"
        );
        self.process(events);
        Ok(Descriptor::from_id(id))
    }

    /// Finds the record behind a descriptor, trusting its cached location
    /// only within the same GC generation.
    pub(crate) fn resolve(&self, descriptor: &Descriptor) -> StoreResult<Option<Located>> {
        if let Some(location) = descriptor.location {
            if location.generation == self.gc_generation {
                let cached = scan::header_at(
                    &self.flash,
                    &self.table,
                    location.page,
                    location.offset,
                    descriptor.record_id,
                )?;
                if let Some(header) = cached {
                    return Ok(Some(Located {
                        page: location.page,
                        offset: location.offset,
                        header,
                    }));
                }
            }
        }
        scan::locate_id(&self.flash, &self.table, descriptor.record_id)
    }

    fn cache(&self, located: &Located) -> Descriptor {
        Descriptor {
            record_id: located.header.id(),
            location: Some(CachedLocation {
                page: located.page,
                offset: located.offset,
                generation: self.gc_generation,
            }),
        }
    }

    fn find(&self, filter: KeyFilter, token: &mut FindToken) -> StoreResult<Descriptor> {
        self.ensure_ready()?;
        let located = scan::find_by_key(&self.flash, &self.table, filter, token)?
            .ok_or(StoreError::NotFound)?;
        Ok(self.cache(&located))
    }

    fn is_pending(&self, id: RecordId) -> bool {
        self.commands.iter().any(|c| c.pending_record() == Some(id))
    }
}

fn record_crc(header: &RecordHeader, chunks: &[Bytes]) -> u16 {
    let mut crc = Crc16::new();
    crc.update_word(header.type_length_word());
    crc.update_word(header.record_id);
    for chunk in chunks {
        crc.update(chunk);
    }
    crc.finish()
}

/// A record store on NOR flash.
///
/// `FlashStore` is the entry point of the crate. It owns the flash driver,
/// the page table, the command and chunk queues and the subscriber list.
///
/// Mutating calls (`write`, `update`, `clear`, `gc`, ...) validate their
/// arguments, queue a command and return immediately. Commands run one flash
/// operation at a time; drive them with [`FlashStore::poll`] or
/// [`FlashStore::run_until_idle`]. Each command reports its outcome once,
/// as a [`StoreEvent`], to every subscriber.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use fds_core::{Config, FindToken, FlashStore, RecordKey};
/// use fds_flash::{FlashGeometry, SimFlash};
///
/// let flash = SimFlash::new(FlashGeometry::new(0, 256, 3));
/// let store = FlashStore::new(flash, Config::new().virtual_page_words(256)).unwrap();
/// store.init().unwrap();
/// store.run_until_idle().unwrap();
///
/// let key = RecordKey::new(5, 7);
/// store.write(key, &[Bytes::from_static(&[1, 2, 3, 4])]).unwrap();
/// store.run_until_idle().unwrap();
///
/// let mut desc = store.find(5, 7, &mut FindToken::default()).unwrap();
/// let record = store.open(&mut desc).unwrap();
/// assert_eq!(record.data, vec![1, 2, 3, 4]);
/// store.close(&desc).unwrap();
/// ```
pub struct FlashStore<F: FlashDriver> {
    config: Config,
    inner: Mutex<Inner<F>>,
    feed: EventFeed,
}

impl<F: FlashDriver> FlashStore<F> {
    /// Creates a store over `flash` with manual garbage collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidParameter`] if the configuration does
    /// not fit the flash geometry.
    pub fn new(flash: F, config: Config) -> StoreResult<Self> {
        Self::with_policy(flash, config, ManualGc)
    }

    /// Creates a store with an automatic garbage collection policy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidParameter`] if the configuration does
    /// not fit the flash geometry.
    pub fn with_policy<P: GcPolicy + 'static>(
        flash: F,
        config: Config,
        policy: P,
    ) -> StoreResult<Self> {
        let erase_pages = config.validate(&flash.geometry())?;
        let inner = Inner {
            flash,
            config: config.clone(),
            erase_pages,
            state: State::Uninitialized,
            table: PageTable::new(Vec::new(), SwapPage::new(0), config.virtual_page_words),
            commands: Ring::new(config.command_queue_size),
            chunks: ChunkQueue::new(config.chunk_queue_size),
            processing: false,
            latest_id: 0,
            gc_generation: 0,
            reservations: HashMap::new(),
            next_token: 0,
            opened: HashMap::new(),
            policy: Box::new(policy),
        };
        Ok(Self {
            feed: EventFeed::new(config.max_users),
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Runs `f` under the store lock and delivers the events it produced
    /// after the lock is released.
    fn dispatch<T>(&self, f: impl FnOnce(&mut Inner<F>, &mut Vec<StoreEvent>) -> T) -> T {
        let mut events = Vec::new();
        let result = {
            let mut inner = self.inner.lock();
            f(&mut inner, &mut events)
        };
        self.feed.emit_all(events);
        result
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mounts the flash and queues the initialization plan.
    ///
    /// The store becomes usable once the [`StoreEvent::Init`] event reports
    /// success. Calling `init` on an initialized store does nothing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyInitializing`] while a previous call is running
    /// - [`StoreError::NoPages`] if the flash has no usable layout
    pub fn init(&self) -> StoreResult<()> {
        self.dispatch(|inner, events| inner.init(events))
    }

    /// Whether initialization has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.lock().state == State::Ready
    }

    /// Registers a callback for command outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserLimitReached`] when every slot is taken.
    pub fn register(&self, handler: EventHandler) -> StoreResult<()> {
        self.feed.register(handler)
    }

    /// Subscribes to command outcomes through a channel.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserLimitReached`] when every slot is taken.
    pub fn subscribe(&self) -> StoreResult<Receiver<StoreEvent>> {
        self.feed.subscribe()
    }

    /// Queues a new record.
    ///
    /// The record id is assigned now and returned in the descriptor. The
    /// record becomes visible once its [`StoreEvent::Write`] reports success.
    ///
    /// # Errors
    ///
    /// Fails with the first violated precondition: `NotInitialized`,
    /// `InvalidKeys`, `NullParameter`, `Unaligned`, `RecordTooLarge`,
    /// `NoSpaceInQueues`, `NoSpaceInFlash`.
    pub fn write(&self, key: RecordKey, chunks: &[Bytes]) -> StoreResult<Descriptor> {
        self.dispatch(|inner, events| {
            inner.ensure_ready()?;
            let length_words = inner.check_write(key, chunks)?;
            inner.enqueue_write(key, chunks, length_words, None, None, events)
        })
    }

    /// Reserves space for a record with a payload of `length_words` words.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `InvalidParameter` for a zero length,
    /// `RecordTooLarge` or `NoSpaceInFlash`.
    pub fn reserve(&self, length_words: u16) -> StoreResult<ReserveToken> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        if length_words == 0 {
            return Err(StoreError::InvalidParameter("zero length reservation"));
        }
        let words = inner.check_size(u32::from(length_words))?;
        let page = inner.table.reserve(words)?;
        let id = inner.next_token;
        inner.next_token = inner.next_token.wrapping_add(1);
        inner.reservations.insert(id, Reservation { page, words });
        debug!(token = id, page, words, "space reserved");
        Ok(ReserveToken { id, length_words })
    }

    /// Writes a record into previously reserved space.
    ///
    /// The payload may be shorter than the reservation; the rest is
    /// released once the record is written.
    ///
    /// # Errors
    ///
    /// As [`FlashStore::write`], plus `InvalidParameter` for an unknown token
    /// or a payload longer than the reservation. A rejected call keeps the
    /// reservation and returns the token in the error.
    pub fn write_reserved(
        &self,
        token: ReserveToken,
        key: RecordKey,
        chunks: &[Bytes],
    ) -> Result<Descriptor, ReservedWriteError> {
        self.dispatch(|inner, events| {
            let result = inner.ensure_ready().and_then(|()| {
                let reservation = *inner
                    .reservations
                    .get(&token.id)
                    .ok_or(StoreError::InvalidParameter("unknown reservation"))?;
                let length_words = inner.check_write(key, chunks)?;
                if length_words > u32::from(token.length_words) {
                    return Err(StoreError::InvalidParameter(
                        "record longer than its reservation",
                    ));
                }
                inner.enqueue_write(key, chunks, length_words, Some(reservation), None, events)
            });
            match result {
                Ok(descriptor) => {
                    inner.reservations.remove(&token.id);
                    Ok(descriptor)
                }
                Err(error) => {
                    debug!(token = token.id, %error, "reserved write rejected");
                    Err(ReservedWriteError { error, token })
                }
            }
        })
    }

    /// Releases a reservation.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `InvalidParameter` for an unknown token.
    pub fn reserve_cancel(&self, token: ReserveToken) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let reservation = inner
            .reservations
            .remove(&token.id)
            .ok_or(StoreError::InvalidParameter("unknown reservation"))?;
        inner.table.release(reservation.page, reservation.words)?;
        debug!(token = token.id, words = reservation.words, "reservation cancelled");
        Ok(())
    }

    /// Queues a replacement for the record behind `descriptor`.
    ///
    /// The new record is written first and the old one is invalidated
    /// afterwards. If the old record is already gone when the update runs,
    /// the update still succeeds.
    ///
    /// # Errors
    ///
    /// As [`FlashStore::write`].
    pub fn update(
        &self,
        descriptor: &Descriptor,
        key: RecordKey,
        chunks: &[Bytes],
    ) -> StoreResult<Descriptor> {
        self.dispatch(|inner, events| {
            inner.ensure_ready()?;
            let length_words = inner.check_write(key, chunks)?;
            inner.enqueue_write(key, chunks, length_words, None, Some(*descriptor), events)
        })
    }

    /// Queues the invalidation of a record.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `NoSpaceInQueues`, or `NotFound` if the record is
    /// neither on flash nor waiting in the queue, or was already cleared.
    pub fn clear(&self, descriptor: &Descriptor) -> StoreResult<()> {
        self.dispatch(|inner, events| {
            inner.ensure_ready()?;
            if inner.commands.free() == 0 {
                return Err(StoreError::NoSpaceInQueues);
            }
            match inner.resolve(descriptor)? {
                Some(located) if located.header.is_valid() => {}
                // Header partly written by a write still in the queue.
                Some(_) | None if inner.is_pending(descriptor.record_id) => {}
                _ => return Err(StoreError::NotFound),
            }
            inner.commands.push_back(Command::Clear(ClearCommand {
                target: *descriptor,
            }))?;
            debug!(id = %descriptor.record_id, "clear queued");
            inner.process(events);
            Ok(())
        })
    }

    /// Queues the invalidation of every record with `instance`.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `InvalidKeys` or `NoSpaceInQueues`.
    pub fn clear_by_instance(&self, instance: u16) -> StoreResult<()> {
        self.dispatch(|inner, events| {
            inner.ensure_ready()?;
            if instance == INSTANCE_INVALID {
                return Err(StoreError::InvalidKeys);
            }
            inner
                .commands
                .push_back(Command::ClearInstance(ClearInstanceCommand::new(instance)))?;
            debug!(instance, "clear by instance queued");
            inner.process(events);
            Ok(())
        })
    }

    /// Finds the next valid record with both `record_type` and `instance`.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `NotFound` once the search is exhausted, which
    /// also resets `token`.
    pub fn find(&self, record_type: u16, instance: u16, token: &mut FindToken) -> StoreResult<Descriptor> {
        let filter = KeyFilter {
            record_type: Some(record_type),
            instance: Some(instance),
        };
        self.inner.lock().find(filter, token)
    }

    /// Finds the next valid record of a type, any instance.
    ///
    /// # Errors
    ///
    /// As [`FlashStore::find`].
    pub fn find_by_type(&self, record_type: u16, token: &mut FindToken) -> StoreResult<Descriptor> {
        let filter = KeyFilter {
            record_type: Some(record_type),
            instance: None,
        };
        self.inner.lock().find(filter, token)
    }

    /// Finds the next valid record of an instance, any type.
    ///
    /// # Errors
    ///
    /// As [`FlashStore::find`].
    pub fn find_by_instance(&self, instance: u16, token: &mut FindToken) -> StoreResult<Descriptor> {
        let filter = KeyFilter {
            record_type: None,
            instance: Some(instance),
        };
        self.inner.lock().find(filter, token)
    }

    /// Reads a record and marks it open.
    ///
    /// An open record's page is skipped by garbage collection until
    /// [`FlashStore::close`] is called. The descriptor's cached location is
    /// refreshed.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `NotFound` for cleared or unknown records, or
    /// `CrcCheckFailed` when CRC checking is enabled and the record is
    /// corrupt.
    pub fn open(&self, descriptor: &mut Descriptor) -> StoreResult<RecordView> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let located = match inner.resolve(descriptor)? {
            Some(located) if located.header.is_valid() => located,
            _ => return Err(StoreError::NotFound),
        };

        let mut payload = vec![0u32; usize::from(located.header.length_words)];
        let address = located.address(&inner.table)? + HEADER_WORDS * fds_flash::WORD_SIZE;
        inner.flash.read(address, &mut payload)?;

        if inner.config.crc_check {
            let computed = located.header.compute_crc(&payload);
            if computed != located.header.crc16 {
                return Err(StoreError::CrcCheckFailed {
                    stored: located.header.crc16,
                    computed,
                });
            }
        }

        inner.table.get_mut(located.page)?.records_open += 1;
        inner
            .opened
            .entry(located.header.id())
            .or_insert(OpenRecord {
                page: located.page,
                count: 0,
            })
            .count += 1;
        *descriptor = inner.cache(&located);
        Ok(RecordView {
            header: located.header,
            data: words_to_bytes(&payload),
        })
    }

    /// Closes a record opened with [`FlashStore::open`].
    ///
    /// Each `open` is matched by one `close`.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `InvalidDescriptor` if the record is not open.
    pub fn close(&self, descriptor: &Descriptor) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        let id = descriptor.record_id;
        let open = inner.opened.get_mut(&id).ok_or(StoreError::InvalidDescriptor)?;
        open.count -= 1;
        let page = open.page;
        if open.count == 0 {
            inner.opened.remove(&id);
        }
        let page = inner.table.get_mut(page)?;
        page.records_open = page
            .records_open
            .checked_sub(1)
            .ok_or(StoreError::Internal("open record count out of sync"))?;
        Ok(())
    }

    /// Queues a garbage collection sweep.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or `NoSpaceInQueues`.
    pub fn gc(&self) -> StoreResult<()> {
        self.dispatch(|inner, events| {
            inner.ensure_ready()?;
            inner.commands.push_back(Command::Gc(GcCommand::new()))?;
            info!("gc queued");
            inner.process(events);
            Ok(())
        })
    }

    /// Returns a usage snapshot.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or a flash read error.
    pub fn stat(&self) -> StoreResult<StoreStat> {
        let inner = self.inner.lock();
        inner.ensure_ready()?;
        stats::collect(&inner.flash, &inner.table, inner.gc_generation)
    }

    /// Builds a descriptor from a bare record id.
    ///
    /// The record is located lazily by the call that uses the descriptor.
    pub fn descriptor_from_id(&self, record_id: RecordId) -> Descriptor {
        Descriptor::from_id(record_id)
    }

    /// Handles at most one flash completion.
    ///
    /// Returns `true` if a completion was processed. Events produced by it
    /// are delivered before this call returns.
    pub fn poll(&self) -> bool {
        self.dispatch(|inner, events| match inner.flash.poll() {
            Some(outcome) => {
                inner.complete(outcome, events);
                true
            }
            None => {
                inner.process(events);
                false
            }
        })
    }

    /// Polls until every queued command has finished.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the driver stops reporting
    /// completions.
    pub fn run_until_idle(&self) -> StoreResult<()> {
        let mut idle_polls = 0;
        while !self.is_idle() {
            if self.poll() {
                idle_polls = 0;
            } else {
                idle_polls += 1;
                if idle_polls >= IDLE_POLL_LIMIT {
                    return Err(StoreError::Timeout);
                }
            }
        }
        Ok(())
    }

    /// Whether no command is queued or running.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.commands.is_empty() && !inner.processing
    }

    /// Runs `f` with the flash driver.
    pub fn with_flash<R>(&self, f: impl FnOnce(&F) -> R) -> R {
        f(&self.inner.lock().flash)
    }

    /// Runs `f` with mutable access to the flash driver.
    ///
    /// Starting operations on the driver directly confuses the processor;
    /// this is meant for fault injection.
    pub fn with_flash_mut<R>(&self, f: impl FnOnce(&mut F) -> R) -> R {
        f(&mut self.inner.lock().flash)
    }

    /// Consumes the store and returns its driver.
    pub fn into_flash(self) -> F {
        self.inner.into_inner().flash
    }
}
