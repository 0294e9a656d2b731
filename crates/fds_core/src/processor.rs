//! Command processor.
//!
//! The processor owns the head of the command queue. It is entered either
//! to start idle processing or with the outcome of the flash operation in
//! flight, advances the head command by exactly one step and returns once a
//! new flash operation has been issued or the queue is empty. Commands that
//! finish without touching flash (a clear of a missing record, an already
//! installed mount) complete immediately and the next command starts.

use crate::command::{
    ClearCommand, ClearInstanceCommand, Command, GcCommand, InitCommand, WriteCommand, WriteStep,
};
use crate::error::{StoreError, StoreResult};
use crate::events::{EventKind, StoreEvent};
use crate::mount::MountOp;
use crate::page::PageKind;
use crate::record::{bytes_to_words, PageTag, HEADER_WORDS, PAGE_TAG_VALID};
use crate::scan::{self, KeyFilter, Located};
use crate::stats;
use crate::store::{Inner, State};
use fds_flash::{FlashDriver, FlashResult, ERASED_WORD, WORD_SIZE};
use tracing::{debug, info, warn};

/// Result of one step.
pub(crate) enum Progress {
    /// A flash operation was issued.
    Executing,
    /// The command is finished.
    Done(StoreEvent),
}

impl<F: FlashDriver> Inner<F> {
    /// Starts the head command unless an operation is already in flight.
    pub(crate) fn process(&mut self, events: &mut Vec<StoreEvent>) {
        if !self.processing {
            self.advance(None, events);
        }
    }

    /// Feeds the outcome of the operation in flight to the head command.
    pub(crate) fn complete(&mut self, outcome: FlashResult<()>, events: &mut Vec<StoreEvent>) {
        if !self.processing {
            warn!(?outcome, "flash completion without a command in flight");
            return;
        }
        self.advance(Some(outcome), events);
    }

    fn advance(&mut self, mut outcome: Option<FlashResult<()>>, events: &mut Vec<StoreEvent>) {
        self.processing = false;
        while let Some(mut command) = self.commands.pop_front() {
            let progress = match &mut command {
                Command::Init(cmd) => self.init_step(cmd, outcome.take()),
                Command::Write(cmd) => self.write_step(cmd, outcome.take()),
                Command::Clear(cmd) => self.clear_step(cmd, outcome.take()),
                Command::ClearInstance(cmd) => self.clear_instance_step(cmd, outcome.take()),
                Command::Gc(cmd) => self.gc_step(cmd, outcome.take()),
            };
            match progress {
                Progress::Executing => {
                    self.processing = true;
                    self.commands.push_front(command);
                    return;
                }
                Progress::Done(event) => {
                    debug!(command = command.name(), ok = event.is_ok(), "command finished");
                    let mutated = matches!(
                        event.kind(),
                        EventKind::Write | EventKind::Update | EventKind::Clear
                    );
                    if mutated && event.is_ok() {
                        self.consult_policy();
                    }
                    events.push(event);
                }
            }
        }
    }

    fn consult_policy(&mut self) {
        if !self.policy.is_enabled()
            || self.commands.iter().any(|c| matches!(c, Command::Gc(_)))
        {
            return;
        }
        let stat = match stats::collect(&self.flash, &self.table, self.gc_generation) {
            Ok(stat) => stat,
            Err(err) => {
                warn!(%err, "usage snapshot failed, skipping gc policy");
                return;
            }
        };
        if self.policy.should_collect(&stat) {
            match self.commands.push_back(Command::Gc(GcCommand::new())) {
                Ok(()) => info!(freeable_words = stat.freeable_words, "automatic gc queued"),
                Err(_) => debug!("command queue full, automatic gc skipped"),
            }
        }
    }

    pub(crate) fn write_words(&mut self, address: u32, words: &[u32]) -> StoreResult<()> {
        debug!(address, len = words.len(), "flash write");
        self.flash.start_write(address, words)?;
        Ok(())
    }

    pub(crate) fn erase_page(&mut self, address: u32) -> StoreResult<()> {
        debug!(address, pages = self.erase_pages, "flash erase");
        self.flash.start_erase(address, self.erase_pages)?;
        Ok(())
    }

    /// Rewrites a record's first header word with the invalid type.
    fn invalidate(&mut self, located: &Located) -> StoreResult<()> {
        let page = self.table.get_mut(located.page)?;
        page.can_gc = true;
        let address = page.word_address(located.offset);
        self.write_words(address, &[located.header.invalidated_word()])
    }

    fn init_step(&mut self, cmd: &mut InitCommand, outcome: Option<FlashResult<()>>) -> Progress {
        if let Some(outcome) = outcome {
            let op = cmd.current.take();
            if let Err(err) = outcome {
                return self.init_failed(err.into());
            }
            if let Some(MountOp::TagValid { address } | MountOp::Promote { address }) = op {
                if let Some(page) = self.table.find_by_address(address) {
                    page.kind = PageKind::Valid;
                }
            }
        }

        let Some(op) = cmd.ops.pop_front() else {
            self.state = State::Ready;
            info!(decision = ?cmd.decision, pages = self.table.len(), "store initialized");
            return Progress::Done(StoreEvent::Init {
                result: Ok(cmd.decision),
            });
        };

        debug!(?op, remaining = cmd.ops.len(), "mount step");
        let started = match op {
            MountOp::Erase { address } => self.erase_page(address),
            MountOp::TagSwap { address } => self.write_words(address, &PageTag::swap_words()),
            MountOp::TagValid { address } => self.write_words(address, &PageTag::valid_words()),
            MountOp::Promote { address } => self.write_words(address + WORD_SIZE, &[PAGE_TAG_VALID]),
        };
        match started {
            Ok(()) => {
                cmd.current = Some(op);
                Progress::Executing
            }
            Err(err) => self.init_failed(err),
        }
    }

    fn init_failed(&mut self, err: StoreError) -> Progress {
        warn!(%err, "initialization failed");
        self.state = State::Uninitialized;
        Progress::Done(StoreEvent::Init { result: Err(err) })
    }

    fn write_step(&mut self, cmd: &mut WriteCommand, outcome: Option<FlashResult<()>>) -> Progress {
        if let Some(outcome) = outcome {
            if cmd.step == WriteStep::Seal {
                return self.write_sealed(cmd, outcome);
            }
            if let Err(err) = outcome {
                return self.write_failed(cmd, err.into());
            }
            cmd.step = cmd.step.after();
        }

        loop {
            debug!(id = cmd.header.record_id, step = ?cmd.step, "write step");
            let issued = match cmd.step {
                WriteStep::TypeLength => self.write_type_length(cmd),
                WriteStep::Id => self
                    .record_address(cmd, 2)
                    .and_then(|address| self.write_words(address, &[cmd.header.record_id])),
                WriteStep::Chunks => {
                    if cmd.chunks_left == 0 {
                        cmd.step = WriteStep::InstanceCrc;
                        continue;
                    }
                    self.write_next_chunk(cmd)
                }
                WriteStep::InstanceCrc => self.record_address(cmd, 1).and_then(|address| {
                    self.write_words(address, &[cmd.header.instance_crc_word()])
                }),
                WriteStep::InvalidateOld => {
                    let Some(old) = cmd.old else {
                        cmd.step = WriteStep::Done;
                        continue;
                    };
                    match self.resolve(&old) {
                        Ok(Some(located)) if located.header.is_valid() => {
                            self.invalidate(&located)
                        }
                        Ok(_) => {
                            debug!(old = %old.record_id(), "replaced record already gone");
                            cmd.step = WriteStep::Done;
                            continue;
                        }
                        Err(err) => Err(err),
                    }
                }
                WriteStep::Seal => self.record_address(cmd, 0).and_then(|address| {
                    self.write_words(address, &[cmd.header.invalidated_word()])
                }),
                WriteStep::Done => {
                    debug!(id = cmd.header.record_id, "record written");
                    return Progress::Done(write_event(cmd, Ok(())));
                }
            };
            return match issued {
                Ok(()) => Progress::Executing,
                Err(err) => self.write_failed(cmd, err),
            };
        }
    }

    fn write_type_length(&mut self, cmd: &mut WriteCommand) -> StoreResult<()> {
        let start = self
            .table
            .commit(cmd.page, cmd.reserved, cmd.header.total_words())?;
        cmd.reserved = 0;
        cmd.start = Some(start);
        let address = self.record_address(cmd, 0)?;
        self.write_words(address, &[cmd.header.type_length_word()])
    }

    fn write_next_chunk(&mut self, cmd: &mut WriteCommand) -> StoreResult<()> {
        let chunk = self
            .chunks
            .pop()
            .ok_or(StoreError::Internal("chunk queue out of sync"))?;
        cmd.chunks_left -= 1;
        let words = bytes_to_words(&chunk);
        let address = self.record_address(cmd, HEADER_WORDS + cmd.written)?;
        cmd.written += words.len() as u32;
        self.write_words(address, &words)
    }

    fn record_address(&self, cmd: &WriteCommand, offset: u32) -> StoreResult<u32> {
        let start = cmd
            .start
            .ok_or(StoreError::Internal("record space not committed"))?;
        Ok(self.table.get(cmd.page)?.word_address(start + offset))
    }

    fn write_failed(&mut self, cmd: &mut WriteCommand, err: StoreError) -> Progress {
        if cmd.step == WriteStep::Seal {
            warn!(id = cmd.header.record_id, %err, "could not seal torn header");
            let failure = cmd.failure.take().unwrap_or(err);
            return Progress::Done(write_event(cmd, Err(failure)));
        }
        warn!(id = cmd.header.record_id, step = ?cmd.step, %err, "write failed");
        if cmd.reserved > 0 {
            if let Err(release) = self.table.release(cmd.page, cmd.reserved) {
                warn!(%release, "could not release reservation");
            }
            cmd.reserved = 0;
        }
        self.chunks.discard(cmd.chunks_left);
        cmd.chunks_left = 0;
        if let Some(start) = cmd.start {
            let result = match cmd.step {
                WriteStep::TypeLength => match self.first_header_word(cmd) {
                    Ok(ERASED_WORD) => self
                        .table
                        .rollback(cmd.page, start, cmd.header.total_words()),
                    // Partly programmed: keep the space and give it a
                    // readable length.
                    Ok(_) => {
                        if let Ok(page) = self.table.get_mut(cmd.page) {
                            page.can_gc = true;
                        }
                        cmd.failure = Some(err);
                        cmd.step = WriteStep::Seal;
                        return self.write_step(cmd, None);
                    }
                    Err(read) => {
                        warn!(%read, "could not read back failed header");
                        self.table.get_mut(cmd.page).map(|page| page.can_gc = true)
                    }
                },
                // The new record is complete, only the old one survives too.
                WriteStep::InvalidateOld | WriteStep::Done => Ok(()),
                _ => self.table.get_mut(cmd.page).map(|page| page.can_gc = true),
            };
            if let Err(err) = result {
                warn!(%err, "page bookkeeping after failed write");
            }
        }
        Progress::Done(write_event(cmd, Err(err)))
    }

    fn first_header_word(&self, cmd: &WriteCommand) -> StoreResult<u32> {
        let address = self.record_address(cmd, 0)?;
        let mut word = [ERASED_WORD];
        self.flash.read(address, &mut word)?;
        Ok(word[0])
    }

    /// Finishes a write whose torn header was sealed. The write still fails
    /// with the error that tore it.
    fn write_sealed(&mut self, cmd: &mut WriteCommand, outcome: FlashResult<()>) -> Progress {
        if let Err(err) = outcome {
            warn!(id = cmd.header.record_id, %err, "could not seal torn header");
        } else {
            debug!(id = cmd.header.record_id, "torn header sealed");
        }
        let failure = cmd
            .failure
            .take()
            .unwrap_or(StoreError::Internal("sealed write without a failure"));
        Progress::Done(write_event(cmd, Err(failure)))
    }

    fn clear_step(&mut self, cmd: &mut ClearCommand, outcome: Option<FlashResult<()>>) -> Progress {
        let record_id = cmd.target.record_id();
        if let Some(outcome) = outcome {
            return Progress::Done(StoreEvent::Clear {
                result: outcome.map_err(StoreError::from),
                record_id,
            });
        }
        let issued = match self.resolve(&cmd.target) {
            Ok(Some(located)) if located.header.is_valid() => self.invalidate(&located),
            Ok(_) => Err(StoreError::NotFound),
            Err(err) => Err(err),
        };
        match issued {
            Ok(()) => Progress::Executing,
            Err(err) => {
                debug!(%record_id, %err, "clear failed");
                Progress::Done(StoreEvent::Clear {
                    result: Err(err),
                    record_id,
                })
            }
        }
    }

    fn clear_instance_step(
        &mut self,
        cmd: &mut ClearInstanceCommand,
        outcome: Option<FlashResult<()>>,
    ) -> Progress {
        if let Some(outcome) = outcome {
            if let Err(err) = outcome {
                return Progress::Done(StoreEvent::ClearInstance {
                    result: Err(err.into()),
                    instance: cmd.instance,
                    cleared: cmd.cleared,
                });
            }
            cmd.cleared += 1;
        }

        let filter = KeyFilter {
            record_type: None,
            instance: Some(cmd.instance),
        };
        let issued = match scan::find_by_key(&self.flash, &self.table, filter, &mut cmd.token) {
            Ok(Some(located)) => self.invalidate(&located).map(|()| true),
            Ok(None) => Ok(false),
            Err(err) => Err(err),
        };
        match issued {
            Ok(true) => Progress::Executing,
            Ok(false) => Progress::Done(StoreEvent::ClearInstance {
                result: Ok(()),
                instance: cmd.instance,
                cleared: cmd.cleared,
            }),
            Err(err) => Progress::Done(StoreEvent::ClearInstance {
                result: Err(err),
                instance: cmd.instance,
                cleared: cmd.cleared,
            }),
        }
    }
}

fn write_event(cmd: &WriteCommand, result: StoreResult<()>) -> StoreEvent {
    let record_id = cmd.header.id();
    let key = cmd.header.key();
    match cmd.old {
        Some(old) => StoreEvent::Update {
            result,
            record_id,
            old_record_id: old.record_id(),
            key,
        },
        None => StoreEvent::Write {
            result,
            record_id,
            key,
        },
    }
}
