//! Queued commands and their step enums.
//!
//! A command is created when an API call is accepted and advanced one step
//! per flash completion by the processor. Each step issues at most one
//! flash operation.

use crate::error::StoreError;
use crate::mount::{MountDecision, MountOp};
use crate::record::RecordHeader;
use crate::types::{Descriptor, FindToken, RecordId};
use std::collections::VecDeque;

/// A queued command.
#[derive(Debug)]
pub(crate) enum Command {
    Init(InitCommand),
    Write(WriteCommand),
    Clear(ClearCommand),
    ClearInstance(ClearInstanceCommand),
    Gc(GcCommand),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Write(w) if w.old.is_some() => "update",
            Self::Write(_) => "write",
            Self::Clear(_) => "clear",
            Self::ClearInstance(_) => "clear_instance",
            Self::Gc(_) => "gc",
        }
    }

    /// Id of the record a queued write will produce.
    pub(crate) fn pending_record(&self) -> Option<RecordId> {
        match self {
            Self::Write(w) => Some(w.header.id()),
            _ => None,
        }
    }
}

/// Executes a mount plan.
#[derive(Debug)]
pub(crate) struct InitCommand {
    pub(crate) decision: MountDecision,
    pub(crate) ops: VecDeque<MountOp>,
    /// Operation in flight.
    pub(crate) current: Option<MountOp>,
}

impl InitCommand {
    pub(crate) fn new(decision: MountDecision, ops: Vec<MountOp>) -> Self {
        Self {
            decision,
            ops: ops.into(),
            current: None,
        }
    }
}

/// Position of a write in its state machine. Each variant names the flash
/// operation issued on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteStep {
    TypeLength,
    Id,
    Chunks,
    InstanceCrc,
    InvalidateOld,
    /// Rewrites a partly programmed first header word with the invalid type.
    Seal,
    Done,
}

impl WriteStep {
    /// Step to enter once the current operation has completed.
    pub(crate) const fn after(self) -> Self {
        match self {
            Self::TypeLength => Self::Id,
            Self::Id => Self::Chunks,
            Self::Chunks => Self::Chunks,
            Self::InstanceCrc => Self::InvalidateOld,
            Self::InvalidateOld | Self::Seal | Self::Done => Self::Done,
        }
    }
}

/// Writes a new record and, for updates, invalidates the old one.
#[derive(Debug)]
pub(crate) struct WriteCommand {
    pub(crate) step: WriteStep,
    pub(crate) header: RecordHeader,
    pub(crate) page: usize,
    /// Reserved words not yet turned into written words.
    pub(crate) reserved: u32,
    /// Offset of the record once its space has been committed.
    pub(crate) start: Option<u32>,
    /// Chunks still in the chunk queue.
    pub(crate) chunks_left: usize,
    /// Payload words written so far.
    pub(crate) written: u32,
    /// Record replaced by an update.
    pub(crate) old: Option<Descriptor>,
    /// Error reported once the seal step finishes.
    pub(crate) failure: Option<StoreError>,
}

impl WriteCommand {
    pub(crate) fn new(
        header: RecordHeader,
        page: usize,
        reserved: u32,
        chunks: usize,
        old: Option<Descriptor>,
    ) -> Self {
        Self {
            step: WriteStep::TypeLength,
            header,
            page,
            reserved,
            start: None,
            chunks_left: chunks,
            written: 0,
            old,
            failure: None,
        }
    }
}

/// Clears one record.
#[derive(Debug)]
pub(crate) struct ClearCommand {
    pub(crate) target: Descriptor,
}

/// Clears every record of an instance.
#[derive(Debug)]
pub(crate) struct ClearInstanceCommand {
    pub(crate) instance: u16,
    pub(crate) token: FindToken,
    pub(crate) cleared: u32,
}

impl ClearInstanceCommand {
    pub(crate) fn new(instance: u16) -> Self {
        Self {
            instance,
            token: FindToken::default(),
            cleared: 0,
        }
    }
}

/// Position of a collection in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GcStep {
    Begin,
    SelectPage,
    CopyRecord,
    SwapRoles,
    EraseSwap,
    SwapErased,
    TagNewValid,
    Promoted,
    TagSwap,
    Done,
}

/// One garbage collection sweep.
#[derive(Debug)]
pub(crate) struct GcCommand {
    pub(crate) step: GcStep,
    pub(crate) worklist: VecDeque<usize>,
    /// Page being compacted.
    pub(crate) current: Option<usize>,
    /// Next word to examine on the current page.
    pub(crate) cursor: u32,
    /// An id marker for the current page was written to the swap.
    pub(crate) marked: bool,
    /// Data page whose tag is being rewritten.
    pub(crate) promoting: Option<u32>,
    pub(crate) pages_compacted: u32,
    pub(crate) words_freed: u32,
}

impl GcCommand {
    pub(crate) fn new() -> Self {
        Self {
            step: GcStep::Begin,
            worklist: VecDeque::new(),
            current: None,
            cursor: 0,
            marked: false,
            promoting: None,
            pages_compacted: 0,
            words_freed: 0,
        }
    }
}
