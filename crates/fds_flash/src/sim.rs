//! Simulated NOR flash for testing.

use crate::driver::{first_conflict, FlashDriver, FlashGeometry, FlashOp, ERASED_WORD, WORD_SIZE};
use crate::error::{FlashError, FlashResult};
use parking_lot::RwLock;
use tracing::trace;

/// Faults injected into a [`SimFlash`].
///
/// Counters are consumed one operation at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Number of upcoming operations that complete with [`FlashError::OperationFailed`].
    pub fail_next: u32,
    /// Number of upcoming `start_*` calls rejected with [`FlashError::Busy`].
    pub busy_next: u32,
    /// Number of upcoming writes that program only the low halfword of each
    /// word and then complete with [`FlashError::OperationFailed`].
    pub tear_next: u32,
    /// Number of operations still applied before power is lost. `None` means unlimited.
    pub power_budget: Option<u64>,
}

/// An in-memory NOR flash.
///
/// This driver is suitable for:
/// - Unit and integration tests
/// - Crash-recovery tests, by cutting power after a number of operations
///   and mounting a new store on [`SimFlash::image`]
///
/// Operations complete on the first [`FlashDriver::poll`] after they start.
/// Writes that would set a cleared bit are rejected with
/// [`FlashError::NotErased`].
///
/// # Example
///
/// ```rust
/// use fds_flash::{FlashDriver, FlashGeometry, SimFlash};
///
/// let mut flash = SimFlash::new(FlashGeometry::new(0, 16, 2));
/// flash.start_erase(0, 1).unwrap();
/// assert!(flash.is_busy());
/// assert_eq!(flash.poll(), Some(Ok(())));
/// assert_eq!(flash.erase_count(0), 1);
/// ```
#[derive(Debug)]
pub struct SimFlash {
    geometry: FlashGeometry,
    memory: RwLock<Vec<u32>>,
    pending: Option<FlashOp>,
    faults: FaultPlan,
    powered_off: bool,
    erase_counts: Vec<u32>,
    writes: u64,
    erases: u64,
}

impl SimFlash {
    /// Creates a fully erased flash.
    #[must_use]
    pub fn new(geometry: FlashGeometry) -> Self {
        let words = geometry.total_words() as usize;
        Self::with_memory(geometry, vec![ERASED_WORD; words])
    }

    /// Creates a flash with pre-existing content.
    ///
    /// Useful for testing recovery scenarios. The image is resized to the
    /// geometry, padding with erased words.
    #[must_use]
    pub fn from_image(geometry: FlashGeometry, mut image: Vec<u32>) -> Self {
        image.resize(geometry.total_words() as usize, ERASED_WORD);
        Self::with_memory(geometry, image)
    }

    fn with_memory(geometry: FlashGeometry, memory: Vec<u32>) -> Self {
        Self {
            geometry,
            memory: RwLock::new(memory),
            pending: None,
            faults: FaultPlan::default(),
            powered_off: false,
            erase_counts: vec![0; geometry.page_count as usize],
            writes: 0,
            erases: 0,
        }
    }

    /// Returns a copy of the whole flash content.
    #[must_use]
    pub fn image(&self) -> Vec<u32> {
        self.memory.read().clone()
    }

    /// Returns the active fault plan for modification.
    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    /// Cuts power after `operations` more operations have been applied.
    pub fn cut_power_after(&mut self, operations: u64) {
        self.faults.power_budget = Some(operations);
    }

    /// Returns whether power has been lost.
    #[must_use]
    pub fn is_powered_off(&self) -> bool {
        self.powered_off
    }

    /// Number of completed write operations.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Number of completed erase operations.
    #[must_use]
    pub fn erase_operations(&self) -> u64 {
        self.erases
    }

    /// Number of times a physical page has been erased.
    #[must_use]
    pub fn erase_count(&self, page: usize) -> u32 {
        self.erase_counts.get(page).copied().unwrap_or(0)
    }

    /// Overwrites a word directly, bypassing NOR rules.
    ///
    /// Intended for corrupting images in tests.
    pub fn poke(&mut self, address: u32, value: u32) -> FlashResult<()> {
        let index = self.geometry.word_index(address, 1)?;
        self.memory.write()[index] = value;
        Ok(())
    }

    fn check_start(&mut self) -> FlashResult<()> {
        if self.powered_off {
            return Err(FlashError::PowerLost);
        }
        if self.pending.is_some() {
            return Err(FlashError::Busy);
        }
        if self.faults.busy_next > 0 {
            self.faults.busy_next -= 1;
            return Err(FlashError::Busy);
        }
        Ok(())
    }

    fn apply(&mut self, op: &FlashOp) -> FlashResult<()> {
        let mut memory = self.memory.write();
        match op {
            FlashOp::Write { address, words } => {
                let start = self.geometry.word_index(*address, words.len())?;
                for (slot, word) in memory[start..start + words.len()].iter_mut().zip(words) {
                    *slot &= *word;
                }
                self.writes += 1;
            }
            FlashOp::Erase { address, pages } => {
                let range = self.geometry.erase_range(*address, *pages)?;
                let first_page = range.start / self.geometry.page_words as usize;
                memory[range].fill(ERASED_WORD);
                for page in first_page..first_page + *pages as usize {
                    self.erase_counts[page] += 1;
                }
                self.erases += 1;
            }
        }
        Ok(())
    }
}

impl FlashDriver for SimFlash {
    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn read(&self, address: u32, out: &mut [u32]) -> FlashResult<()> {
        let start = self.geometry.word_index(address, out.len())?;
        out.copy_from_slice(&self.memory.read()[start..start + out.len()]);
        Ok(())
    }

    fn start_write(&mut self, address: u32, words: &[u32]) -> FlashResult<()> {
        self.check_start()?;
        let start = self.geometry.word_index(address, words.len())?;
        {
            let memory = self.memory.read();
            if let Some(pos) = first_conflict(&memory[start..start + words.len()], words) {
                return Err(FlashError::NotErased {
                    address: address + pos as u32 * WORD_SIZE,
                });
            }
        }
        trace!(address, len = words.len(), "sim flash write started");
        self.pending = Some(FlashOp::Write {
            address,
            words: words.to_vec(),
        });
        Ok(())
    }

    fn start_erase(&mut self, address: u32, pages: u32) -> FlashResult<()> {
        self.check_start()?;
        self.geometry.erase_range(address, pages)?;
        trace!(address, pages, "sim flash erase started");
        self.pending = Some(FlashOp::Erase { address, pages });
        Ok(())
    }

    fn poll(&mut self) -> Option<FlashResult<()>> {
        let op = self.pending.take()?;
        if let Some(budget) = self.faults.power_budget.as_mut() {
            if *budget == 0 {
                self.powered_off = true;
                return Some(Err(FlashError::PowerLost));
            }
            *budget -= 1;
        }
        if self.faults.fail_next > 0 {
            self.faults.fail_next -= 1;
            return Some(Err(FlashError::OperationFailed));
        }
        if let FlashOp::Write { address, words } = &op {
            if self.faults.tear_next > 0 {
                self.faults.tear_next -= 1;
                let torn = FlashOp::Write {
                    address: *address,
                    words: words.iter().map(|w| w | 0xFFFF_0000).collect(),
                };
                return Some(self.apply(&torn).and(Err(FlashError::OperationFailed)));
            }
        }
        Some(self.apply(&op))
    }

    fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}
