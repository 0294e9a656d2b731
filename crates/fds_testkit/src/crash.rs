//! Power-loss testing for the record store.
//!
//! The harness replays a fixed operation sequence on simulated flash and
//! cuts power after a chosen number of completed flash operations. The
//! image left behind is mounted again and checked against the model.
//!
//! ## Checks
//!
//! 1. **Mount** - the image mounts without error
//! 2. **Durability** - every acknowledged record reads back intact
//! 3. **Integrity** - every visible record was written whole
//! 4. **Liveness** - the remounted store accepts a new record
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fds_testkit::crash::CrashHarness;
//!
//! let harness = CrashHarness::new(64, ops);
//! for report in harness.run_all() {
//!     assert!(report.passed(), "{}", report.to_json());
//! }
//! ```

use crate::fixtures::{test_config, test_geometry, TestStore};
use crate::generators::Op;
use crate::model::Model;
use fds_core::{MountDecision, RecordKey, StoreError};
use fds_flash::SimFlash;
use serde::Serialize;

/// Outcome of one power-loss run.
#[derive(Debug, Clone, Serialize)]
pub struct CrashReport {
    /// Flash operations completed before power was cut.
    pub budget: u64,
    /// Whether power was actually lost during the run.
    pub power_lost: bool,
    /// Decision taken by the remount.
    pub decision: Option<MountDecision>,
    /// Acknowledged records verified after remount.
    pub records_checked: usize,
    /// Records visible after remount.
    pub records_visible: usize,
    /// First failed check.
    pub error: Option<String>,
}

impl CrashReport {
    fn new(budget: u64) -> Self {
        Self {
            budget,
            power_lost: false,
            decision: None,
            records_checked: 0,
            records_visible: 0,
            error: None,
        }
    }

    /// Whether every check passed.
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// Renders the report for assertion messages.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| e.to_string())
    }
}

/// Replays operations with power cut at every possible point.
#[derive(Debug, Clone)]
pub struct CrashHarness {
    page_words: u32,
    ops: Vec<Op>,
}

impl CrashHarness {
    /// Creates a harness for `ops` on three pages of `page_words` words.
    pub fn new(page_words: u32, ops: Vec<Op>) -> Self {
        Self { page_words, ops }
    }

    fn session(&self, flash: SimFlash) -> (TestStore, Model) {
        let store = TestStore::unmounted(flash, test_config(self.page_words));
        let mut model = Model::new();
        if store.mount().is_ok() {
            for op in &self.ops {
                if store.with_flash(SimFlash::is_powered_off) {
                    break;
                }
                model.apply(&store, op);
            }
        }
        (store, model)
    }

    /// Number of flash operations a run without power loss performs,
    /// mount included.
    pub fn operation_count(&self) -> u64 {
        let (store, _) = self.session(SimFlash::new(test_geometry(self.page_words)));
        store.with_flash(|f| f.write_count() + f.erase_operations())
    }

    /// Runs the sequence with power cut after `budget` flash operations.
    pub fn run_with_budget(&self, budget: u64) -> CrashReport {
        let mut report = CrashReport::new(budget);
        let mut flash = SimFlash::new(test_geometry(self.page_words));
        flash.cut_power_after(budget);

        let (store, model) = self.session(flash);
        report.power_lost = store.with_flash(SimFlash::is_powered_off);

        let (store, decision) = store.remount();
        match decision {
            Ok(decision) => report.decision = Some(decision),
            Err(err) => {
                report.error = Some(format!("remount failed: {err}"));
                return report;
            }
        }

        if let Err(err) = check(&store, &model, &mut report) {
            report.error = Some(err);
        }
        report
    }

    /// Runs the sequence once for every possible power-loss point.
    pub fn run_all(&self) -> Vec<CrashReport> {
        (0..=self.operation_count())
            .map(|budget| self.run_with_budget(budget))
            .collect()
    }
}

fn check(store: &TestStore, model: &Model, report: &mut CrashReport) -> Result<(), String> {
    report.records_checked = model.verify_live(store)?;
    report.records_visible = model.verify_visible(store)?;

    let key = RecordKey::new(0x7F, 0x7F);
    match store.write_words(key, &[0xC0FF_EE00]) {
        Ok(desc) => {
            let data = store
                .read(&desc)
                .map_err(|e| format!("new record unreadable: {e}"))?;
            if data != 0xC0FF_EE00u32.to_le_bytes() {
                return Err("new record content differs".to_string());
            }
            Ok(())
        }
        // Acceptable when live data fills the flash.
        Err(StoreError::NoSpaceInFlash) => Ok(()),
        Err(err) => Err(format!("write after remount failed: {err}")),
    }
}
