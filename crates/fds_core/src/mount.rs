//! Page classification and recovery planning.
//!
//! Mounting reads the tag of every virtual page, classifies it, scans data
//! pages and chooses one of the recovery actions below. The action is
//! expressed as a plan of erase and tag operations that the init command
//! executes one at a time. Every operation only moves a page forward in its
//! lifecycle, so re-running the plan after a crash at any step converges.
//!
//! | situation                              | decision           |
//! |----------------------------------------|--------------------|
//! | no valid, no swap, erased present      | `FreshInstall`     |
//! | valid present, no swap, erased present | `TagSwap`          |
//! | swap empty, erased present             | `TagValid`         |
//! | swap empty, no erased                  | `AlreadyInstalled` |
//! | swap dirty, erased present             | `PromoteSwap`      |
//! | swap dirty, no erased                  | `DiscardSwap`      |
//! | anything else                          | `NoPages`          |
//!
//! When several pages carry a swap tag, the last one is kept and the others
//! are erased first; they then count as erased pages.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::page::{Page, PageKind, PageTable, SwapPage};
use crate::record::{PageTag, PAGE_TAG_WORDS};
use crate::scan::{is_erased, read_page, scan_words, PageScan};
use fds_flash::{FlashDriver, WORD_SIZE};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Recovery action chosen at mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountDecision {
    /// Blank flash: one page becomes the swap, the rest data pages.
    FreshInstall,
    /// Data pages exist but no swap: an erased page becomes the swap.
    TagSwap,
    /// Erased pages are tagged as data pages.
    TagValid,
    /// Nothing to do.
    AlreadyInstalled,
    /// An interrupted collection had finished copying: the swap becomes a data page.
    PromoteSwap,
    /// An interrupted collection had not finished: the swap is erased.
    DiscardSwap,
}

/// Role of a virtual page as found on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageRole {
    /// Every word is erased.
    Erased,
    /// Tagged as a data page.
    Data,
    /// Tagged as swap, nothing written after the tag.
    SwapEmpty,
    /// Tagged as swap with records after the tag.
    SwapDirty,
    /// Neither erased nor tagged. Never used by the store.
    Foreign,
}

/// Read-only summary of one virtual page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// Virtual page index.
    pub index: u32,
    /// Byte address of the page.
    pub address: u32,
    /// Role found on flash.
    pub role: PageRole,
    /// First free word after the last record.
    pub write_offset: u32,
    /// Valid records.
    pub valid_records: u32,
    /// Cleared or partially written records.
    pub dirty_records: u32,
    /// Words held by dirty records.
    pub dirty_words: u32,
    /// Highest record id on the page.
    pub max_id: Option<u32>,
}

/// One flash operation of a mount plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MountOp {
    /// Erase a virtual page.
    Erase { address: u32 },
    /// Write the swap tag on an erased page.
    TagSwap { address: u32 },
    /// Write the data tag on an erased page.
    TagValid { address: u32 },
    /// Rewrite the second tag word of a swap page to the data role.
    Promote { address: u32 },
}

/// Result of mounting: the page table to install and the operations
/// needed before it matches flash.
#[derive(Debug, Clone)]
pub(crate) struct MountPlan {
    pub(crate) decision: MountDecision,
    pub(crate) ops: Vec<MountOp>,
    pub(crate) table: PageTable,
    pub(crate) latest_id: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum Class {
    Erased,
    Valid(PageScan),
    Swap { dirty: bool, scan: PageScan },
    Foreign,
}

fn classify(words: &[u32]) -> Class {
    if is_erased(words) {
        return Class::Erased;
    }
    match PageTag::decode([words[0], words[1]]) {
        PageTag::Valid => Class::Valid(scan_words(words)),
        PageTag::Swap => Class::Swap {
            dirty: !is_erased(&words[PAGE_TAG_WORDS as usize..]),
            scan: scan_words(words),
        },
        PageTag::Undefined => Class::Foreign,
    }
}

fn page_address<F: FlashDriver + ?Sized>(flash: &F, config: &Config, index: u32) -> u32 {
    flash.geometry().base_address + index * config.virtual_page_words * WORD_SIZE
}

/// Classifies every virtual page without changing anything.
///
/// # Errors
///
/// Returns an error if the configuration does not match the flash geometry
/// or a read fails.
pub fn survey<F: FlashDriver + ?Sized>(flash: &F, config: &Config) -> StoreResult<Vec<PageInfo>> {
    config.validate(&flash.geometry())?;
    let mut pages = Vec::with_capacity(config.virtual_pages as usize);
    for index in 0..config.virtual_pages {
        let address = page_address(flash, config, index);
        let words = read_page(flash, address, config.virtual_page_words)?;
        let (role, scan) = match classify(&words) {
            Class::Erased => (PageRole::Erased, PageScan::default()),
            Class::Valid(scan) => (PageRole::Data, scan),
            Class::Swap { dirty: false, scan } => (PageRole::SwapEmpty, scan),
            Class::Swap { dirty: true, scan } => (PageRole::SwapDirty, scan),
            Class::Foreign => (PageRole::Foreign, PageScan::default()),
        };
        pages.push(PageInfo {
            index,
            address,
            role,
            write_offset: scan.write_offset,
            valid_records: scan.valid_records,
            dirty_records: scan.dirty_records,
            dirty_words: scan.dirty_words,
            max_id: scan.max_id,
        });
    }
    Ok(pages)
}

/// Reads every virtual page and computes the recovery plan.
pub(crate) fn plan<F: FlashDriver + ?Sized>(flash: &F, config: &Config) -> StoreResult<MountPlan> {
    let mut erased = Vec::new();
    let mut valid = Vec::new();
    let mut swaps = Vec::new();
    let mut latest_id: Option<u32> = None;

    for index in 0..config.virtual_pages {
        let address = page_address(flash, config, index);
        let words = read_page(flash, address, config.virtual_page_words)?;
        let class = classify(&words);
        debug!(index, address, ?class, "page classified");
        match class {
            Class::Erased => erased.push(address),
            Class::Valid(scan) => valid.push((address, scan)),
            Class::Swap { dirty, scan } => swaps.push((address, dirty, scan)),
            Class::Foreign => warn!(index, address, "foreign page excluded from use"),
        }
        if let Class::Valid(scan) | Class::Swap { scan, .. } = class {
            if let Some(id) = scan.max_id {
                latest_id = Some(latest_id.map_or(id, |max| max.max(id)));
            }
        }
    }

    let mut ops = Vec::new();
    let swap = swaps.pop();
    for (address, _, _) in swaps {
        warn!(address, "extra swap page erased");
        ops.push(MountOp::Erase { address });
        erased.push(address);
    }
    erased.sort_unstable();

    let usable = valid.len() + erased.len() + usize::from(swap.is_some());
    if usable < 2 {
        return Err(StoreError::NoPages);
    }

    let mut pages: Vec<Page> = valid
        .iter()
        .map(|(address, scan)| Page::new(PageKind::Valid, *address, scan.write_offset, scan.can_gc))
        .collect();

    let (decision, swap_address) = match swap {
        None => {
            if erased.is_empty() {
                return Err(StoreError::NoPages);
            }
            let address = erased.remove(0);
            ops.push(MountOp::TagSwap { address });
            let decision = if valid.is_empty() {
                MountDecision::FreshInstall
            } else {
                MountDecision::TagSwap
            };
            (decision, address)
        }
        Some((address, false, _)) => {
            let decision = if erased.is_empty() {
                MountDecision::AlreadyInstalled
            } else {
                MountDecision::TagValid
            };
            (decision, address)
        }
        Some((address, true, scan)) => {
            if erased.is_empty() {
                ops.push(MountOp::Erase { address });
                ops.push(MountOp::TagSwap { address });
                (MountDecision::DiscardSwap, address)
            } else {
                ops.push(MountOp::Promote { address });
                pages.push(Page::new(PageKind::Erased, address, scan.write_offset, scan.can_gc));
                let swap_address = erased.remove(0);
                ops.push(MountOp::TagSwap {
                    address: swap_address,
                });
                (MountDecision::PromoteSwap, swap_address)
            }
        }
    };

    for address in erased {
        ops.push(MountOp::TagValid { address });
        pages.push(Page::new(PageKind::Erased, address, PAGE_TAG_WORDS, false));
    }
    if pages.is_empty() {
        return Err(StoreError::NoPages);
    }
    pages.sort_by_key(|p| p.address);

    info!(
        ?decision,
        data_pages = pages.len(),
        swap = swap_address,
        operations = ops.len(),
        latest_id,
        "mount planned"
    );

    Ok(MountPlan {
        decision,
        ops,
        table: PageTable::new(pages, SwapPage::new(swap_address), config.virtual_page_words),
        latest_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordHeader, PAGE_TAG_VALID};
    use crate::types::{RecordId, RecordKey};
    use fds_flash::{FlashGeometry, SimFlash, ERASED_WORD};

    const PAGE_WORDS: u32 = 32;

    fn config() -> Config {
        Config::new().virtual_pages(3).virtual_page_words(PAGE_WORDS)
    }

    fn flash() -> SimFlash {
        SimFlash::new(FlashGeometry::new(0, PAGE_WORDS, 3))
    }

    fn page_base(index: u32) -> u32 {
        index * PAGE_WORDS * WORD_SIZE
    }

    fn put(flash: &mut SimFlash, address: u32, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            flash.poke(address + i as u32 * WORD_SIZE, *word).unwrap();
        }
    }

    fn put_record(flash: &mut SimFlash, page: u32, offset: u32, id: u32) {
        let header = RecordHeader::new(RecordKey::new(1, 1), 1, RecordId::new(id));
        let mut words = header.to_words().to_vec();
        words.push(0xAB);
        put(flash, page_base(page) + offset * WORD_SIZE, &words);
    }

    #[test]
    fn fresh_install() {
        let plan = plan(&flash(), &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::FreshInstall);
        assert_eq!(
            plan.ops,
            vec![
                MountOp::TagSwap { address: 0 },
                MountOp::TagValid {
                    address: page_base(1)
                },
                MountOp::TagValid {
                    address: page_base(2)
                },
            ]
        );
        assert_eq!(plan.table.swap.address, 0);
        assert_eq!(plan.table.len(), 2);
        assert_eq!(plan.latest_id, None);
    }

    #[test]
    fn already_installed() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::swap_words());
        put(&mut flash, page_base(1), &PageTag::valid_words());
        put(&mut flash, page_base(2), &PageTag::valid_words());
        put_record(&mut flash, 2, 2, 9);

        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::AlreadyInstalled);
        assert!(plan.ops.is_empty());
        assert_eq!(plan.latest_id, Some(9));
        assert_eq!(plan.table.pages[1].write_offset, 6);
        assert!(plan.table.pages.iter().all(|p| p.kind == PageKind::Valid));
    }

    #[test]
    fn tag_swap_when_missing() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::valid_words());
        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::TagSwap);
        assert_eq!(plan.table.swap.address, page_base(1));
        assert_eq!(plan.ops.len(), 2);
    }

    #[test]
    fn tag_valid_after_interrupted_install() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::swap_words());
        put(&mut flash, page_base(1), &PageTag::valid_words());
        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::TagValid);
        assert_eq!(
            plan.ops,
            vec![MountOp::TagValid {
                address: page_base(2)
            }]
        );
    }

    #[test]
    fn promote_dirty_swap_when_page_erased() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::valid_words());
        put(&mut flash, page_base(2), &PageTag::swap_words());
        put_record(&mut flash, 2, 2, 4);

        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::PromoteSwap);
        assert_eq!(
            plan.ops,
            vec![
                MountOp::Promote {
                    address: page_base(2)
                },
                MountOp::TagSwap {
                    address: page_base(1)
                },
            ]
        );
        assert_eq!(plan.table.swap.address, page_base(1));
        assert_eq!(plan.table.pages[1].address, page_base(2));
        assert_eq!(plan.table.pages[1].write_offset, 6);
        assert_eq!(plan.latest_id, Some(4));
    }

    #[test]
    fn discard_dirty_swap_when_no_page_erased() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::valid_words());
        put(&mut flash, page_base(1), &PageTag::valid_words());
        put(&mut flash, page_base(2), &PageTag::swap_words());
        put_record(&mut flash, 2, 2, 11);

        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::DiscardSwap);
        assert_eq!(
            plan.ops,
            vec![
                MountOp::Erase {
                    address: page_base(2)
                },
                MountOp::TagSwap {
                    address: page_base(2)
                },
            ]
        );
        // Ids seen on the discarded swap are never reissued.
        assert_eq!(plan.latest_id, Some(11));
    }

    #[test]
    fn extra_swaps_are_erased() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::swap_words());
        put(&mut flash, page_base(1), &PageTag::valid_words());
        put(&mut flash, page_base(2), &PageTag::swap_words());

        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::TagValid);
        assert_eq!(plan.table.swap.address, page_base(2));
        assert_eq!(
            plan.ops,
            vec![MountOp::Erase { address: 0 }, MountOp::TagValid { address: 0 }]
        );
    }

    #[test]
    fn no_pages() {
        let mut flash = flash();
        for page in 0..3 {
            put(&mut flash, page_base(page), &PageTag::valid_words());
        }
        assert_eq!(plan(&flash, &config()).unwrap_err(), StoreError::NoPages);

        let mut flash = self::flash();
        put(&mut flash, page_base(0), &[0x1234_5678]);
        put(&mut flash, page_base(1), &[0x1234_5678]);
        assert_eq!(plan(&flash, &config()).unwrap_err(), StoreError::NoPages);
    }

    #[test]
    fn foreign_pages_are_skipped() {
        let mut flash = flash();
        put(&mut flash, page_base(1), &[0x1234_5678]);
        let plan = plan(&flash, &config()).unwrap();
        assert_eq!(plan.decision, MountDecision::FreshInstall);
        assert_eq!(plan.table.len(), 1);
        assert_eq!(plan.table.pages[0].address, page_base(2));
    }

    #[test]
    fn survey_reports_roles() {
        let mut flash = flash();
        put(&mut flash, page_base(0), &PageTag::swap_words());
        put(&mut flash, page_base(1), &[0xDEAD_C0DE, PAGE_TAG_VALID]);
        put_record(&mut flash, 1, 2, 3);
        put(&mut flash, page_base(2), &[0, ERASED_WORD]);

        let pages = survey(&flash, &config()).unwrap();
        let roles: Vec<_> = pages.iter().map(|p| p.role).collect();
        assert_eq!(roles, vec![PageRole::SwapEmpty, PageRole::Data, PageRole::Foreign]);
        assert_eq!(pages[1].valid_records, 1);
        assert_eq!(pages[1].max_id, Some(3));
    }
}
