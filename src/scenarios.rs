use paging::{FaultKind, PageDirectory, PageDirectoryEntry, PageTable, PageTableEntry};
use process_manager::{Pid, ProcessError};

use crate::DefaultSimulator;

/// A translation probe and the outcome the fixture directory gives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationCase {
    pub virtual_address: u32,
    pub is_write: bool,
    pub expected: Result<u32, FaultKind>,
}

pub const TRANSLATION_CASES: [TranslationCase; 5] = [
    // PDE[0] -> PTE[1] -> frame 26 (0x1A)
    TranslationCase {
        virtual_address: 0x00001A2B,
        is_write: false,
        expected: Ok(0x0001AA2B),
    },
    TranslationCase {
        virtual_address: 0x00001A2B,
        is_write: true,
        expected: Ok(0x0001AA2B),
    },
    // PTE[2] is read-only
    TranslationCase {
        virtual_address: 0x00002048,
        is_write: true,
        expected: Err(FaultKind::ProtectionFault),
    },
    // PTE[3] is not present
    TranslationCase {
        virtual_address: 0x00003555,
        is_write: false,
        expected: Err(FaultKind::PageFault),
    },
    // PDE[2] is not present
    TranslationCase {
        virtual_address: 0x00804000,
        is_write: false,
        expected: Err(FaultKind::SegmentationFault),
    },
];

/// Directory for the plain translation demo. Its frames are not tracked
/// by any frame table.
///
/// - 0x00001xxx -> 0x0001Axxx, read/write
/// - 0x00002xxx -> 0x0008Fxxx, read-only
/// - 0x00400xxx -> 0x00033xxx, read/write
pub fn mmu_directory() -> PageDirectory {
    let mut directory = PageDirectory::init();

    let mut low = PageTable::init();
    low.set_pte(1, PageTableEntry::mapped(26, true));
    low.set_pte(2, PageTableEntry::mapped(143, false));
    directory.set_pde(0, PageDirectoryEntry::Present(Box::new(low)));

    let mut high = PageTable::init();
    high.set_pte(0, PageTableEntry::mapped(51, true));
    directory.set_pde(1, PageDirectoryEntry::Present(Box::new(high)));

    directory
}

/// Creates the initial parent and forks it once.
/// Returns the simulator with `(parent, child)`.
pub fn fork_demo() -> Result<(DefaultSimulator, Pid, Pid), ProcessError> {
    let mut simulator = DefaultSimulator::init();
    let parent = simulator.create_initial_process()?;
    let child = simulator.fork(parent)?;
    Ok((simulator, parent, child))
}

#[cfg(test)]
mod tests {
    use paging::translate;

    use super::*;

    #[test]
    fn translation_cases_hold() {
        let directory = mmu_directory();
        for case in TRANSLATION_CASES {
            let outcome = translate(&directory, case.virtual_address, case.is_write)
                .map(|pa| pa.raw())
                .map_err(|fault| fault.kind());
            assert_eq!(outcome, case.expected, "{:#010x}", case.virtual_address);
        }
    }

    #[test]
    fn fork_demo_runs() {
        let (simulator, parent, child) = fork_demo().unwrap();
        assert_eq!((parent, child), (100, 101));
        assert_eq!(simulator.frames().share_count(25), 2);
        simulator.check_share_counts().unwrap();
    }
}
