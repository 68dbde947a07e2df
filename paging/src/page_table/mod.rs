mod iter;
mod page_table_entry;

pub use iter::PageTableIterator;
pub use page_table_entry::PageTableEntry;

/// Fixed-size array of page table entries, all not present at first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTable<const ENTRIES: usize> {
    entries: Vec<PageTableEntry>,
}

impl<const ENTRIES: usize> Default for PageTable<ENTRIES> {
    fn default() -> Self {
        Self::init()
    }
}

impl<const ENTRIES: usize> PageTable<ENTRIES> {
    pub fn init() -> Self {
        Self {
            entries: vec![PageTableEntry::not_present(); ENTRIES],
        }
    }

    pub const fn len(&self) -> usize {
        ENTRIES
    }

    pub const fn is_empty(&self) -> bool {
        ENTRIES == 0
    }

    /// Panics when `index` is outside the table: a bad index means the
    /// address was split wrongly, which is a bug rather than a fault.
    pub fn lookup_pte(&self, index: usize) -> PageTableEntry {
        assert!(index < ENTRIES, "page table index {} out of range", index);
        self.entries[index]
    }

    pub fn set_pte(&mut self, index: usize, entry: PageTableEntry) {
        assert!(index < ENTRIES, "page table index {} out of range", index);
        self.entries[index] = entry;
    }

    pub fn iter_present(&self) -> PageTableIterator<'_> {
        PageTableIterator::new(&self.entries)
    }

    pub fn present_count(&self) -> usize {
        self.iter_present().count()
    }
}
