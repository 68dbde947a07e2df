use log::debug;
use memory::FrameIndex;
use thiserror::Error;

use crate::address::{VirtualAddress, DIR_SIZE, MAX_PAGES, TABLE_SIZE};
use crate::page_table::{PageTable, PageTableEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("virtual page {vpn} is outside the address space")]
    PageOutOfRange { vpn: u32 },
}

/// A directory slot. A present slot owns its page table, so a missing
/// table can never be reached through a present entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageDirectoryEntry {
    #[default]
    NotPresent,
    Present(Box<PageTable<TABLE_SIZE>>),
}

impl PageDirectoryEntry {
    pub fn with_empty_table() -> Self {
        PageDirectoryEntry::Present(Box::new(PageTable::init()))
    }

    pub fn is_present(&self) -> bool {
        matches!(self, PageDirectoryEntry::Present(_))
    }

    pub fn page_table(&self) -> Option<&PageTable<TABLE_SIZE>> {
        match self {
            PageDirectoryEntry::Present(table) => Some(table),
            PageDirectoryEntry::NotPresent => None,
        }
    }

    pub fn page_table_mut(&mut self) -> Option<&mut PageTable<TABLE_SIZE>> {
        match self {
            PageDirectoryEntry::Present(table) => Some(table),
            PageDirectoryEntry::NotPresent => None,
        }
    }
}

/// Top level of the two-level hierarchy: `DIR_SIZE` slots, each mapping
/// 4 MiB of virtual space through one page table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDirectory {
    entries: Vec<PageDirectoryEntry>,
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::init()
    }
}

fn split_page_number(vpn: u32) -> Result<(usize, usize), MapError> {
    if vpn >= MAX_PAGES {
        return Err(MapError::PageOutOfRange { vpn });
    }
    let address = VirtualAddress::from_page(vpn, 0);
    Ok((
        address.directory_index() as usize,
        address.table_index() as usize,
    ))
}

impl PageDirectory {
    pub fn init() -> Self {
        let mut entries = Vec::with_capacity(DIR_SIZE);
        entries.resize_with(DIR_SIZE, PageDirectoryEntry::default);
        Self { entries }
    }

    /// Panics when `index` is outside the directory.
    pub fn lookup_pde(&self, index: usize) -> &PageDirectoryEntry {
        assert!(index < DIR_SIZE, "page directory index {} out of range", index);
        &self.entries[index]
    }

    pub fn lookup_pde_mut(&mut self, index: usize) -> &mut PageDirectoryEntry {
        assert!(index < DIR_SIZE, "page directory index {} out of range", index);
        &mut self.entries[index]
    }

    /// Returns the entry previously held by the slot.
    pub fn set_pde(&mut self, index: usize, entry: PageDirectoryEntry) -> PageDirectoryEntry {
        assert!(index < DIR_SIZE, "page directory index {} out of range", index);
        std::mem::replace(&mut self.entries[index], entry)
    }

    /// Entry for virtual page `vpn`; not present when its table is missing.
    pub fn lookup_page(&self, vpn: u32) -> Result<PageTableEntry, MapError> {
        let (directory_index, table_index) = split_page_number(vpn)?;
        Ok(self.entries[directory_index]
            .page_table()
            .map_or(PageTableEntry::not_present(), |table| {
                table.lookup_pte(table_index)
            }))
    }

    /// Stores `entry` for page `vpn`, creating the page table on demand.
    /// Returns the entry that was there before.
    pub fn set_page(&mut self, vpn: u32, entry: PageTableEntry) -> Result<PageTableEntry, MapError> {
        let (directory_index, table_index) = split_page_number(vpn)?;
        let slot = &mut self.entries[directory_index];
        let mut table = match std::mem::take(slot) {
            PageDirectoryEntry::Present(table) => table,
            PageDirectoryEntry::NotPresent if !entry.is_present() => {
                return Ok(PageTableEntry::not_present());
            }
            PageDirectoryEntry::NotPresent => {
                debug!("Creating page table for directory entry {}", directory_index);
                Box::new(PageTable::init())
            }
        };
        let previous = table.lookup_pte(table_index);
        table.set_pte(table_index, entry);
        *slot = PageDirectoryEntry::Present(table);
        Ok(previous)
    }

    pub fn map(&mut self, vpn: u32, frame_index: FrameIndex, writable: bool) -> Result<PageTableEntry, MapError> {
        self.set_page(vpn, PageTableEntry::mapped(frame_index, writable))
    }

    /// Clears page `vpn`, returning the old entry. Its table stays allocated.
    pub fn unmap(&mut self, vpn: u32) -> Result<PageTableEntry, MapError> {
        self.set_page(vpn, PageTableEntry::not_present())
    }

    /// `(vpn, entry)` for every present page, in ascending page order.
    pub fn pages(&self) -> impl Iterator<Item = (u32, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(directory_index, slot)| {
                slot.page_table().map(|table| (directory_index, table))
            })
            .flat_map(|(directory_index, table)| {
                table.iter_present().map(move |(table_index, entry)| {
                    let address =
                        VirtualAddress::from_parts(directory_index as u32, table_index as u32, 0);
                    (address.page_number(), entry)
                })
            })
    }

    pub fn present_tables(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_present()).count()
    }
}
