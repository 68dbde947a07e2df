use std::fmt;

use memory::FrameIndex;

pub const DIR_BITS: u32 = 10;
pub const TABLE_BITS: u32 = 10;
pub const OFFSET_BITS: u32 = 12;

pub const DIR_SIZE: usize = 1 << DIR_BITS;
pub const TABLE_SIZE: usize = 1 << TABLE_BITS;
pub const PAGE_SIZE: usize = 1 << OFFSET_BITS;

/// Number of virtual pages one directory can describe.
pub const MAX_PAGES: u32 = 1 << (DIR_BITS + TABLE_BITS);

const DIR_SHIFT: u32 = OFFSET_BITS + TABLE_BITS;
const TABLE_SHIFT: u32 = OFFSET_BITS;
const DIR_MASK: u32 = (1 << DIR_BITS) - 1;
const TABLE_MASK: u32 = (1 << TABLE_BITS) - 1;
const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;

/// | directory index: 10 | table index: 10 | offset: 12 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    pub const fn new(raw: u32) -> Self {
        VirtualAddress(raw)
    }

    /// Out-of-width components are truncated to their field.
    pub const fn from_parts(directory_index: u32, table_index: u32, offset: u32) -> Self {
        VirtualAddress(
            ((directory_index & DIR_MASK) << DIR_SHIFT)
                | ((table_index & TABLE_MASK) << TABLE_SHIFT)
                | (offset & OFFSET_MASK),
        )
    }

    /// Address of byte `offset` inside virtual page `page_number`.
    pub const fn from_page(page_number: u32, offset: u32) -> Self {
        VirtualAddress((page_number << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn directory_index(&self) -> u32 {
        (self.0 >> DIR_SHIFT) & DIR_MASK
    }

    pub const fn table_index(&self) -> u32 {
        (self.0 >> TABLE_SHIFT) & TABLE_MASK
    }

    pub const fn offset(&self) -> u32 {
        self.0 & OFFSET_MASK
    }

    /// Directory and table index taken together.
    pub const fn page_number(&self) -> u32 {
        self.0 >> OFFSET_BITS
    }
}

impl From<u32> for VirtualAddress {
    fn from(raw: u32) -> Self {
        VirtualAddress::new(raw)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    pub const fn new(frame_index: FrameIndex, offset: u32) -> Self {
        PhysicalAddress((frame_index << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn frame_index(&self) -> FrameIndex {
        self.0 >> OFFSET_BITS
    }

    pub const fn offset(&self) -> u32 {
        self.0 & OFFSET_MASK
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
