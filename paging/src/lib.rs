//! Two-level page tables and the address walk over them.
//!
//! A 32-bit virtual address is split, most significant bits first, into a
//! page directory index, a page table index and a byte offset. Tables only
//! record which frame a page lives in; they never hold page contents.

pub mod address;
pub mod page_directory;
pub mod page_table;
pub mod translator;

pub use address::{PhysicalAddress, VirtualAddress};
pub use page_directory::{MapError, PageDirectory, PageDirectoryEntry};
pub use page_table::{PageTable, PageTableEntry};
pub use translator::{translate, AddressTranslator, Fault, FaultKind};
