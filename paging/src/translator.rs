use std::fmt;

use log::{info, warn};
use thiserror::Error;

use crate::address::{PhysicalAddress, VirtualAddress};
use crate::page_directory::PageDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    SegmentationFault,
    PageFault,
    ProtectionFault,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::SegmentationFault => "Segmentation Fault",
            FaultKind::PageFault => "Page Fault",
            FaultKind::ProtectionFault => "Protection Fault",
        };
        f.write_str(name)
    }
}

/// Why a translation stopped. Each variant carries the index of the
/// entry that failed the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("page directory entry {directory_index} not present (Segmentation Fault)")]
    SegmentationFault { directory_index: u32 },
    #[error("page table entry {table_index} not present (Page Fault)")]
    PageFault { table_index: u32 },
    #[error("write attempt on read-only page table entry {table_index} (Protection Fault)")]
    ProtectionFault { table_index: u32 },
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::SegmentationFault { .. } => FaultKind::SegmentationFault,
            Fault::PageFault { .. } => FaultKind::PageFault,
            Fault::ProtectionFault { .. } => FaultKind::ProtectionFault,
        }
    }

    pub fn faulting_index(&self) -> u32 {
        match *self {
            Fault::SegmentationFault { directory_index } => directory_index,
            Fault::PageFault { table_index } | Fault::ProtectionFault { table_index } => {
                table_index
            }
        }
    }
}

/// Read-only view of a page directory that answers translation queries.
///
/// The walk checks, in order: directory entry present, table entry
/// present, write permission. Nothing is mutated along the way.
#[derive(Debug, Clone, Copy)]
pub struct AddressTranslator<'a> {
    directory: &'a PageDirectory,
}

impl<'a> AddressTranslator<'a> {
    pub fn new(directory: &'a PageDirectory) -> Self {
        Self { directory }
    }

    pub fn translate(
        &self,
        virtual_address: u32,
        is_write: bool,
    ) -> Result<PhysicalAddress, Fault> {
        let address = VirtualAddress::new(virtual_address);
        let directory_index = address.directory_index();
        let table_index = address.table_index();
        let offset = address.offset();
        info!(
            "Translating Virtual Address: {} ({} access)",
            address,
            if is_write { "WRITE" } else { "READ" }
        );
        info!(
            " -> Page Dir Index: {0} ({0:#X}), Page Table Index: {1} ({1:#X}), Offset: {2} ({2:#X})",
            directory_index, table_index, offset
        );

        info!("  [*] Checking Page Directory Entry {}...", directory_index);
        let table = match self
            .directory
            .lookup_pde(directory_index as usize)
            .page_table()
        {
            Some(table) => table,
            None => {
                let fault = Fault::SegmentationFault { directory_index };
                warn!("  [!] FAULT: {}", fault);
                return Err(fault);
            }
        };

        info!("  [*] Checking Page Table Entry {}...", table_index);
        let entry = table.lookup_pte(table_index as usize);
        let frame_index = match entry.frame_index() {
            Some(frame_index) => frame_index,
            None => {
                let fault = Fault::PageFault { table_index };
                warn!("  [!] FAULT: {}", fault);
                return Err(fault);
            }
        };
        info!("      -> PTE is present. Frame number: {0} ({0:#X})", frame_index);

        info!("  [*] Checking access permissions...");
        if is_write && !entry.is_writable() {
            let fault = Fault::ProtectionFault { table_index };
            warn!("  [!] FAULT: {}", fault);
            return Err(fault);
        }

        let physical_address = PhysicalAddress::new(frame_index, offset);
        info!(
            "  [SUCCESS] Virtual Address {}  =>  Physical Address {}",
            address, physical_address
        );
        Ok(physical_address)
    }
}

pub fn translate(
    directory: &PageDirectory,
    virtual_address: u32,
    is_write: bool,
) -> Result<PhysicalAddress, Fault> {
    AddressTranslator::new(directory).translate(virtual_address, is_write)
}
