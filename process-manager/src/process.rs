use std::fmt;

use memory::FrameTable;
use paging::{MapError, PageDirectory, PageTableEntry};

pub type Pid = u32;

/// A simulated process: a pid and the address space it exclusively owns.
/// Only virtual pages below `NUM_PAGES` may be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process<const NUM_PAGES: usize> {
    pid: Pid,
    directory: PageDirectory,
}

impl<const NUM_PAGES: usize> Process<NUM_PAGES> {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            directory: PageDirectory::init(),
        }
    }

    pub(crate) fn with_directory(pid: Pid, directory: PageDirectory) -> Self {
        Self { pid, directory }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    pub(crate) fn directory_mut(&mut self) -> &mut PageDirectory {
        &mut self.directory
    }

    pub(crate) fn check_page(vpn: u32) -> Result<(), MapError> {
        if vpn as usize >= NUM_PAGES {
            return Err(MapError::PageOutOfRange { vpn });
        }
        Ok(())
    }

    /// Entry for page `vpn`; pages outside the address space read as
    /// not present.
    pub fn page(&self, vpn: u32) -> PageTableEntry {
        if Self::check_page(vpn).is_err() {
            return PageTableEntry::not_present();
        }
        self.directory
            .lookup_page(vpn)
            .unwrap_or(PageTableEntry::not_present())
    }

    pub fn pages(&self) -> impl Iterator<Item = (u32, PageTableEntry)> + '_ {
        self.directory.pages()
    }

    /// Page table listing with the share count of every mapped frame.
    pub fn dump<'a, const NUM_FRAMES: usize>(
        &'a self,
        frames: &'a FrameTable<NUM_FRAMES>,
    ) -> ProcessDump<'a, NUM_PAGES, NUM_FRAMES> {
        ProcessDump {
            process: self,
            frames,
        }
    }
}

pub struct ProcessDump<'a, const NUM_PAGES: usize, const NUM_FRAMES: usize> {
    process: &'a Process<NUM_PAGES>,
    frames: &'a FrameTable<NUM_FRAMES>,
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

impl<'a, const NUM_PAGES: usize, const NUM_FRAMES: usize> fmt::Display
    for ProcessDump<'a, NUM_PAGES, NUM_FRAMES>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Page Table for PID: {} ---", self.process.pid)?;
        writeln!(f, "V.Page | Present | Writable | P.Frame | Frame Share Count")?;
        writeln!(f, "----------------------------------------------------------")?;
        for (vpn, entry) in self.process.pages() {
            if let Some(frame) = entry.frame_index() {
                writeln!(
                    f,
                    "  {:<4} |    {:<3}  |   {:<5}  |   {:<5} | {}",
                    vpn,
                    yes_no(entry.is_present()),
                    yes_no(entry.is_writable()),
                    frame,
                    self.frames.share_count(frame)
                )?;
            }
        }
        write!(f, "----------------------------------------------------------")
    }
}
