use std::collections::HashMap;

use log::info;
use memory::{FrameIndex, FrameTable};
use paging::{translate, Fault, PhysicalAddress, VirtualAddress};
use process_manager::{ForkError, Pid, Process, ProcessDump, ProcessError, ProcessManager};
use thiserror::Error;

/// A frame whose bookkeeping disagrees with the page tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("frame {frame}: share count {share_count}, but {mappings} present mappings")]
pub struct ShareCountMismatch {
    pub frame: FrameIndex,
    pub share_count: u32,
    pub mappings: u32,
}

/// All simulator state: the frame table and the live processes.
/// Nothing is global; every operation goes through this context.
#[derive(Debug, Clone)]
pub struct Simulator<const NUM_FRAMES: usize, const NUM_PAGES: usize, const MAX_PROCESSES: usize> {
    frames: FrameTable<NUM_FRAMES>,
    processes: ProcessManager<MAX_PROCESSES, NUM_PAGES>,
}

impl<const NUM_FRAMES: usize, const NUM_PAGES: usize, const MAX_PROCESSES: usize> Default
    for Simulator<NUM_FRAMES, NUM_PAGES, MAX_PROCESSES>
{
    fn default() -> Self {
        Self::init()
    }
}

impl<const NUM_FRAMES: usize, const NUM_PAGES: usize, const MAX_PROCESSES: usize>
    Simulator<NUM_FRAMES, NUM_PAGES, MAX_PROCESSES>
{
    pub fn init() -> Self {
        info!("Simulation environment initialized.");
        Self {
            frames: FrameTable::init(),
            processes: ProcessManager::init(),
        }
    }

    pub fn frames(&self) -> &FrameTable<NUM_FRAMES> {
        &self.frames
    }

    pub fn processes(&self) -> &ProcessManager<MAX_PROCESSES, NUM_PAGES> {
        &self.processes
    }

    pub fn process(&self, pid: Pid) -> Option<&Process<NUM_PAGES>> {
        self.processes.get(pid)
    }

    pub fn dump(&self, pid: Pid) -> Option<ProcessDump<'_, NUM_PAGES, NUM_FRAMES>> {
        self.process(pid).map(|process| process.dump(&self.frames))
    }

    pub fn create_process(&mut self) -> Result<Pid, ProcessError> {
        self.processes.create_process()
    }

    /// Parent with a read-only code page (page 0, frame 10) and two
    /// writable pages (page 1 on frame 25, page 2 on frame 30).
    pub fn create_initial_process(&mut self) -> Result<Pid, ProcessError> {
        let pid = self.processes.create_process()?;
        let layout = [(0, 10, false), (1, 25, true), (2, 30, true)];
        for (vpn, frame, writable) in layout {
            if let Err(err) = self.map_page(pid, vpn, frame, writable) {
                self.processes.exit(&mut self.frames, pid)?;
                return Err(err);
            }
        }
        info!("Initial parent process (PID {}) created.", pid);
        Ok(pid)
    }

    pub fn map_page(
        &mut self,
        pid: Pid,
        vpn: u32,
        frame: FrameIndex,
        writable: bool,
    ) -> Result<(), ProcessError> {
        self.processes
            .map_page(&mut self.frames, pid, vpn, frame, writable)
    }

    pub fn map_new_page(
        &mut self,
        pid: Pid,
        vpn: u32,
        writable: bool,
    ) -> Result<FrameIndex, ProcessError> {
        self.processes
            .map_new_page(&mut self.frames, pid, vpn, writable)
    }

    pub fn fork(&mut self, parent: Pid) -> Result<Pid, ForkError> {
        self.processes.fork(&mut self.frames, parent)
    }

    pub fn exit(&mut self, pid: Pid) -> Result<usize, ProcessError> {
        self.processes.exit(&mut self.frames, pid)
    }

    /// Walks the address space of `pid`. Pure query.
    pub fn translate(
        &self,
        pid: Pid,
        virtual_address: u32,
        is_write: bool,
    ) -> Result<PhysicalAddress, ProcessError> {
        let process = self
            .processes
            .get(pid)
            .ok_or(ProcessError::NoSuchProcess { pid })?;
        Ok(translate(process.directory(), virtual_address, is_write)?)
    }

    /// A write access: a protection fault on a copy-on-write page is
    /// resolved once and the access retried.
    pub fn write(&mut self, pid: Pid, virtual_address: u32) -> Result<PhysicalAddress, ProcessError> {
        match self.translate(pid, virtual_address, true) {
            Err(ProcessError::Fault(Fault::ProtectionFault { .. })) => {
                let vpn = VirtualAddress::new(virtual_address).page_number();
                self.processes
                    .resolve_cow_fault(&mut self.frames, pid, vpn)?;
                self.translate(pid, virtual_address, true)
            }
            other => other,
        }
    }

    /// Recounts the present mappings of every frame across all live
    /// processes and compares them with the frame table.
    pub fn check_share_counts(&self) -> Result<(), ShareCountMismatch> {
        let mut mappings: HashMap<FrameIndex, u32> = HashMap::new();
        for process in self.processes.iter() {
            for (_, entry) in process.pages() {
                if let Some(frame) = entry.frame_index() {
                    *mappings.entry(frame).or_insert(0) += 1;
                }
            }
        }
        for (&frame, &count) in &mappings {
            if frame as usize >= NUM_FRAMES {
                return Err(ShareCountMismatch {
                    frame,
                    share_count: 0,
                    mappings: count,
                });
            }
        }
        for frame in 0..NUM_FRAMES as FrameIndex {
            let count = mappings.get(&frame).copied().unwrap_or(0);
            let share_count = self.frames.share_count(frame);
            if share_count != count || self.frames.frame_is_in_use(frame) != (count > 0) {
                return Err(ShareCountMismatch {
                    frame,
                    share_count,
                    mappings: count,
                });
            }
        }
        Ok(())
    }
}
