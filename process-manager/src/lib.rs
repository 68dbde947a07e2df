//! Live processes and the copy-on-write bookkeeping between them.
//!
//! Processes own their page directories. Physical frames are never owned
//! by a process: the [`FrameTable`] keeps one share per present mapping,
//! and every operation here keeps that count in step with the tables.

mod fork;
mod process;

use log::{info, warn};
use memory::{FrameError, FrameIndex, FrameTable};
use paging::{Fault, MapError, PageTableEntry};
use thiserror::Error;

pub use process::{Pid, Process, ProcessDump};

pub const FIRST_PID: Pid = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkError {
    #[error("process table is full")]
    ResourceExhausted,
    #[error("no process with pid {pid}")]
    NoSuchProcess { pid: Pid },
    #[error("page maps frame {frame}, which is not in use")]
    FrameNotTracked { frame: FrameIndex },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("process table or frame table is full")]
    ResourceExhausted,
    #[error("no process with pid {pid}")]
    NoSuchProcess { pid: Pid },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error(transparent)]
    Fork(#[from] ForkError),
}

/// The process list. At most `MAX_PROCESSES` processes are live at once,
/// each with `NUM_PAGES` virtual pages.
#[derive(Debug, Clone)]
pub struct ProcessManager<const MAX_PROCESSES: usize, const NUM_PAGES: usize> {
    processes: Vec<Process<NUM_PAGES>>,
    next_pid: Pid,
}

impl<const MAX_PROCESSES: usize, const NUM_PAGES: usize> Default
    for ProcessManager<MAX_PROCESSES, NUM_PAGES>
{
    fn default() -> Self {
        Self::init()
    }
}

impl<const MAX_PROCESSES: usize, const NUM_PAGES: usize> ProcessManager<MAX_PROCESSES, NUM_PAGES> {
    pub fn init() -> Self {
        Self {
            processes: Vec::with_capacity(MAX_PROCESSES),
            next_pid: FIRST_PID,
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.processes.len() >= MAX_PROCESSES
    }

    pub fn get(&self, pid: Pid) -> Option<&Process<NUM_PAGES>> {
        self.processes.iter().find(|process| process.pid() == pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process<NUM_PAGES>> {
        self.processes.iter()
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.processes.iter().map(Process::pid).collect()
    }

    fn position(&self, pid: Pid) -> Option<usize> {
        self.processes.iter().position(|process| process.pid() == pid)
    }

    fn process_mut(&mut self, pid: Pid) -> Result<&mut Process<NUM_PAGES>, ProcessError> {
        self.processes
            .iter_mut()
            .find(|process| process.pid() == pid)
            .ok_or(ProcessError::NoSuchProcess { pid })
    }

    /// Takes the next pid. Only called once the new process is certain
    /// to be registered, so failed attempts never burn a pid.
    fn take_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    /// Registers a process with an empty address space.
    pub fn create_process(&mut self) -> Result<Pid, ProcessError> {
        if self.is_full() {
            warn!("Error: Process list is full!");
            return Err(ProcessError::ResourceExhausted);
        }
        let pid = self.take_pid();
        self.processes.push(Process::new(pid));
        info!("Process (PID {}) created.", pid);
        Ok(pid)
    }

    /// Maps page `vpn` of `pid` to the free frame `frame`, claiming it.
    /// A mapping already at `vpn` is replaced and its frame share dropped.
    pub fn map_page<const NUM_FRAMES: usize>(
        &mut self,
        frames: &mut FrameTable<NUM_FRAMES>,
        pid: Pid,
        vpn: u32,
        frame: FrameIndex,
        writable: bool,
    ) -> Result<(), ProcessError> {
        Process::<NUM_PAGES>::check_page(vpn)?;
        let process = self.process_mut(pid)?;
        frames.allocate(frame)?;
        let previous = match process
            .directory_mut()
            .set_page(vpn, PageTableEntry::mapped(frame, writable))
        {
            Ok(previous) => previous,
            Err(err) => {
                frames.decrement_share(frame)?;
                return Err(err.into());
            }
        };
        info!(
            "PID {}: page {} -> frame {} ({})",
            pid,
            vpn,
            frame,
            if writable { "writable" } else { "read-only" }
        );
        if let Some(old) = previous.frame_index() {
            frames.decrement_share(old)?;
        }
        Ok(())
    }

    /// Like [`map_page`](Self::map_page) with the lowest free frame.
    pub fn map_new_page<const NUM_FRAMES: usize>(
        &mut self,
        frames: &mut FrameTable<NUM_FRAMES>,
        pid: Pid,
        vpn: u32,
        writable: bool,
    ) -> Result<FrameIndex, ProcessError> {
        let frame = frames.first_free().ok_or(ProcessError::ResourceExhausted)?;
        self.map_page(frames, pid, vpn, frame, writable)?;
        Ok(frame)
    }

    /// Tears down `pid`, dropping one share of every frame it mapped.
    /// Returns how many frames became free.
    pub fn exit<const NUM_FRAMES: usize>(
        &mut self,
        frames: &mut FrameTable<NUM_FRAMES>,
        pid: Pid,
    ) -> Result<usize, ProcessError> {
        let index = self
            .position(pid)
            .ok_or(ProcessError::NoSuchProcess { pid })?;
        let process = self.processes.remove(index);
        let mut released = 0;
        for (vpn, entry) in process.pages() {
            let Some(frame) = entry.frame_index() else {
                continue;
            };
            match frames.decrement_share(frame) {
                Ok(0) => released += 1,
                Ok(_) => {}
                Err(err) => warn!("PID {}: page {} left untracked frame: {}", pid, vpn, err),
            }
        }
        info!("Process (PID {}) exited, {} frames released.", pid, released);
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use memory::{FrameError, FrameTable};
    use paging::MapError;

    use super::*;

    #[test]
    fn create_assigns_increasing_pids() {
        let mut manager = ProcessManager::<10, 16>::init();
        assert_eq!(manager.create_process(), Ok(100));
        assert_eq!(manager.create_process(), Ok(101));
        assert_eq!(manager.pids(), vec![100, 101]);
    }

    #[test]
    fn create_when_full() {
        let mut manager = ProcessManager::<2, 16>::init();
        manager.create_process().unwrap();
        manager.create_process().unwrap();
        assert!(manager.is_full());
        assert_eq!(manager.create_process(), Err(ProcessError::ResourceExhausted));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn map_page_claims_frame() {
        let mut frames = FrameTable::<64>::init();
        let mut manager = ProcessManager::<10, 16>::init();
        let pid = manager.create_process().unwrap();
        manager.map_page(&mut frames, pid, 1, 25, true).unwrap();
        assert_eq!(frames.share_count(25), 1);
        let entry = manager.get(pid).unwrap().page(1);
        assert!(entry.is_writable());
        assert_eq!(entry.frame_index(), Some(25));
    }

    #[test]
    fn map_page_rejects_bad_input() {
        let mut frames = FrameTable::<64>::init();
        let mut manager = ProcessManager::<10, 16>::init();
        let pid = manager.create_process().unwrap();
        manager.map_page(&mut frames, pid, 0, 10, false).unwrap();
        assert_eq!(
            manager.map_page(&mut frames, pid, 1, 10, true),
            Err(ProcessError::Frame(FrameError::AlreadyInUse { index: 10 }))
        );
        assert_eq!(
            manager.map_page(&mut frames, pid, 16, 11, true),
            Err(ProcessError::Map(MapError::PageOutOfRange { vpn: 16 }))
        );
        assert_eq!(
            manager.map_page(&mut frames, 7, 1, 11, true),
            Err(ProcessError::NoSuchProcess { pid: 7 })
        );
        assert!(!frames.frame_is_in_use(11));
        assert!(!manager.get(pid).unwrap().page(1).is_present());
    }

    #[test]
    fn remap_releases_old_frame() {
        let mut frames = FrameTable::<64>::init();
        let mut manager = ProcessManager::<10, 16>::init();
        let pid = manager.create_process().unwrap();
        manager.map_page(&mut frames, pid, 3, 5, true).unwrap();
        manager.map_page(&mut frames, pid, 3, 6, true).unwrap();
        assert!(!frames.frame_is_in_use(5));
        assert_eq!(frames.share_count(6), 1);
    }

    #[test]
    fn map_new_page_uses_lowest_free_frame() {
        let mut frames = FrameTable::<4>::init();
        let mut manager = ProcessManager::<10, 16>::init();
        let pid = manager.create_process().unwrap();
        frames.allocate(0).unwrap();
        assert_eq!(manager.map_new_page(&mut frames, pid, 0, true), Ok(1));
        assert_eq!(manager.map_new_page(&mut frames, pid, 1, true), Ok(2));
        assert_eq!(manager.map_new_page(&mut frames, pid, 2, true), Ok(3));
        assert_eq!(
            manager.map_new_page(&mut frames, pid, 3, true),
            Err(ProcessError::ResourceExhausted)
        );
        assert_eq!(frames.share_count(1), 1);
    }

    #[test]
    fn exit_releases_frames() {
        let mut frames = FrameTable::<64>::init();
        let mut manager = ProcessManager::<10, 16>::init();
        let pid = manager.create_process().unwrap();
        manager.map_page(&mut frames, pid, 0, 10, false).unwrap();
        manager.map_page(&mut frames, pid, 1, 25, true).unwrap();
        assert_eq!(manager.exit(&mut frames, pid), Ok(2));
        assert!(manager.is_empty());
        assert_eq!(frames.frames_in_use(), 0);
        assert_eq!(
            manager.exit(&mut frames, pid),
            Err(ProcessError::NoSuchProcess { pid })
        );
    }
}
