use log::{info, warn};
use memory::{FrameIndex, FrameTable};
use paging::{
    translate, Fault, PageDirectory, PageDirectoryEntry, PageTable, VirtualAddress,
};

use crate::{ForkError, Pid, Process, ProcessError, ProcessManager};

impl<const MAX_PROCESSES: usize, const NUM_PAGES: usize> ProcessManager<MAX_PROCESSES, NUM_PAGES> {
    /// Creates a child of `parent` sharing all of its frames.
    ///
    /// Every writable page of the parent becomes read-only and
    /// copy-on-write in both processes; read-only pages are shared as
    /// they are. Each shared page adds one share to its frame.
    ///
    /// All checks run before anything is touched, so a failed fork leaves
    /// the parent, the frame table and the process list unchanged.
    pub fn fork<const NUM_FRAMES: usize>(
        &mut self,
        frames: &mut FrameTable<NUM_FRAMES>,
        parent: Pid,
    ) -> Result<Pid, ForkError> {
        info!(">>> Calling fork() on parent PID {}...", parent);
        if self.is_full() {
            warn!("Error: Process list is full!");
            return Err(ForkError::ResourceExhausted);
        }
        let parent_index = self
            .position(parent)
            .ok_or(ForkError::NoSuchProcess { pid: parent })?;
        for (vpn, entry) in self.processes[parent_index].pages() {
            if let Some(frame) = entry.frame_index() {
                if !frames.frame_is_in_use(frame) {
                    warn!("PID {}: page {} maps free frame {}", parent, vpn, frame);
                    return Err(ForkError::FrameNotTracked { frame });
                }
            }
        }

        let mut child_directory = PageDirectory::init();
        let parent_directory = self.processes[parent_index].directory_mut();
        for directory_index in 0..paging::address::DIR_SIZE {
            let Some(parent_table) = parent_directory
                .lookup_pde_mut(directory_index)
                .page_table_mut()
            else {
                continue;
            };
            let mut child_table = PageTable::init();
            let present: Vec<_> = parent_table.iter_present().collect();
            for (table_index, mut entry) in present {
                let vpn =
                    VirtualAddress::from_parts(directory_index as u32, table_index as u32, 0)
                        .page_number();
                if entry.is_writable() {
                    entry.mark_copy_on_write();
                    parent_table.set_pte(table_index, entry);
                    info!("  Page {}: COW enabled (both processes set to read-only)", vpn);
                } else if entry.is_copy_on_write() {
                    info!("  Page {}: already copy-on-write, shared again", vpn);
                } else {
                    info!("  Page {}: Read-only page, directly shared", vpn);
                }
                child_table.set_pte(table_index, entry);

                if let Some(frame) = entry.frame_index() {
                    let count = frames
                        .increment_share(frame)
                        .map_err(|_| ForkError::FrameNotTracked { frame })?;
                    info!("  Frame {} share count increased to {}", frame, count);
                }
            }
            child_directory.set_pde(
                directory_index,
                PageDirectoryEntry::Present(Box::new(child_table)),
            );
        }

        let child = self.take_pid();
        self.processes
            .push(Process::with_directory(child, child_directory));
        info!("Child process (PID {}) created successfully.", child);
        Ok(child)
    }

    /// Handles a write to a copy-on-write page of `pid`.
    ///
    /// The last process still sharing a frame just gets write access back.
    /// Otherwise the page moves to a fresh frame and the old frame loses a
    /// share. Returns the frame now backing the page. A write to a page
    /// that was read-only before fork keeps its protection fault.
    pub fn resolve_cow_fault<const NUM_FRAMES: usize>(
        &mut self,
        frames: &mut FrameTable<NUM_FRAMES>,
        pid: Pid,
        vpn: u32,
    ) -> Result<FrameIndex, ProcessError> {
        Process::<NUM_PAGES>::check_page(vpn)?;
        let process = self.process_mut(pid)?;
        let address = VirtualAddress::from_page(vpn, 0);
        match translate(process.directory(), address.raw(), true) {
            Ok(physical) => return Ok(physical.frame_index()),
            Err(Fault::ProtectionFault { .. }) => {}
            Err(fault) => return Err(fault.into()),
        }

        let mut entry = process.page(vpn);
        let Some(frame) = entry.frame_index().filter(|_| entry.is_copy_on_write()) else {
            return Err(Fault::ProtectionFault {
                table_index: address.table_index(),
            }
            .into());
        };

        if frames.share_count(frame) <= 1 {
            entry.make_private(frame);
            process.directory_mut().set_page(vpn, entry)?;
            info!("PID {}: page {} is the last user of frame {}, now writable", pid, vpn, frame);
            return Ok(frame);
        }

        let copy = frames
            .allocate_any()
            .map_err(|_| ProcessError::ResourceExhausted)?;
        entry.make_private(copy);
        process.directory_mut().set_page(vpn, entry)?;
        let remaining = frames.decrement_share(frame)?;
        info!(
            "PID {}: page {} copied from frame {} to frame {} (frame {} share count now {})",
            pid, vpn, frame, copy, frame, remaining
        );
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use memory::FrameTable;
    use paging::{translate, Fault, FaultKind};
    use rand::Rng;

    use crate::{ForkError, Pid, ProcessError, ProcessManager};

    type Manager = ProcessManager<10, 16>;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Page 0 read-only on frame 10, pages 1 and 2 writable on 25 and 30.
    fn parent(frames: &mut FrameTable<64>, manager: &mut Manager) -> Pid {
        let pid = manager.create_process().unwrap();
        manager.map_page(frames, pid, 0, 10, false).unwrap();
        manager.map_page(frames, pid, 1, 25, true).unwrap();
        manager.map_page(frames, pid, 2, 30, true).unwrap();
        pid
    }

    /// Every in-use frame is referenced by exactly `share_count` present
    /// entries across the live processes.
    fn assert_share_counts(frames: &FrameTable<64>, manager: &Manager) {
        let mut counts = [0u32; 64];
        for process in manager.iter() {
            for (_, entry) in process.pages() {
                counts[entry.frame_index().unwrap() as usize] += 1;
            }
        }
        for (frame, &count) in counts.iter().enumerate() {
            assert_eq!(frames.share_count(frame as u32), count, "frame {}", frame);
            assert_eq!(frames.frame_is_in_use(frame as u32), count > 0, "frame {}", frame);
        }
    }

    #[test]
    fn fork_demotes_writable_pages() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        assert_eq!(frames.share_count(25), 1);

        let child = manager.fork(&mut frames, parent).unwrap();
        assert_eq!(child, parent + 1);

        let parent_entry = manager.get(parent).unwrap().page(1);
        let child_entry = manager.get(child).unwrap().page(1);
        assert!(!parent_entry.is_writable());
        assert!(!child_entry.is_writable());
        assert!(parent_entry.is_copy_on_write());
        assert!(child_entry.is_copy_on_write());
        assert_eq!(child_entry.frame_index(), Some(25));
        assert_eq!(frames.share_count(25), 2);
        assert_share_counts(&frames, &manager);
    }

    #[test]
    fn fork_shares_read_only_pages() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();

        let parent_entry = manager.get(parent).unwrap().page(0);
        let child_entry = manager.get(child).unwrap().page(0);
        assert!(!parent_entry.is_writable());
        assert!(!child_entry.is_writable());
        assert!(!child_entry.is_copy_on_write());
        assert_eq!(child_entry.frame_index(), Some(10));
        assert_eq!(frames.share_count(10), 2);
    }

    #[test]
    fn fork_leaves_missing_pages_missing() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();
        for vpn in 3..16 {
            assert!(!manager.get(child).unwrap().page(vpn).is_present());
        }
        let vpns: Vec<u32> = manager.get(child).unwrap().pages().map(|(vpn, _)| vpn).collect();
        assert_eq!(vpns, vec![0, 1, 2]);
    }

    #[test]
    fn fork_twice() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let first = manager.fork(&mut frames, parent).unwrap();
        let second = manager.fork(&mut frames, parent).unwrap();
        assert_ne!(first, second);
        for frame in [10, 25, 30] {
            assert_eq!(frames.share_count(frame), 3);
        }
        assert!(!std::ptr::eq(
            manager.get(first).unwrap().directory(),
            manager.get(second).unwrap().directory()
        ));
        assert_share_counts(&frames, &manager);
    }

    #[test]
    fn translation_after_fork() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();
        for pid in [parent, child] {
            let directory = manager.get(pid).unwrap().directory();
            assert_eq!(translate(directory, 0x1004, false).unwrap().raw(), (25 << 12) | 4);
            assert_eq!(
                translate(directory, 0x1004, true).unwrap_err().kind(),
                FaultKind::ProtectionFault
            );
        }
    }

    #[test]
    fn fork_when_full_changes_nothing() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = ProcessManager::<1, 16>::init();
        let parent = manager.create_process().unwrap();
        manager.map_page(&mut frames, parent, 1, 25, true).unwrap();
        let before = manager.get(parent).unwrap().clone();

        assert_eq!(
            manager.fork(&mut frames, parent),
            Err(ForkError::ResourceExhausted)
        );
        assert_eq!(manager.get(parent).unwrap(), &before);
        assert!(manager.get(parent).unwrap().page(1).is_writable());
        assert_eq!(frames.share_count(25), 1);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn fork_unknown_parent() {
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        assert_eq!(
            manager.fork(&mut frames, 42),
            Err(ForkError::NoSuchProcess { pid: 42 })
        );
        // A failed fork does not burn a pid.
        assert_eq!(manager.create_process(), Ok(100));
    }

    #[test]
    fn fork_with_untracked_frame_changes_nothing() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        // Frame 30 is freed behind the page table's back.
        frames.decrement_share(30).unwrap();
        assert_eq!(
            manager.fork(&mut frames, parent),
            Err(ForkError::FrameNotTracked { frame: 30 })
        );
        assert!(manager.get(parent).unwrap().page(1).is_writable());
        assert_eq!(frames.share_count(25), 1);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn cow_write_copies_frame() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();

        let copy = manager.resolve_cow_fault(&mut frames, child, 1).unwrap();
        assert_ne!(copy, 25);
        assert_eq!(frames.share_count(25), 1);
        assert_eq!(frames.share_count(copy), 1);

        let child_entry = manager.get(child).unwrap().page(1);
        assert!(child_entry.is_writable());
        assert_eq!(child_entry.frame_index(), Some(copy));
        let parent_entry = manager.get(parent).unwrap().page(1);
        assert!(!parent_entry.is_writable());
        assert_eq!(parent_entry.frame_index(), Some(25));

        // The parent is now the only user of frame 25 and keeps it.
        assert_eq!(manager.resolve_cow_fault(&mut frames, parent, 1), Ok(25));
        assert!(manager.get(parent).unwrap().page(1).is_writable());
        assert_share_counts(&frames, &manager);
    }

    #[test]
    fn cow_on_read_only_page_faults() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();
        assert_eq!(
            manager.resolve_cow_fault(&mut frames, child, 0),
            Err(ProcessError::Fault(Fault::ProtectionFault { table_index: 0 }))
        );
        assert_eq!(
            manager.resolve_cow_fault(&mut frames, child, 5),
            Err(ProcessError::Fault(Fault::PageFault { table_index: 5 }))
        );
        assert_eq!(frames.share_count(10), 2);
    }

    #[test]
    fn cow_without_free_frames() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();
        while frames.allocate_any().is_ok() {}
        assert_eq!(
            manager.resolve_cow_fault(&mut frames, child, 2),
            Err(ProcessError::ResourceExhausted)
        );
        assert!(!manager.get(child).unwrap().page(2).is_writable());
        assert_eq!(frames.share_count(30), 2);
    }

    #[test]
    fn exit_after_fork() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        let parent = parent(&mut frames, &mut manager);
        let child = manager.fork(&mut frames, parent).unwrap();
        assert_eq!(manager.exit(&mut frames, child), Ok(0));
        for frame in [10, 25, 30] {
            assert_eq!(frames.share_count(frame), 1);
        }
        assert_eq!(manager.exit(&mut frames, parent), Ok(3));
        assert_eq!(frames.frames_in_use(), 0);
    }

    #[test]
    fn random_fork_write_exit() {
        init();
        let mut frames = FrameTable::<64>::init();
        let mut manager = Manager::init();
        parent(&mut frames, &mut manager);
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let pids = manager.pids();
            if pids.is_empty() {
                break;
            }
            let pid = pids[rng.gen_range(0..pids.len())];
            match rng.gen_range(0..3) {
                0 => {
                    let _ = manager.fork(&mut frames, pid);
                }
                1 => {
                    let _ = manager.resolve_cow_fault(&mut frames, pid, rng.gen_range(0..4));
                }
                _ => {
                    if pids.len() > 1 {
                        manager.exit(&mut frames, pid).unwrap();
                    }
                }
            }
            assert_share_counts(&frames, &manager);
        }
    }
}
