use std::fmt;

use log::debug;
use thiserror::Error;

pub type FrameIndex = u32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame {index} is out of range")]
    OutOfRange { index: FrameIndex },
    #[error("frame {index} is already in use")]
    AlreadyInUse { index: FrameIndex },
    #[error("frame {index} is not in use")]
    NotInUse { index: FrameIndex },
    #[error("no free physical frame left")]
    Exhausted,
}

/// Bookkeeping for one physical frame.
/// `share_count > 0` holds exactly when `in_use` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalFrame {
    in_use: bool,
    share_count: u32,
}

impl PhysicalFrame {
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub fn share_count(&self) -> u32 {
        self.share_count
    }
}

/// Allocation state and share counts of every physical frame.
///
/// The table never touches frame contents; it only records who holds a
/// frame and how many page table entries point at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTable<const NUM_FRAMES: usize> {
    frames: Vec<PhysicalFrame>,
}

impl<const NUM_FRAMES: usize> Default for FrameTable<NUM_FRAMES> {
    fn default() -> Self {
        Self::init()
    }
}

impl<const NUM_FRAMES: usize> FrameTable<NUM_FRAMES> {
    pub fn init() -> Self {
        let mut frames = Vec::with_capacity(NUM_FRAMES);
        frames.resize(NUM_FRAMES, PhysicalFrame::default());
        Self { frames }
    }

    pub const fn capacity() -> usize {
        NUM_FRAMES
    }

    fn check_index(&self, index: FrameIndex) -> Result<usize, FrameError> {
        if index as usize >= NUM_FRAMES {
            return Err(FrameError::OutOfRange { index });
        }
        Ok(index as usize)
    }

    pub fn get(&self, index: FrameIndex) -> Option<PhysicalFrame> {
        self.frames.get(index as usize).copied()
    }

    /// Out-of-range frames are reported as not in use.
    pub fn frame_is_in_use(&self, index: FrameIndex) -> bool {
        self.get(index).map_or(false, |frame| frame.in_use)
    }

    pub fn share_count(&self, index: FrameIndex) -> u32 {
        self.get(index).map_or(0, |frame| frame.share_count)
    }

    /// Claim a specific frame with a single mapping.
    pub fn allocate(&mut self, index: FrameIndex) -> Result<(), FrameError> {
        let slot = self.check_index(index)?;
        let frame = &mut self.frames[slot];
        if frame.in_use {
            return Err(FrameError::AlreadyInUse { index });
        }
        frame.in_use = true;
        frame.share_count = 1;
        debug!("Frame {} allocated", index);
        Ok(())
    }

    pub fn first_free(&self) -> Option<FrameIndex> {
        self.frames
            .iter()
            .position(|frame| !frame.in_use)
            .map(|index| index as FrameIndex)
    }

    /// Claim the lowest numbered free frame.
    pub fn allocate_any(&mut self) -> Result<FrameIndex, FrameError> {
        let index = self.first_free().ok_or(FrameError::Exhausted)?;
        self.allocate(index)?;
        Ok(index)
    }

    pub fn increment_share(&mut self, index: FrameIndex) -> Result<u32, FrameError> {
        let slot = self.check_index(index)?;
        let frame = &mut self.frames[slot];
        if !frame.in_use {
            return Err(FrameError::NotInUse { index });
        }
        frame.share_count += 1;
        debug!("Frame {} share count is now {}", index, frame.share_count);
        Ok(frame.share_count)
    }

    /// Drop one mapping; the frame is released when the last one goes.
    pub fn decrement_share(&mut self, index: FrameIndex) -> Result<u32, FrameError> {
        let slot = self.check_index(index)?;
        let frame = &mut self.frames[slot];
        if !frame.in_use {
            return Err(FrameError::NotInUse { index });
        }
        frame.share_count -= 1;
        if frame.share_count == 0 {
            frame.in_use = false;
            debug!("Frame {} released", index);
        } else {
            debug!("Frame {} share count is now {}", index, frame.share_count);
        }
        Ok(frame.share_count)
    }

    pub fn frames_in_use(&self) -> usize {
        self.frames.iter().filter(|frame| frame.in_use).count()
    }

    /// `(index, frame)` for every frame currently in use.
    pub fn iter_in_use(&self) -> impl Iterator<Item = (FrameIndex, PhysicalFrame)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.in_use)
            .map(|(index, frame)| (index as FrameIndex, *frame))
    }
}

impl<const NUM_FRAMES: usize> fmt::Display for FrameTable<NUM_FRAMES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "P.Frame | Share Count")?;
        writeln!(f, "---------------------")?;
        for (index, frame) in self.iter_in_use() {
            writeln!(f, "  {:<5} | {}", index, frame.share_count)?;
        }
        write!(
            f,
            "{} of {} frames in use",
            self.frames_in_use(),
            NUM_FRAMES
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_init() {
        let table = FrameTable::<64>::init();
        assert_eq!(FrameTable::<64>::capacity(), 64);
        assert_eq!(table.frames_in_use(), 0);
        for i in 0..64 {
            assert!(!table.frame_is_in_use(i));
            assert_eq!(table.share_count(i), 0);
        }
    }

    #[test]
    fn test_allocate() {
        let mut table = FrameTable::<64>::init();
        table.allocate(25).unwrap();
        assert!(table.frame_is_in_use(25));
        assert_eq!(table.share_count(25), 1);
        assert_eq!(table.frames_in_use(), 1);
    }

    #[test]
    fn test_allocate_twice() {
        let mut table = FrameTable::<64>::init();
        table.allocate(10).unwrap();
        assert_eq!(
            table.allocate(10),
            Err(FrameError::AlreadyInUse { index: 10 })
        );
        assert_eq!(table.share_count(10), 1);
    }

    #[test]
    fn test_allocate_out_of_range() {
        let mut table = FrameTable::<64>::init();
        assert_eq!(table.allocate(64), Err(FrameError::OutOfRange { index: 64 }));
        assert_eq!(table.frames_in_use(), 0);
        assert!(!table.frame_is_in_use(64));
    }

    #[test]
    fn test_allocate_any() {
        let mut table = FrameTable::<4>::init();
        table.allocate(0).unwrap();
        table.allocate(2).unwrap();
        assert_eq!(table.first_free(), Some(1));
        assert_eq!(table.allocate_any(), Ok(1));
        assert_eq!(table.allocate_any(), Ok(3));
        assert_eq!(table.allocate_any(), Err(FrameError::Exhausted));
        assert_eq!(table.first_free(), None);
    }

    #[test]
    fn test_share_counting() {
        let mut table = FrameTable::<64>::init();
        table.allocate(30).unwrap();
        assert_eq!(table.increment_share(30), Ok(2));
        assert_eq!(table.increment_share(30), Ok(3));
        assert_eq!(table.decrement_share(30), Ok(2));
        assert_eq!(table.decrement_share(30), Ok(1));
        assert!(table.frame_is_in_use(30));
        assert_eq!(table.decrement_share(30), Ok(0));
        assert!(!table.frame_is_in_use(30));
        // A released frame can be handed out again.
        table.allocate(30).unwrap();
    }

    #[test]
    fn test_share_on_free_frame() {
        let mut table = FrameTable::<64>::init();
        assert_eq!(table.increment_share(5), Err(FrameError::NotInUse { index: 5 }));
        assert_eq!(table.decrement_share(5), Err(FrameError::NotInUse { index: 5 }));
        assert_eq!(
            table.increment_share(99),
            Err(FrameError::OutOfRange { index: 99 })
        );
    }

    #[test]
    fn test_random_allocate_release() {
        let mut table = FrameTable::<64>::init();
        let mut rng = rand::thread_rng();
        let mut held = Vec::new();
        for _ in 0..rng.gen_range(1..64) {
            held.push(table.allocate_any().unwrap());
        }
        let release = rng.gen_range(0..held.len());
        for _ in 0..release {
            let frame = held.pop().unwrap();
            table.decrement_share(frame).unwrap();
        }
        assert_eq!(table.frames_in_use(), held.len());
        for (index, frame) in table.iter_in_use() {
            assert!(held.contains(&index));
            assert_eq!(frame.share_count(), 1);
        }
    }

    #[test]
    fn test_display() {
        let mut table = FrameTable::<8>::init();
        table.allocate(3).unwrap();
        table.increment_share(3).unwrap();
        let dump = table.to_string();
        assert!(dump.contains("  3     | 2"));
        assert!(dump.ends_with("1 of 8 frames in use"));
    }
}
