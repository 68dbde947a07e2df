use memory::FrameIndex;

/// One page ---> frame mapping.
///
/// The frame index of a non-present entry is undefined, so it is only
/// handed out through [`PageTableEntry::frame_index`], which checks the
/// present bit first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    present: bool,
    writable: bool,
    /// Set when fork demoted a writable mapping to read-only.
    copy_on_write: bool,
    frame_index: FrameIndex,
}

impl PageTableEntry {
    pub const fn not_present() -> Self {
        PageTableEntry {
            present: false,
            writable: false,
            copy_on_write: false,
            frame_index: 0,
        }
    }

    pub const fn mapped(frame_index: FrameIndex, writable: bool) -> Self {
        PageTableEntry {
            present: true,
            writable,
            copy_on_write: false,
            frame_index,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn is_writable(&self) -> bool {
        self.present && self.writable
    }

    pub fn is_copy_on_write(&self) -> bool {
        self.present && self.copy_on_write
    }

    pub fn frame_index(&self) -> Option<FrameIndex> {
        if self.present {
            Some(self.frame_index)
        } else {
            None
        }
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    /// Demote to read-only and remember that a write must copy the frame.
    pub fn mark_copy_on_write(&mut self) {
        self.writable = false;
        self.copy_on_write = true;
    }

    /// Give the entry private, writable ownership of `frame_index`.
    pub fn make_private(&mut self, frame_index: FrameIndex) {
        self.present = true;
        self.writable = true;
        self.copy_on_write = false;
        self.frame_index = frame_index;
    }
}
