use super::PageTableEntry;

/// Walks the present entries of a table in index order.
pub struct PageTableIterator<'a> {
    current: usize,
    entries: &'a [PageTableEntry],
}

impl<'a> PageTableIterator<'a> {
    pub fn new(entries: &'a [PageTableEntry]) -> Self {
        Self {
            current: 0,
            entries,
        }
    }
}

impl<'a> Iterator for PageTableIterator<'a> {
    type Item = (usize, PageTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(entry) = self.entries.get(self.current) {
            let index = self.current;
            self.current += 1;
            if entry.is_present() {
                return Some((index, *entry));
            }
        }
        None
    }
}
