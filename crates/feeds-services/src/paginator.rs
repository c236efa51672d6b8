//! Response paginator: bounds each response envelope to a byte ceiling.
//!
//! Rows are accumulated with a running size estimate. The row that would push
//! a page over the ceiling starts the next page; rows are never split. Only
//! the final page is flagged `is_last`. No rows means no pages at all.

use feeds_core::rpc::{WireSize, PAGE_OVERHEAD};

pub const DEFAULT_CEILING: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub is_last: bool,
}

pub struct Paginator<T> {
    ceiling: usize,
    sealed: Vec<Vec<T>>,
    current: Vec<T>,
    current_size: usize,
}

impl<T: WireSize> Paginator<T> {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            sealed: Vec::new(),
            current: Vec::new(),
            current_size: PAGE_OVERHEAD,
        }
    }

    pub fn push(&mut self, row: T) {
        let size = row.wire_size();
        if !self.current.is_empty() && self.current_size + size > self.ceiling {
            self.sealed.push(std::mem::take(&mut self.current));
            self.current_size = PAGE_OVERHEAD;
        }
        self.current_size += size;
        self.current.push(row);
    }

    /// Seal the last page and return every page in order.
    pub fn finish(mut self) -> Vec<Page<T>> {
        if !self.current.is_empty() {
            self.sealed.push(self.current);
        }
        let count = self.sealed.len();
        self.sealed
            .into_iter()
            .enumerate()
            .map(|(i, rows)| Page {
                rows,
                is_last: i + 1 == count,
            })
            .collect()
    }
}

impl<T: WireSize> Default for Paginator<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING)
    }
}
