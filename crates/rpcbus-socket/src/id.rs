use std::collections::BTreeSet;

/// Allocator for small numeric ids. Zero is never issued.
#[derive(Debug, Default)]
pub struct IdPool {
    in_use: BTreeSet<u32>,
    last: u32,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `preferred`, or the next free id after the last one issued
    /// when `preferred` is 0. Returns `None` if the id is taken or the pool
    /// is full.
    pub fn allocate(&mut self, preferred: u32) -> Option<u32> {
        if preferred != 0 {
            return self.in_use.insert(preferred).then_some(preferred);
        }
        if self.in_use.len() >= u32::MAX as usize {
            return None;
        }
        let mut candidate = self.last;
        loop {
            candidate = candidate.wrapping_add(1);
            if candidate != 0 && self.in_use.insert(candidate) {
                self.last = candidate;
                return Some(candidate);
            }
        }
    }

    pub fn free(&mut self, id: u32) -> bool {
        self.in_use.remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.in_use.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}
