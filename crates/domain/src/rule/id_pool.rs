use super::error::RuleError;

/// Fixed-capacity identifier pool.
///
/// Slots form an arena indexed by `id - base`; free slots are kept on a
/// stack so allocation and release are O(1). The lowest identifiers are
/// handed out first on a fresh pool.
#[derive(Debug, Clone)]
pub struct IdPool {
    base: u32,
    in_use: Vec<bool>,
    free: Vec<u32>,
}

impl IdPool {
    pub fn new(base: u32, capacity: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let free = (0..capacity as u32).rev().collect();
        Self {
            base,
            in_use: vec![false; capacity],
            free,
        }
    }

    pub fn alloc(&mut self) -> Result<u32, RuleError> {
        let idx = self.free.pop().ok_or(RuleError::Alloc {
            capacity: self.in_use.len(),
        })?;
        self.in_use[idx as usize] = true;
        Ok(self.base + idx)
    }

    pub fn release(&mut self, id: u32) -> Result<(), RuleError> {
        let slot = self.slot(id).ok_or(RuleError::BadId { id })?;
        if !self.in_use[slot] {
            return Err(RuleError::BadId { id });
        }
        self.in_use[slot] = false;
        #[allow(clippy::cast_possible_truncation)]
        self.free.push(slot as u32);
        Ok(())
    }

    /// Arena index of `id`, if it lies within the pool.
    pub fn slot(&self, id: u32) -> Option<usize> {
        let idx = id.checked_sub(self.base)? as usize;
        (idx < self.in_use.len()).then_some(idx)
    }

    pub fn is_allocated(&self, id: u32) -> bool {
        self.slot(id).is_some_and(|s| self.in_use[s])
    }

    pub fn capacity(&self) -> usize {
        self.in_use.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_from_base_upward() {
        let mut pool = IdPool::new(1, 4);
        assert_eq!(pool.alloc().unwrap(), 1);
        assert_eq!(pool.alloc().unwrap(), 2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut pool = IdPool::new(1, 2);
        pool.alloc().unwrap();
        pool.alloc().unwrap();
        assert!(matches!(pool.alloc(), Err(RuleError::Alloc { capacity: 2 })));
    }

    #[test]
    fn released_id_is_reused() {
        let mut pool = IdPool::new(1, 3);
        let a = pool.alloc().unwrap();
        pool.alloc().unwrap();
        pool.release(a).unwrap();
        assert!(!pool.is_allocated(a));
        assert_eq!(pool.alloc().unwrap(), a);
    }

    #[test]
    fn double_release_rejected() {
        let mut pool = IdPool::new(1, 2);
        let a = pool.alloc().unwrap();
        pool.release(a).unwrap();
        assert!(pool.release(a).is_err());
    }

    #[test]
    fn out_of_range_release_rejected() {
        let mut pool = IdPool::new(1, 2);
        assert!(pool.release(0).is_err());
        assert!(pool.release(3).is_err());
    }
}
