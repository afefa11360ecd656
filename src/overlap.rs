//! Overlap bookkeeping between consecutive steps.
//!
//! The world records every touching pair in the current set during the
//! narrowphase. Diffing it against the previous step's set yields the pairs
//! that started and stopped touching.

/// Sorted sets of unordered pairs for this step and the last one.
#[derive(Debug, Clone)]
pub struct OverlapKeeper<K> {
    current: Vec<(K, K)>,
    previous: Vec<(K, K)>,
}

impl<K> Default for OverlapKeeper<K> {
    fn default() -> Self {
        Self {
            current: Vec::new(),
            previous: Vec::new(),
        }
    }
}

impl<K: Ord + Copy> OverlapKeeper<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: K, b: K) -> (K, K) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Start a new step: the current set becomes the previous one.
    pub fn tick(&mut self) {
        core::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();
    }

    /// Record that `a` and `b` touch this step.
    pub fn set(&mut self, a: K, b: K) {
        let key = Self::key(a, b);
        if let Err(pos) = self.current.binary_search(&key) {
            self.current.insert(pos, key);
        }
    }

    pub fn contains(&self, a: K, b: K) -> bool {
        self.current.binary_search(&Self::key(a, b)).is_ok()
    }

    pub fn current(&self) -> &[(K, K)] {
        &self.current
    }

    /// Pairs only in the current set go to `additions`, pairs only in the
    /// previous set to `removals`.
    pub fn diff(&self, additions: &mut Vec<(K, K)>, removals: &mut Vec<(K, K)>) {
        let (mut i, mut j) = (0, 0);
        while i < self.current.len() || j < self.previous.len() {
            match (self.current.get(i), self.previous.get(j)) {
                (Some(c), Some(p)) if c == p => {
                    i += 1;
                    j += 1;
                }
                (Some(c), Some(p)) if c < p => {
                    additions.push(*c);
                    i += 1;
                }
                (Some(c), None) => {
                    additions.push(*c);
                    i += 1;
                }
                (_, Some(p)) => {
                    removals.push(*p);
                    j += 1;
                }
                (None, None) => break,
            }
        }
    }

    /// Drop every pair with a member for which `matches` holds, in both sets.
    pub fn forget(&mut self, mut matches: impl FnMut(&K) -> bool) {
        self.current.retain(|(a, b)| !matches(a) && !matches(b));
        self.previous.retain(|(a, b)| !matches(a) && !matches(b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_unordered_and_unique() {
        let mut k = OverlapKeeper::new();
        k.set(3, 1);
        k.set(1, 3);
        assert_eq!(k.current(), &[(1, 3)]);
        assert!(k.contains(3, 1));
    }

    #[test]
    fn test_diff_between_steps() {
        let mut k = OverlapKeeper::new();
        k.set(1, 2);
        k.set(2, 3);
        k.tick();
        k.set(2, 3);
        k.set(4, 5);

        let (mut added, mut removed) = (Vec::new(), Vec::new());
        k.diff(&mut added, &mut removed);
        assert_eq!(added, vec![(4, 5)]);
        assert_eq!(removed, vec![(1, 2)]);
    }

    #[test]
    fn test_first_step_everything_is_new() {
        let mut k = OverlapKeeper::new();
        k.tick();
        k.set(7, 8);
        let (mut added, mut removed) = (Vec::new(), Vec::new());
        k.diff(&mut added, &mut removed);
        assert_eq!(added, vec![(7, 8)]);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_forget_removes_from_both_sets() {
        let mut k = OverlapKeeper::new();
        k.set(1, 2);
        k.tick();
        k.set(1, 3);
        k.forget(|&x| x == 1);
        let (mut added, mut removed) = (Vec::new(), Vec::new());
        k.diff(&mut added, &mut removed);
        assert!(added.is_empty());
        assert!(removed.is_empty());
    }
}
