// Mon Oct 19 2026 - Alex

use ahash::AHashMap;

/// Disjoint sets over sparse `u64` ids. Unions keep the smaller root, so the
/// root of every set is its minimum member.
#[derive(Debug, Default, Clone)]
pub struct UnionFind {
    parents: AHashMap<u64, u64>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: u64) {
        self.parents.entry(id).or_insert(id);
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn find(&mut self, id: u64) -> u64 {
        let mut root = id;
        loop {
            match self.parents.get(&root) {
                Some(&parent) if parent != root => root = parent,
                Some(_) => break,
                None => {
                    self.parents.insert(id, id);
                    return id;
                }
            }
        }

        let mut current = id;
        while current != root {
            let next = self.parents[&current];
            self.parents.insert(current, root);
            current = next;
        }
        root
    }

    pub fn union(&mut self, a: u64, b: u64) -> u64 {
        let ra = self.find(a);
        let rb = self.find(b);
        let (root, child) = if ra <= rb { (ra, rb) } else { (rb, ra) };
        if root != child {
            self.parents.insert(child, root);
        }
        root
    }

    pub fn ids(&self) -> Vec<u64> {
        self.parents.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_minimum() {
        let mut uf = UnionFind::new();
        uf.union(9, 4);
        uf.union(12, 9);
        uf.union(30, 31);
        assert_eq!(uf.find(12), 4);
        assert_eq!(uf.find(31), 30);
        assert_eq!(uf.union(31, 12), 4);
        assert_eq!(uf.find(30), 4);
    }

    #[test]
    fn test_unknown_id_is_singleton() {
        let mut uf = UnionFind::new();
        assert_eq!(uf.find(77), 77);
        assert_eq!(uf.len(), 1);
    }
}
