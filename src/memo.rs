use std::collections::{HashMap, hash_map::Entry};
use std::hash::Hash;

/// A pure-ish calculation that can be memoized by key. `calc` takes `&mut
/// self` so that calculators can keep side-channel statistics; the returned
/// value must depend on the key alone.
pub trait MemoCalc<K: Eq + Clone + Hash, V> {
    fn calc(&mut self, key: &K) -> V;
}

/// Memo table owning its calculator. Values are computed at most once per key
/// and never change afterwards.
pub struct Memo<K: Eq + Clone + Hash, V, C: MemoCalc<K, V>> {
    table: HashMap<K, V>,
    calc: C,
}

impl <K: Eq + Clone + Hash, V, C: MemoCalc<K, V>> Memo<K, V, C> {
    pub fn new(calc: C) -> Self {
        Memo { table: HashMap::new(), calc }
    }

    pub fn get(&mut self, key: &K) -> &V {
        let calc = &mut self.calc;
        match self.table.entry(key.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let y = calc.calc(key);
                v.insert(y)
            }
        }
    }

    pub fn calc(&self) -> &C { &self.calc }

    pub fn into_parts(self) -> (HashMap<K, V>, C) {
        (self.table, self.calc)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct CountingSquare(usize);
    impl MemoCalc<u32, u64> for CountingSquare {
        fn calc(&mut self, key: &u32) -> u64 {
            self.0 += 1;
            (*key as u64) * (*key as u64)
        }
    }

    #[test]
    fn test_memo_computes_once() {
        let mut m = Memo::new(CountingSquare(0));
        assert_eq!(*m.get(&3), 9);
        assert_eq!(*m.get(&3), 9);
        assert_eq!(*m.get(&4), 16);
        assert_eq!(m.calc().0, 2);
        let (table, calc) = m.into_parts();
        assert_eq!(table.len(), 2);
        assert_eq!(calc.0, 2);
    }
}
