use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Cosine similarity accumulated in f64. Callers check lengths first; a
/// zero-norm side scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f64;
    let mut a_norm = 0.0f64;
    let mut b_norm = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    (dot / (a_norm.sqrt() * b_norm.sqrt())).clamp(-1.0, 1.0) as f32
}

struct Candidate<T> {
    score: f32,
    seq: u64,
    item: T,
}

impl<T> Candidate<T> {
    // Higher score ranks first; on equal scores the earlier arrival does.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialEq for Candidate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Candidate<T> {}

impl<T> PartialOrd for Candidate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Candidate<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Bounded top-k selection over a stream of scored items.
///
/// Keeps at most `k` items in a min-heap. Once full, a newcomer evicts the
/// current minimum only when its score is strictly greater, so among equal
/// scores the first-seen item wins and results are stable for a stable input
/// order. NaN scores are ignored.
pub struct TopK<T> {
    k: usize,
    seq: u64,
    heap: BinaryHeap<Reverse<Candidate<T>>>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seq: 0,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offers a candidate; returns whether it is currently retained.
    pub fn push(&mut self, score: f32, item: T) -> bool {
        if self.k == 0 || score.is_nan() {
            return false;
        }
        let candidate = Candidate {
            score,
            seq: self.seq,
            item,
        };
        self.seq += 1;
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return true;
        }
        let admit = match self.heap.peek() {
            Some(Reverse(min)) => candidate.rank_cmp(min) == Ordering::Greater,
            None => false,
        };
        if admit {
            self.heap.pop();
            self.heap.push(Reverse(candidate));
        }
        admit
    }

    /// Drains the selection, best first.
    pub fn into_sorted_vec(self) -> Vec<(f32, T)> {
        // Ascending order of Reverse<_> is descending rank.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| (c.score, c.item))
            .collect()
    }
}
