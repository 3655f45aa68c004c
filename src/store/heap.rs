/// Ordering relation for [`MinHeap`] elements.
///
/// `a.precedes(&b)` means `a` must leave the heap before `b`. The relation must be a
/// strict weak ordering; elements that precede each other in neither direction are
/// treated as ties and may come out in any order.
pub trait Precedes {
    fn precedes(&self, other: &Self) -> bool;
}

/// Array-backed binary min-heap over any [`Precedes`] element.
///
/// There is no interior locking: the owner must guarantee exclusive access, which in
/// this crate is the session reaper holding it by value.
#[derive(Debug, Clone)]
pub struct MinHeap<T> {
    items: Vec<T>,
}

impl<T> Default for MinHeap<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Precedes> MinHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// O(log n).
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Smallest element without removing it. O(1).
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Removes and returns the smallest element. O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let min = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        min
    }

    /// Discards the current contents and heapifies `items` in O(n).
    pub fn rebuild(&mut self, items: Vec<T>) {
        self.items = items;
        if self.items.len() < 2 {
            return;
        }
        for idx in (0..self.items.len() / 2).rev() {
            self.sift_down(idx);
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.items[idx].precedes(&self.items[parent]) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.items[right].precedes(&self.items[left]) {
                smallest = right;
            }
            if !self.items[smallest].precedes(&self.items[idx]) {
                break;
            }
            self.items.swap(idx, smallest);
            idx = smallest;
        }
    }
}
