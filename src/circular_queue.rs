use std::collections::VecDeque;

/// FIFO buffer holding at most `capacity` elements, oldest evicted first.
/// Without a capacity it grows without bound.
#[derive(Debug, Clone)]
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            deque: capacity.map_or_else(VecDeque::new, VecDeque::with_capacity),
            capacity,
        }
    }

    /// Appends `item` as the newest element and returns the evicted one, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        match self.capacity {
            Some(0) => Some(item),
            Some(cap) if self.deque.len() >= cap => {
                let evicted = self.deque.pop_front();
                self.deque.push_back(item);
                evicted
            }
            _ => {
                self.deque.push_back(item);
                None
            }
        }
    }

    /// Keeps `item` as the only element.
    #[inline]
    pub fn replace(&mut self, item: T) {
        self.deque.clear();
        self.push(item);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.deque.back()
    }

    /// Oldest to newest.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter()
    }
}
