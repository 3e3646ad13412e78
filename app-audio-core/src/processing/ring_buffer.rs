/// Fixed-capacity circular buffer.
///
/// Not synchronized; wrap in `parking_lot::Mutex` for cross-thread access.
///
/// Overflow behavior: drops oldest items.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    write_index: usize,
    read_index: usize,
    available: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding up to `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            write_index: 0,
            read_index: 0,
            available: 0,
        }
    }

    /// Append an item.
    ///
    /// If the buffer is full the oldest item is evicted and returned.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.available == self.capacity() {
            let oldest = self.slots[self.read_index].take();
            self.read_index = (self.read_index + 1) % self.capacity();
            self.available -= 1;
            oldest
        } else {
            None
        };

        self.slots[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity();
        self.available += 1;
        evicted
    }

    /// Remove and return the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.available == 0 {
            return None;
        }
        let item = self.slots[self.read_index].take();
        self.read_index = (self.read_index + 1) % self.capacity();
        self.available -= 1;
        item
    }

    /// Number of items currently available for reading.
    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn is_full(&self) -> bool {
        self.available == self.capacity()
    }

    /// Drop every queued item.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
