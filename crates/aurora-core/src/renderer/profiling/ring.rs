// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A fixed-capacity index ring with a monotone cursor.

/// Hands out slot indices `0..capacity` in order, wrapping around.
///
/// The ring does not track occupancy; callers that recycle slots with a
/// delay (like the profiler's in-flight frames) account for that themselves.
#[derive(Debug)]
pub struct Ring {
    capacity: usize,
    cursor: usize,
}

impl Ring {
    /// Creates a ring over `capacity` slots. `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            capacity,
            cursor: 0,
        }
    }

    /// The number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the next slot index and advances the cursor.
    pub fn advance(&mut self) -> usize {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.capacity;
        slot
    }

    /// The number of advances it takes to get from slot `from` to slot `to`.
    pub fn distance(&self, from: usize, to: usize) -> usize {
        (to + self.capacity - from) % self.capacity
    }

    /// Iterates `count` slot indices starting at `first`, wrapping around.
    pub fn indices(&self, first: usize, count: usize) -> impl Iterator<Item = usize> {
        let capacity = self.capacity;
        (0..count).map(move |i| (first + i) % capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_wraps_at_capacity() {
        let mut ring = Ring::new(3);
        assert_eq!(ring.advance(), 0);
        assert_eq!(ring.advance(), 1);
        assert_eq!(ring.advance(), 2);
        assert_eq!(ring.advance(), 0);
    }

    #[test]
    fn distance_accounts_for_wrap() {
        let ring = Ring::new(8);
        assert_eq!(ring.distance(0, 5), 5);
        assert_eq!(ring.distance(5, 0), 3);
        assert_eq!(ring.distance(3, 3), 0);
    }

    #[test]
    fn indices_wrap_around() {
        let ring = Ring::new(4);
        let slots: Vec<_> = ring.indices(2, 4).collect();
        assert_eq!(slots, vec![2, 3, 0, 1]);
    }

    #[test]
    #[should_panic(expected = "ring capacity must be non-zero")]
    fn zero_capacity_is_rejected() {
        let _ = Ring::new(0);
    }
}
