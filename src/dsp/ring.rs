//! Fixed-capacity sample FIFO used to stage STFT input and output.
//!
//! Wraps a `ringbuf` producer/consumer pair owned by a single engine; both
//! halves live in the same struct, so the SPSC split is only used for its
//! allocation-free push/pop.

use ringbuf::{Consumer, Producer, RingBuffer};

pub struct SampleRing {
    producer: Producer<f32>,
    consumer: Consumer<f32>,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::<f32>::new(capacity.max(1)).split();
        Self { producer, consumer }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.consumer.capacity()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Returns `false` (and drops the sample) when the ring is full.
    #[inline]
    pub fn push(&mut self, x: f32) -> bool {
        self.producer.push(x).is_ok()
    }

    /// Oldest sample, or silence on underflow.
    #[inline]
    pub fn pop_oldest(&mut self) -> f32 {
        self.consumer.pop().unwrap_or(0.0)
    }

    pub fn clear(&mut self) {
        while self.consumer.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut r = SampleRing::new(4);
        assert!(r.push(1.0));
        assert!(r.push(2.0));
        assert_eq!(r.len(), 2);
        assert_eq!(r.pop_oldest(), 1.0);
        assert_eq!(r.pop_oldest(), 2.0);
        assert!(r.is_empty());
    }

    #[test]
    fn test_overflow_and_underflow() {
        let mut r = SampleRing::new(2);
        assert_eq!(r.capacity(), 2);
        assert!(r.push(1.0));
        assert!(r.push(2.0));
        assert!(!r.push(3.0));
        assert_eq!(r.len(), r.capacity());
        r.clear();
        assert_eq!(r.pop_oldest(), 0.0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut r = SampleRing::new(0);
        assert_eq!(r.capacity(), 1);
        assert!(r.push(4.0));
        assert!(!r.push(5.0));
        assert_eq!(r.pop_oldest(), 4.0);
    }

    #[test]
    fn test_wraps_around() {
        let mut r = SampleRing::new(3);
        for round in 0..10 {
            r.push(round as f32);
            r.push(round as f32 + 0.5);
            assert_eq!(r.pop_oldest(), round as f32);
            assert_eq!(r.pop_oldest(), round as f32 + 0.5);
        }
    }
}
