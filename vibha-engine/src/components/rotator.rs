//! Cyclic selection over a fixed number of items, such as testimonials.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotatorError {
    #[error("a rotator needs at least one item")]
    Empty,
    #[error("item {index} is out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
    #[error("unknown rotator")]
    Unknown,
}

/// The direction of the last move, used to pick the slide-in side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// A wrapping index over `len` items with an autoplay pause flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotator {
    len: usize,
    index: usize,
    direction: Direction,
    paused: bool,
}

impl Rotator {
    pub fn new(len: usize) -> Result<Self, RotatorError> {
        if len == 0 {
            return Err(RotatorError::Empty);
        }
        Ok(Self {
            len,
            index: 0,
            direction: Direction::Forward,
            paused: false,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn next(&mut self) -> usize {
        self.direction = Direction::Forward;
        self.index = (self.index + 1) % self.len;
        self.index
    }

    pub fn prev(&mut self) -> usize {
        self.direction = Direction::Backward;
        self.index = (self.index + self.len - 1) % self.len;
        self.index
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize, RotatorError> {
        if index >= self.len {
            return Err(RotatorError::OutOfRange {
                index,
                len: self.len,
            });
        }
        self.direction = if index > self.index {
            Direction::Forward
        } else {
            Direction::Backward
        };
        self.index = index;
        Ok(index)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rotator_is_rejected() {
        assert_eq!(Rotator::new(0), Err(RotatorError::Empty));
    }

    #[test]
    fn wraps_in_both_directions() {
        let mut rotator = Rotator::new(4).unwrap();
        assert_eq!(rotator.prev(), 3);
        assert_eq!(rotator.direction(), Direction::Backward);
        assert_eq!(rotator.next(), 0);
        assert_eq!(rotator.direction(), Direction::Forward);

        for expected in [1, 2, 3, 0, 1] {
            assert_eq!(rotator.next(), expected);
        }
    }

    #[test]
    fn single_item_stays_put() {
        let mut rotator = Rotator::new(1).unwrap();
        assert_eq!(rotator.next(), 0);
        assert_eq!(rotator.prev(), 0);
    }

    #[test]
    fn go_to_sets_direction_relative_to_current_item() {
        let mut rotator = Rotator::new(5).unwrap();
        assert_eq!(rotator.go_to(3), Ok(3));
        assert_eq!(rotator.direction(), Direction::Forward);
        assert_eq!(rotator.go_to(1), Ok(1));
        assert_eq!(rotator.direction(), Direction::Backward);
        assert_eq!(
            rotator.go_to(5),
            Err(RotatorError::OutOfRange { index: 5, len: 5 })
        );
        assert_eq!(rotator.index(), 1);
    }

    #[test]
    fn pause_and_resume() {
        let mut rotator = Rotator::new(2).unwrap();
        assert!(!rotator.is_paused());
        rotator.pause();
        assert!(rotator.is_paused());
        rotator.resume();
        assert!(!rotator.is_paused());
    }
}
