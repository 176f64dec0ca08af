// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! List that borrows its backing sequence until the first size change.

/// Mutable list over a borrowed sequence.
///
/// Reads and in-place updates go straight to the borrowed slice. The first
/// insert or remove copies the slice into an owned vector and all later
/// operations act on the copy.
#[derive(Debug)]
pub enum LazyList<'a, T> {
    /// Borrowed view; element updates write through.
    View(&'a mut [T]),
    /// Owned copy made on the first structural change.
    Owned(Vec<T>),
}

impl<'a, T: Clone> LazyList<'a, T> {
    /// Borrow an existing sequence.
    pub fn view(items: &'a mut [T]) -> Self {
        LazyList::View(items)
    }

    /// Start from an owned vector.
    pub fn owned(items: Vec<T>) -> Self {
        LazyList::Owned(items)
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a structural change has detached the list from its source.
    pub fn is_owned(&self) -> bool {
        matches!(self, LazyList::Owned(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            LazyList::View(items) => &items[..],
            LazyList::Owned(items) => &items[..],
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Replace the element at `index`, returning the previous value.
    pub fn set(&mut self, index: usize, value: T) -> Option<T> {
        let slot = match self {
            LazyList::View(items) => items.get_mut(index)?,
            LazyList::Owned(items) => items.get_mut(index)?,
        };
        Some(std::mem::replace(slot, value))
    }

    /// Insert at `index`. Panics if `index > len`, like `Vec::insert`.
    pub fn insert(&mut self, index: usize, value: T) {
        self.make_owned().insert(index, value);
    }

    pub fn push(&mut self, value: T) {
        self.make_owned().push(value);
    }

    /// Remove the element at `index`, or `None` if out of range.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }
        Some(self.make_owned().remove(index))
    }

    /// Keep only elements matching `keep`. Copies only if something is dropped.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        if self.iter().all(&mut keep) {
            return;
        }
        self.make_owned().retain(keep);
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            LazyList::View(items) => items.to_vec(),
            LazyList::Owned(items) => items,
        }
    }

    fn make_owned(&mut self) -> &mut Vec<T> {
        if let LazyList::View(items) = self {
            *self = LazyList::Owned(items.to_vec());
        }
        match self {
            LazyList::Owned(items) => items,
            LazyList::View(_) => unreachable!("converted to owned above"),
        }
    }
}
