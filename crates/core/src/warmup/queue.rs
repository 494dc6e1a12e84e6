//! Ordered work list split into waiting and processed partitions.
//!
//! `waiting` is a stack: its tail is fetched next. An item lives in at most
//! one partition at a time, and every operation is idempotent.

use serde::{Deserialize, Serialize};

use super::item::Item;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmUpQueue {
    waiting: Vec<Item>,
    processed: Vec<Item>,
}

impl WarmUpQueue {
    /// Queue where the head of `initial` is fetched first.
    pub fn new(initial: Vec<Item>) -> Self {
        let mut waiting = initial;
        waiting.reverse();
        Self { waiting, processed: Vec::new() }
    }

    pub(crate) fn from_parts(waiting: Vec<Item>, processed: Vec<Item>) -> Self {
        Self { waiting, processed }
    }

    pub(crate) fn into_parts(self) -> (Vec<Item>, Vec<Item>) {
        (self.waiting, self.processed)
    }

    /// Move the next waiting item to processed and return it.
    pub fn fetch(&mut self) -> Option<Item> {
        let item = self.waiting.pop()?;
        self.mark_processed(item.clone());
        Some(item)
    }

    /// Mark `item` processed without fetching it.
    ///
    /// An item the queue has never seen is added to processed.
    pub fn pull(&mut self, item: &Item) {
        if let Some(index) = self.waiting.iter().position(|w| w == item) {
            self.waiting.remove(index);
        }
        self.mark_processed(item.clone());
    }

    /// Put `item` back on the waiting tail so it is fetched next.
    pub fn push(&mut self, item: &Item) {
        if let Some(index) = self.processed.iter().position(|p| p == item) {
            self.processed.remove(index);
        }
        if !self.waiting.contains(item) {
            self.waiting.push(item.clone());
        }
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn total_count(&self) -> usize {
        self.waiting.len() + self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    fn mark_processed(&mut self, item: Item) {
        if !self.processed.contains(&item) {
            self.processed.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<Item> {
        (0..n).map(|i| Item::new(format!("https://example.com/{i}"), "")).collect()
    }

    #[test]
    fn test_initial_counts() {
        let queue = WarmUpQueue::new(items(4));
        assert_eq!(queue.processed_count(), 0);
        assert_eq!(queue.waiting_count(), 4);
        assert_eq!(queue.total_count(), 4);
        assert!(!queue.is_empty());
    }

    #[test]
    fn test_fetch_follows_initial_order() {
        let list = items(3);
        let mut queue = WarmUpQueue::new(list.clone());
        assert_eq!(queue.fetch().as_ref(), Some(&list[0]));
        assert_eq!(queue.fetch().as_ref(), Some(&list[1]));
        assert_eq!(queue.fetch().as_ref(), Some(&list[2]));
        assert_eq!(queue.fetch(), None);
        assert!(queue.is_empty());
        assert_eq!(queue.processed_count(), 3);
    }

    #[test]
    fn test_pull_push_transitions() {
        let list = items(4);
        let mut queue = WarmUpQueue::new(list.clone());

        let first = queue.fetch().unwrap();
        assert_eq!(queue.processed_count(), 1);
        assert_eq!(queue.waiting_count(), 3);

        // pull a not-yet-fetched item
        queue.pull(&list[2]);
        assert_eq!(queue.processed_count(), 2);
        assert_eq!(queue.waiting_count(), 2);
        assert_eq!(queue.total_count(), 4);

        // pull an already-processed item
        queue.pull(&first);
        assert_eq!(queue.processed_count(), 2);
        assert_eq!(queue.total_count(), 4);

        // push an unprocessed item
        queue.push(&list[3]);
        assert_eq!(queue.processed_count(), 2);
        assert_eq!(queue.waiting_count(), 2);

        // push a processed item back to waiting
        queue.push(&first);
        assert_eq!(queue.processed_count(), 1);
        assert_eq!(queue.waiting_count(), 3);
        assert_eq!(queue.total_count(), 4);
        assert_eq!(queue.fetch(), Some(first));
    }

    #[test]
    fn test_pull_unknown_item_grows_total() {
        let mut queue = WarmUpQueue::new(items(4));
        queue.pull(&Item::new("https://example.com/new", "mobile"));
        assert_eq!(queue.total_count(), 5);
        assert_eq!(queue.processed_count(), 1);
    }

    #[test]
    fn test_repeated_calls_are_idempotent() {
        let list = items(2);
        let mut queue = WarmUpQueue::new(list.clone());

        queue.pull(&list[1]);
        let after_once = queue.clone();
        queue.pull(&list[1]);
        assert_eq!(queue, after_once);

        queue.push(&list[1]);
        let after_once = queue.clone();
        queue.push(&list[1]);
        assert_eq!(queue, after_once);
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = WarmUpQueue::default();
        assert!(queue.is_empty());
        assert_eq!(queue.fetch(), None);
        assert_eq!(queue.total_count(), 0);
    }
}
