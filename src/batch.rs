//! Bounded in-memory batch of transactions together with the cursors that may only be
//! committed once the batch is persisted.
use std::collections::BTreeMap;

use crate::source::Cursor;
use crate::transaction::Transaction;

/// Cursors of messages whose commit is tied to the current batch, in arrival order
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AckQueue {
    cursors: Vec<Cursor>,
}

impl AckQueue {
    pub fn push(&mut self, cursor: Cursor) {
        self.cursors.push(cursor);
    }

    /// Highest offset seen per (topic, partition). Committing these covers every queued message.
    pub fn watermarks(&self) -> Vec<Cursor> {
        let mut topic_map: BTreeMap<(&str, i32), i64> = BTreeMap::new();
        for c in &self.cursors {
            let offset = topic_map.entry((c.topic.as_str(), c.partition)).or_insert(c.offset);
            if *offset < c.offset {
                *offset = c.offset;
            }
        }
        topic_map
            .into_iter()
            .map(|((topic, partition), offset)| Cursor {
                topic: topic.to_string(),
                partition,
                offset,
            })
            .collect()
    }

    fn prepend(&mut self, mut earlier: AckQueue) {
        earlier.cursors.append(&mut self.cursors);
        self.cursors = earlier.cursors;
    }
}

/// Contents taken out of a [Batch] by [Batch::drain]
#[derive(Debug, Default)]
pub struct Drained {
    pub transactions: Vec<Transaction>,
    pub acks: AckQueue,
}

pub struct Batch {
    capacity: usize,
    transactions: Vec<Transaction>,
    acks: AckQueue,
}

impl Batch {
    pub fn new(capacity: usize) -> Batch {
        Batch {
            capacity,
            transactions: Vec::with_capacity(capacity),
            acks: AckQueue::default(),
        }
    }

    /// Buffers `tx` and returns whether the batch has reached capacity
    pub fn append(&mut self, tx: Transaction, cursor: Cursor) -> bool {
        self.transactions.push(tx);
        self.acks.push(cursor);
        self.is_full()
    }

    /// Queues the cursor of a message that produced no transaction, so that it is
    /// committed together with, and never ahead of, the transactions buffered before it.
    pub fn defer_ack(&mut self, cursor: Cursor) {
        self.acks.push(cursor);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() >= self.capacity
    }

    /// Takes everything buffered so far, leaving a fresh, empty batch behind
    pub fn drain(&mut self) -> Drained {
        Drained {
            transactions: std::mem::replace(
                &mut self.transactions,
                Vec::with_capacity(self.capacity),
            ),
            acks: std::mem::take(&mut self.acks),
        }
    }

    /// Puts a drained batch back in front of whatever was appended since
    pub fn restore(&mut self, mut drained: Drained) {
        drained.transactions.append(&mut self.transactions);
        self.transactions = drained.transactions;
        self.acks.prepend(drained.acks);
    }
}
