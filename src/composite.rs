//! Sequencing of several producers into one.

use std::collections::VecDeque;

use crate::producer::{BoxProducer, Producer, Pull};

/// Drains its producers in order, moving to the next one only when the
/// current one is exhausted.
#[derive(Default)]
pub struct CompositeProducer {
    producers: VecDeque<BoxProducer>,
}

impl CompositeProducer {
    pub fn new(producers: impl IntoIterator<Item = BoxProducer>) -> Self {
        Self {
            producers: producers.into_iter().collect(),
        }
    }

    /// Appends a producer after all the others.
    pub fn push(&mut self, producer: BoxProducer) {
        self.producers.push_back(producer);
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

impl Producer for CompositeProducer {
    fn more(&mut self) -> Pull {
        while let Some(current) = self.producers.front_mut() {
            match current.more() {
                Pull::Done => {
                    self.producers.pop_front();
                }
                other => return other,
            }
        }
        Pull::Done
    }
}
