//! Batch building: group classified items by processing type into
//! size-bounded batches, highest average priority first.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classifier::{ClassifiedItem, ProcessingType};
use crate::config::BatchSizes;

/// Identifier of a batch.
pub type BatchId = Uuid;

/// An ordered, bounded group of same-type items dispatched as one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Batch identifier.
    pub id: BatchId,
    /// Shared processing type of every item.
    pub processing_type: ProcessingType,
    /// Items in submission order.
    pub items: Vec<ClassifiedItem>,
    /// Sum of the items' estimated durations.
    pub estimated_duration: Duration,
    /// Mean item priority.
    pub average_priority: f64,
    /// Sum of the items' estimated memory, in MB.
    pub estimated_memory_mb: f64,
}

impl Batch {
    /// Build a batch and compute its derived estimates.
    #[must_use]
    pub fn new(processing_type: ProcessingType, items: Vec<ClassifiedItem>) -> Self {
        let estimated_duration = items.iter().map(ClassifiedItem::estimated_duration).sum();
        let estimated_memory_mb = items.iter().map(ClassifiedItem::estimated_memory_mb).sum();
        let average_priority = if items.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let len = items.len() as f64;
            items.iter().map(|i| i.priority).sum::<f64>() / len
        };
        Self {
            id: Uuid::new_v4(),
            processing_type,
            items,
            estimated_duration,
            average_priority,
            estimated_memory_mb,
        }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the batch has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Partition items by processing type and slice each partition into batches
/// of the configured size. A trailing remainder becomes its own smaller batch.
///
/// The result is sorted by descending average priority; ties keep type order
/// (electronic, scanned, text, complex) and slice order.
#[must_use]
pub fn build_batches(items: Vec<ClassifiedItem>, sizes: &BatchSizes) -> Vec<Batch> {
    let mut partitions: [Vec<ClassifiedItem>; 4] = Default::default();
    for item in items {
        partitions[type_slot(item.processing_type)].push(item);
    }

    let mut batches = Vec::new();
    for (processing_type, partition) in ProcessingType::ALL.into_iter().zip(partitions) {
        let size = sizes.for_type(processing_type).max(1);
        let mut remaining = partition.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<ClassifiedItem> = remaining.by_ref().take(size).collect();
            batches.push(Batch::new(processing_type, chunk));
        }
    }

    batches.sort_by(|a, b| b.average_priority.total_cmp(&a.average_priority));
    batches
}

const fn type_slot(processing_type: ProcessingType) -> usize {
    match processing_type {
        ProcessingType::Electronic => 0,
        ProcessingType::Scanned => 1,
        ProcessingType::Text => 2,
        ProcessingType::Complex => 3,
    }
}
