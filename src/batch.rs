use crate::model::ProductRow;

/// Fixed-size batching of normalized rows.
///
/// Push rows in and apply a batch whenever one comes back full; call
/// [`BatchAccumulator::finish`] to flush the trailing partial batch.
/// Batches may span input-file boundaries, and every pushed row lands in
/// exactly one batch. Single pass; build a fresh accumulator per run.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    pending: Vec<ProductRow>,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize) -> Self {
        debug_assert!(batch_size > 0, "batch_size must be positive");
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
        }
    }

    pub fn push(&mut self, row: ProductRow) -> Option<Vec<ProductRow>> {
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            let next = Vec::with_capacity(self.batch_size);
            Some(std::mem::replace(&mut self.pending, next))
        } else {
            None
        }
    }

    /// Flush whatever is left; `None` when the tail is empty. Consumes
    /// the accumulator so a spent one cannot be reused.
    pub fn finish(self) -> Option<Vec<ProductRow>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(id: i64) -> ProductRow {
        ProductRow {
            id,
            name: None,
            url_key: None,
            price: None,
            description: None,
            image_urls: Vec::new(),
            images_doc: serde_json::Value::Array(Vec::new()),
            source_file: "products_1.json".into(),
            ingested_at: Utc::now(),
        }
    }

    fn drain(batch_size: usize, n: i64) -> Vec<Vec<ProductRow>> {
        let mut acc = BatchAccumulator::new(batch_size);
        let mut batches = Vec::new();
        for id in 0..n {
            if let Some(batch) = acc.push(row(id)) {
                batches.push(batch);
            }
        }
        if let Some(tail) = acc.finish() {
            batches.push(tail);
        }
        batches
    }

    #[test]
    fn five_rows_at_size_two_yield_two_two_one() {
        let batches = drain(2, 5);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        // every row exactly once, in order
        let ids: Vec<i64> = batches.iter().flatten().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn exact_multiple_leaves_no_empty_tail() {
        let batches = drain(3, 6);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(drain(10, 0).is_empty());
    }
}
