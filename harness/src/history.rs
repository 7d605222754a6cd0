//! Bounded record of processed transactions.

use {cuttle_svm_result::TransactionResult, indexmap::IndexMap, solana_signature::Signature};

/// Signature to outcome mapping that forgets its oldest entry once full.
///
/// A capacity of zero disables recording entirely.
#[derive(Debug)]
pub struct TransactionHistory {
    entries: IndexMap<Signature, TransactionResult>,
    capacity: usize,
}

impl TransactionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, signature: Signature, outcome: TransactionResult) {
        if !self.is_enabled() {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&signature) {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(signature, outcome);
    }

    pub fn lookup(&self, signature: &Signature) -> Option<&TransactionResult> {
        self.entries.get(signature)
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.entries.contains_key(signature)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, cuttle_svm_result::TransactionMetadata};

    fn signature(byte: u8) -> Signature {
        Signature::from([byte; 64])
    }

    fn outcome(fee: u64) -> TransactionResult {
        Ok(TransactionMetadata {
            fee,
            ..Default::default()
        })
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = TransactionHistory::new(2);
        history.record(signature(1), outcome(1));
        history.record(signature(2), outcome(2));
        history.record(signature(3), outcome(3));

        assert_eq!(history.len(), 2);
        assert!(!history.contains(&signature(1)));
        assert_eq!(history.lookup(&signature(3)), Some(&outcome(3)));
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut history = TransactionHistory::new(0);
        history.record(signature(1), outcome(1));
        assert!(history.is_empty());
        assert!(!history.contains(&signature(1)));
    }
}
