//! Rolling window of recent blockhashes used for replay protection.

use {
    solana_clock::Slot, solana_hash::Hash, solana_sha256_hasher::hashv,
    std::collections::VecDeque,
};

const GENESIS_SEED: &[u8] = b"cuttle genesis";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockhashEntry {
    pub hash: Hash,
    pub lamports_per_signature: u64,
    pub slot: Slot,
}

#[derive(Debug)]
pub struct BlockhashQueue {
    entries: VecDeque<BlockhashEntry>,
    capacity: usize,
    lamports_per_signature: u64,
}

impl BlockhashQueue {
    /// Create a queue holding the deterministic genesis hash at slot 0.
    ///
    /// A capacity of zero is treated as one, so there is always a latest
    /// hash to hand out.
    pub fn new(capacity: usize, lamports_per_signature: u64) -> Self {
        let capacity = capacity.max(1);
        let mut entries = VecDeque::with_capacity(capacity);
        entries.push_back(BlockhashEntry {
            hash: hashv(&[GENESIS_SEED]),
            lamports_per_signature,
            slot: 0,
        });
        Self {
            entries,
            capacity,
            lamports_per_signature,
        }
    }

    pub fn latest(&self) -> Hash {
        self.entries
            .back()
            .map(|entry| entry.hash)
            .unwrap_or_default()
    }

    pub fn is_valid(&self, hash: &Hash) -> bool {
        self.entries.iter().any(|entry| entry.hash == *hash)
    }

    pub fn lamports_per_signature(&self, hash: &Hash) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.hash == *hash)
            .map(|entry| entry.lamports_per_signature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, previous: Hash, slot: Slot) -> Hash {
        let hash = hashv(&[previous.as_ref(), &slot.to_le_bytes()]);
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(BlockhashEntry {
            hash,
            lamports_per_signature: self.lamports_per_signature,
            slot,
        });
        hash
    }

    /// Register a new blockhash for `slot`, derived from the current latest.
    pub fn advance(&mut self, slot: Slot) -> Hash {
        self.push(self.latest(), slot)
    }

    /// Invalidate the current latest hash and replace it with a new one.
    pub fn expire_current(&mut self, slot: Slot) -> Hash {
        let previous = self.latest();
        self.entries.pop_back();
        self.push(previous, slot)
    }
}
