//! batch signing of messages with a history tree
//!
//! Signing every message on its own is expensive. Instead, messages are queued, and every call to
//! [ProcessQueue::process] puts the pending batch into a history tree and signs only the
//! commitment of that tree. Each message then gets the signature plus a pruned tree holding just
//! the path to its own leaf and the path to the last leaf of the batch, which is enough to
//! recompute the signed commitment.
use crate::sha256::{Sha256Agg, Sha256Digest};
use histree::{Aggregation, HistoryTree, MemStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

type BatchTree = HistoryTree<Sha256Agg, MemStore<Sha256Digest, Vec<u8>>>;

/// A queue of messages that are signed in bulk.
///
/// `add` may be called concurrently by many producers, `process` is usually run by a dedicated
/// signing thread.
pub trait ProcessQueue<T>: Send + Sync {
    /// add a message to be signed with the next batch
    fn add(&self, message: T);

    /// signs all messages added so far
    fn process(&self) -> anyhow::Result<()>;

    /// indicates that no more messages will be added
    fn finish(&self);

    /// Number of pending messages.
    ///
    /// This is a snapshot that may be stale as soon as it is returned, use it for batching
    /// decisions only.
    fn peek_size(&self) -> usize;
}

/// Produces signatures over commitments
pub trait Signer: Send + Sync {
    fn sign(&self, data: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// A message waiting to be signed
pub trait Message: Send {
    /// the bytes that go into the tree
    fn data(&self) -> Vec<u8>;

    /// called with the proof once the batch containing the message has been signed
    fn signed(self, proof: SignedProof);
}

/// Proof that a message was part of a signed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProof {
    /// version of the message's leaf in the batch tree
    pub leaf: u64,
    /// serialized commitment over the whole batch, this is what was signed
    pub commitment: Vec<u8>,
    pub signature: Vec<u8>,
    /// dag-cbor encoded pruned tree containing the paths to the leaf and to the last leaf
    pub tree: Vec<u8>,
}

/// A [ProcessQueue] that signs each batch using a history tree
pub struct MerkleQueue<T, S> {
    pending: Mutex<Pending<T>>,
    size: AtomicUsize,
    signer: S,
}

/// state shared between producers and the signer
struct Pending<T> {
    messages: Vec<T>,
    finished: bool,
}

impl<T: Message, S: Signer> MerkleQueue<T, S> {
    pub fn new(signer: S) -> Self {
        Self {
            pending: Mutex::new(Pending {
                messages: Vec::new(),
                finished: false,
            }),
            size: AtomicUsize::new(0),
            signer,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.pending.lock().finished
    }

    /// Queues a message, or hands it back if the queue is already finished.
    ///
    /// A message that is accepted is signed by the next call to `process`, even if `finish` is
    /// called right afterwards.
    pub fn try_add(&self, message: T) -> Result<(), T> {
        let mut pending = self.pending.lock();
        if pending.finished {
            return Err(message);
        }
        pending.messages.push(message);
        self.size.store(pending.messages.len(), Ordering::SeqCst);
        Ok(())
    }

    /// Signs the commitment of a batch and builds a proof for every message in it
    fn prove_batch(&self, batch: &[T]) -> anyhow::Result<Vec<SignedProof>> {
        let mut tree = BatchTree::new(Sha256Agg, MemStore::new());
        for message in batch {
            tree.append(message.data());
        }
        let (last, commitment) = match (tree.version(), tree.agg()) {
            (Some(last), Some(agg)) => (last, tree.agg_obj().serialize_agg(&agg)),
            _ => return Ok(Vec::new()),
        };
        let signature = self.signer.sign(&commitment)?;
        debug!(
            "signed batch of {} messages, commitment {}",
            batch.len(),
            hex::encode(&commitment)
        );
        (0..=last)
            .map(|leaf| {
                let mut pruned = tree.make_pruned(MemStore::new());
                pruned.copy_path(&tree, leaf, false);
                pruned.copy_path(&tree, last, false);
                Ok(SignedProof {
                    leaf,
                    commitment: commitment.clone(),
                    signature: signature.clone(),
                    tree: pruned.serialize_bytes()?,
                })
            })
            .collect()
    }

    /// puts a batch that could not be signed back in front of the pending messages
    fn restore(&self, batch: Vec<T>) {
        let mut pending = self.pending.lock();
        let newer = std::mem::replace(&mut pending.messages, batch);
        pending.messages.extend(newer);
        self.size.store(pending.messages.len(), Ordering::SeqCst);
    }
}

impl<T: Message, S: Signer> ProcessQueue<T> for MerkleQueue<T, S> {
    fn add(&self, message: T) {
        if self.try_add(message).is_err() {
            warn!("message added after the queue was finished, dropping it");
        }
    }

    /// Signs the pending batch.
    ///
    /// If signing fails, the batch stays queued and no message of it is notified.
    fn process(&self) -> anyhow::Result<()> {
        let batch = {
            let mut pending = self.pending.lock();
            self.size.store(0, Ordering::SeqCst);
            std::mem::take(&mut pending.messages)
        };
        if batch.is_empty() {
            return Ok(());
        }
        match self.prove_batch(&batch) {
            Ok(proofs) => {
                for (message, proof) in batch.into_iter().zip(proofs) {
                    message.signed(proof);
                }
                Ok(())
            }
            Err(cause) => {
                self.restore(batch);
                Err(cause)
            }
        }
    }

    fn finish(&self) {
        self.pending.lock().finished = true;
    }

    fn peek_size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }
}

/// Checks a proof against the message data it was issued for
pub fn verify_proof(data: &[u8], proof: &SignedProof) -> anyhow::Result<bool> {
    let tree = BatchTree::parse(Sha256Agg, MemStore::new(), &proof.tree)?;
    let agg = Sha256Agg;
    let leaf = tree
        .find_leaf(proof.leaf)
        .and_then(|leaf| tree.node_agg(leaf))
        .ok_or(crate::error::Error::MissingLeaf(proof.leaf))?;
    if *leaf != agg.map_value(&data.to_vec()) {
        return Ok(false);
    }
    let commitment = tree
        .agg()
        .map(|commitment| agg.serialize_agg(&commitment));
    Ok(commitment.as_deref() == Some(&proof.commitment[..]))
}
