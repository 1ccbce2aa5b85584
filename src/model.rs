use anyhow::Result;

use crate::io::ItemId;

/// One logit per known item, indexed by item id minus one.
pub type Logits = Vec<f64>;

/// Per-call inference settings forwarded to the model.
pub struct InferenceOptions {
    pub dropout_rate: f64,
    pub max_item: ItemId,
    pub is_training: bool,
}

pub struct ModelOutput {
    /// One representation vector per input sequence.
    pub embeddings: Vec<Vec<f64>>,
    /// One logit vector per input sequence.
    pub logits: Vec<Logits>,
}

/// Contract of the underlying sequence-prediction model. The exemplar
/// machinery never depends on a concrete model implementation; a failure
/// inside a model call aborts the surrounding selection or evaluation run.
pub trait SequenceModel {
    /// Embeddings and logits for a batch of fixed-length padded input
    /// sequences.
    fn embed(&self, sequences: &[Vec<ItemId>], options: &InferenceOptions) -> Result<ModelOutput>;

    /// Per-sequence loss and logits given the true next-item labels.
    fn score(
        &self,
        sequences: &[Vec<ItemId>],
        labels: &[ItemId],
        options: &InferenceOptions,
    ) -> Result<(Vec<f64>, Vec<Logits>)>;
}
