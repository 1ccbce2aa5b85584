use anyhow::Result;
use indicatif::ProgressBar;
use rand_pcg::Pcg64;

use crate::io::ItemId;
use crate::metrics::evaluation_reporter::EvaluationReporter;
use crate::model::{InferenceOptions, SequenceModel};
use crate::sampling::Sampler;

/// Ranks the true next item of every validation or test sub-sequence among
/// all items known so far and aggregates MRR and Recall over them.
pub struct Evaluator {
    sampler: Sampler,
    max_item: ItemId,
    mode: String,
}

impl Evaluator {
    pub fn new(
        data: Vec<Vec<ItemId>>,
        is_subseq: bool,
        maxlen: usize,
        batch_size: usize,
        max_item: ItemId,
        mode: &str,
        rng: Pcg64,
    ) -> Self {
        Evaluator {
            sampler: Sampler::new(data, maxlen, batch_size, is_subseq, rng),
            max_item,
            mode: mode.to_string(),
        }
    }

    /// Runs one full pass over the data and returns the formatted result
    /// line, which is also printed.
    pub fn evaluate(&mut self, model: &dyn SequenceModel, epoch: usize) -> Result<String> {
        let options = InferenceOptions {
            dropout_rate: 0.0,
            max_item: self.max_item,
            is_training: false,
        };
        let mut reporter = EvaluationReporter::new();

        let batch_num = self.sampler.batch_num();
        let progress = ProgressBar::new(batch_num as u64);
        for _ in 0..batch_num {
            let batch = self.sampler.next_batch();
            let output = model.embed(&batch.sequences, &options)?;
            for (logits, label) in output.logits.iter().zip(batch.labels.iter()) {
                reporter.add(rank_of(logits, *label, self.max_item));
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        let info = format!("epoch:{}, {} ({})", epoch, self.mode, reporter.get_result());
        println!("{}", info);
        Ok(info)
    }
}

/// Zero-based rank of the true item's logit among the logits of all items
/// `1..=max_item`: the number of items scored strictly higher.
fn rank_of(logits: &[f64], label: ItemId, max_item: ItemId) -> usize {
    let label_logit = logits[(label - 1) as usize];
    logits
        .iter()
        .take(max_item as usize)
        .filter(|&&logit| logit > label_logit)
        .count()
}
