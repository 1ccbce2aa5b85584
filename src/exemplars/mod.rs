use anyhow::{bail, Result};
use hashbrown::HashMap;
use indicatif::ProgressBar;
use itertools::Itertools;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

use crate::io::{ItemId, PADDING_ITEM};
use crate::model::{InferenceOptions, Logits, SequenceModel};
use crate::sampling::Sampler;

pub mod herding;
pub mod store;

/// One retained sub-sequence and the model output recorded when it was
/// selected. The stored session includes its label as final element and
/// carries no padding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Exemplar {
    pub session: Vec<ItemId>,
    pub logits: Logits,
}

/// Hand-off artifact between training cycles: per item, the exemplars kept
/// for it.
pub type ExemplarsByItem = HashMap<ItemId, Vec<Exemplar>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Greedy distance-to-mean selection over model embeddings.
    Herding,
    /// Keep the sessions the model fits best (lowest loss first).
    LossRanking,
    /// Uniform selection without replacement.
    Random,
}

impl FromStr for SelectionStrategy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "herding" => Ok(SelectionStrategy::Herding),
            "loss" => Ok(SelectionStrategy::LossRanking),
            "random" => Ok(SelectionStrategy::Random),
            other => bail!("Unknown selection strategy: {}", other),
        }
    }
}

/// Allocates the total exemplar budget `m` over items with one multinomial
/// draw proportional to the given frequencies, so the quotas sum to exactly
/// `m`. Fails when no label has ever been observed.
pub fn allocate_quotas(frequencies: &[f64], budget: usize, rng: &mut Pcg64) -> Result<Vec<usize>> {
    if frequencies.iter().sum::<f64>() <= 0.0 {
        bail!("No candidate sessions for exemplar selection");
    }
    let item_distribution = WeightedIndex::new(frequencies)?;
    let mut quotas = vec![0_usize; frequencies.len()];
    for _ in 0..budget {
        quotas[item_distribution.sample(rng)] += 1;
    }
    Ok(quotas)
}

/// Selects a bounded memory of representative sub-sequences per item.
///
/// Lifecycle: construction scans the data once to pool sessions by label and
/// derive per-item quotas; `select_exemplars` then runs exactly one strategy;
/// afterwards the result is read out with `into_exemplars`.
pub struct ExemplarGenerator {
    exemplars: ExemplarsByItem,
    /// Padded sub-sequences with their label appended, pooled per label.
    sessions_by_item: HashMap<ItemId, Vec<Vec<ItemId>>>,
    quotas: Vec<usize>,
    max_item: ItemId,
    dropout_rate: f64,
    rng: Pcg64,
    selection_done: bool,
}

impl ExemplarGenerator {
    /// `data` holds sub-sequences: training and validation data of the
    /// current cycle plus reconstructed exemplars of the previous one.
    /// When `allocate_by_frequency` is false every item gets the same
    /// multinomial weight.
    pub fn new(
        data: Vec<Vec<ItemId>>,
        budget: usize,
        allocate_by_frequency: bool,
        maxlen: usize,
        batch_size: usize,
        dropout_rate: f64,
        max_item: ItemId,
        mut rng: Pcg64,
    ) -> Result<Self> {
        let sampler_rng = Pcg64::seed_from_u64(rng.gen());
        let mut sampler = Sampler::new(data, maxlen, batch_size, true, sampler_rng);

        let mut sessions_by_item: HashMap<ItemId, Vec<Vec<ItemId>>> = HashMap::new();
        let mut item_frequencies = vec![0.0_f64; max_item as usize];

        let progress = ProgressBar::new(sampler.batch_num() as u64);
        for _ in 0..sampler.batch_num() {
            let batch = sampler.next_batch();
            for (sequence, label) in batch.sequences.into_iter().zip(batch.labels.into_iter()) {
                let mut session = sequence;
                session.push(label);
                sessions_by_item.entry(label).or_default().push(session);
                item_frequencies[(label - 1) as usize] += 1.0;
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        if !allocate_by_frequency {
            item_frequencies = vec![1.0; max_item as usize];
        }
        let quotas = allocate_quotas(&item_frequencies, budget, &mut rng)?;

        Ok(ExemplarGenerator {
            exemplars: HashMap::new(),
            sessions_by_item,
            quotas,
            max_item,
            dropout_rate,
            rng,
            selection_done: false,
        })
    }

    /// Runs the configured strategy once over all items with candidates,
    /// capping each item at `min(quota, candidates)`. Returns the total
    /// number of exemplars saved.
    pub fn select_exemplars(
        &mut self,
        strategy: SelectionStrategy,
        model: &dyn SequenceModel,
    ) -> Result<usize> {
        if self.selection_done {
            bail!("Exemplars were already selected by this generator");
        }
        let options = InferenceOptions {
            dropout_rate: self.dropout_rate,
            max_item: self.max_item,
            is_training: false,
        };

        let mut saved_num = 0;
        let items: Vec<ItemId> = self.sessions_by_item.keys().copied().sorted().collect();
        let progress = ProgressBar::new(items.len() as u64);
        for item in items {
            let candidates = self.sessions_by_item[&item].clone();
            let quota = self.quotas[(item - 1) as usize];
            let m = quota.min(candidates.len());
            if m == 0 {
                progress.inc(1);
                continue;
            }

            let selected = match strategy {
                SelectionStrategy::Herding => self.select_by_herding(&candidates, m, model, &options)?,
                SelectionStrategy::LossRanking => self.select_by_loss(&candidates, m, model, &options)?,
                SelectionStrategy::Random => self.select_randomly(&candidates, m, model, &options)?,
            };
            saved_num += selected.len();
            self.exemplars.insert(item, selected);
            progress.inc(1);
        }
        progress.finish_and_clear();

        println!("Total saved exemplars: {}", saved_num);
        self.selection_done = true;
        Ok(saved_num)
    }

    fn select_by_herding(
        &mut self,
        candidates: &[Vec<ItemId>],
        m: usize,
        model: &dyn SequenceModel,
        options: &InferenceOptions,
    ) -> Result<Vec<Exemplar>> {
        let inputs = strip_labels(candidates);
        let output = model.embed(&inputs, options)?;
        let selected_ids = herding::select(&output.embeddings, m);
        if selected_ids.len() < m {
            println!(
                "Herding step bound reached: kept {} of {} exemplars.",
                selected_ids.len(),
                m
            );
        }
        Ok(make_exemplars(candidates, &output.logits, &selected_ids))
    }

    fn select_by_loss(
        &mut self,
        candidates: &[Vec<ItemId>],
        m: usize,
        model: &dyn SequenceModel,
        options: &InferenceOptions,
    ) -> Result<Vec<Exemplar>> {
        let inputs = strip_labels(candidates);
        let labels: Vec<ItemId> = candidates
            .iter()
            .map(|session| *session.last().unwrap())
            .collect();
        let (losses, logits) = model.score(&inputs, &labels, options)?;

        let selected_ids: Vec<usize> = (0..candidates.len())
            .sorted_by(|&a, &b| losses[a].partial_cmp(&losses[b]).unwrap())
            .take(m)
            .collect();
        Ok(make_exemplars(candidates, &logits, &selected_ids))
    }

    fn select_randomly(
        &mut self,
        candidates: &[Vec<ItemId>],
        m: usize,
        model: &dyn SequenceModel,
        options: &InferenceOptions,
    ) -> Result<Vec<Exemplar>> {
        let selected_ids: Vec<usize> =
            rand::seq::index::sample(&mut self.rng, candidates.len(), m).into_vec();
        let selected_candidates: Vec<Vec<ItemId>> = selected_ids
            .iter()
            .map(|&index| candidates[index].clone())
            .collect();
        // logits recorded for provenance only
        let inputs = strip_labels(&selected_candidates);
        let output = model.embed(&inputs, options)?;
        let all_ids: Vec<usize> = (0..selected_candidates.len()).collect();
        Ok(make_exemplars(&selected_candidates, &output.logits, &all_ids))
    }

    /// Per-item quota derived from the multinomial draw, indexed by item id.
    pub fn quota(&self, item: ItemId) -> usize {
        self.quotas[(item - 1) as usize]
    }

    /// Hands the selected exemplars off to the next training cycle. Consumes
    /// the generator, its pools are stale once selection has run.
    pub fn into_exemplars(self) -> ExemplarsByItem {
        self.exemplars
    }
}

fn strip_labels(candidates: &[Vec<ItemId>]) -> Vec<Vec<ItemId>> {
    candidates
        .iter()
        .map(|session| session[..session.len() - 1].to_vec())
        .collect()
}

fn make_exemplars(
    candidates: &[Vec<ItemId>],
    logits: &[Logits],
    selected_ids: &[usize],
) -> Vec<Exemplar> {
    selected_ids
        .iter()
        .map(|&index| Exemplar {
            session: candidates[index]
                .iter()
                .copied()
                .filter(|&item| item != PADDING_ITEM)
                .collect(),
            logits: logits[index].clone(),
        })
        .collect()
}
