use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand_pcg::Pcg64;

use crate::exemplars::Exemplar;
use crate::io::{ItemId, PADDING_ITEM};
use crate::model::Logits;

/// One batch of training data in column layout.
pub struct Batch {
    pub sequences: Vec<Vec<ItemId>>,
    pub labels: Vec<ItemId>,
}

/// One batch of replayed exemplar data, each row paired with the logits
/// recorded by the previous cycle's model.
pub struct ExemplarBatch {
    pub sequences: Vec<Vec<ItemId>>,
    pub labels: Vec<ItemId>,
    pub logits: Vec<Logits>,
}

/// Expands full sessions into all strict prefixes of length >= 2.
/// A session of length L > 2 yields the session itself plus L - 2
/// truncations; shorter sessions yield only themselves.
pub fn expand_into_prefixes(sessions: Vec<Vec<ItemId>>) -> Vec<Vec<ItemId>> {
    let mut prepared = Vec::with_capacity(sessions.len());
    for session in sessions {
        let length = session.len();
        if length > 2 {
            for cut in 1..length - 1 {
                prepared.push(session[..length - cut].to_vec());
            }
        }
        prepared.push(session);
    }
    prepared
}

/// Draws shuffled fixed-size batches of (padded input sequence, label) pairs
/// from a pool of sub-sequences. The pool is fixed after construction except
/// for one extension point, `add_exemplar`.
pub struct Sampler {
    maxlen: usize,
    batch_size: usize,
    prepared_data: Vec<Vec<ItemId>>,
    /// Index-aligned with `prepared_data` once `add_exemplar` has run.
    logits: Vec<Logits>,
    exemplars_added: bool,
    data_indices: Vec<usize>,
    batch_counter: usize,
    rng: Pcg64,
}

impl Sampler {
    /// `is_subseq` marks data that already consists of sub-sequences
    /// (reconstructed exemplars); otherwise every session is expanded into
    /// its prefixes first.
    pub fn new(
        sessions: Vec<Vec<ItemId>>,
        maxlen: usize,
        batch_size: usize,
        is_subseq: bool,
        mut rng: Pcg64,
    ) -> Self {
        let prepared_data = if is_subseq {
            sessions
        } else {
            expand_into_prefixes(sessions)
        };

        let mut data_indices: Vec<usize> = (0..prepared_data.len()).collect();
        data_indices.shuffle(&mut rng);

        Sampler {
            maxlen,
            batch_size,
            prepared_data,
            logits: Vec::new(),
            exemplars_added: false,
            data_indices,
            batch_counter: 0,
            rng,
        }
    }

    /// Splits one sub-sequence into its padded input sequence and label.
    /// The label is the last element; the remainder is right-aligned into a
    /// zero-padded array of length `maxlen`, keeping only the most recent
    /// items when the prefix is longer than `maxlen`.
    pub fn label_generator(&self, session: &[ItemId]) -> (Vec<ItemId>, ItemId) {
        let label = *session.last().unwrap();
        let mut sequence = vec![PADDING_ITEM; self.maxlen];
        let mut idx = self.maxlen;
        for item_id in session[..session.len() - 1].iter().rev() {
            idx -= 1;
            sequence[idx] = *item_id;
            if idx == 0 {
                break;
            }
        }
        (sequence, label)
    }

    /// Returns the next batch in shuffled order. Sub-sequences of length <= 1
    /// are skipped and the final batch of an epoch may be shorter than
    /// `batch_size`; after the last batch the cursor wraps around and the
    /// index permutation is reshuffled.
    pub fn next_batch(&mut self) -> Batch {
        let mut sequences = Vec::with_capacity(self.batch_size);
        let mut labels = Vec::with_capacity(self.batch_size);
        if self.batch_num() == 0 {
            return Batch { sequences, labels };
        }

        let offset = self.batch_counter * self.batch_size;
        for i in 0..self.batch_size {
            if offset + i >= self.prepared_data.len() {
                break;
            }
            let index = self.data_indices[offset + i];
            let session = &self.prepared_data[index];
            if session.len() <= 1 {
                continue;
            }
            let (sequence, label) = self.label_generator(session);
            sequences.push(sequence);
            labels.push(label);
        }

        self.advance_cursor();
        Batch { sequences, labels }
    }

    /// Same batching discipline as `next_batch`, with the recorded logits of
    /// each sub-sequence attached. Requires `add_exemplar` to have aligned
    /// the logits with the pool.
    pub fn next_exemplar_batch(&mut self) -> Result<ExemplarBatch> {
        if !self.exemplars_added || self.logits.len() != self.prepared_data.len() {
            bail!("Exemplar logits are not aligned with the data pool, call add_exemplar first");
        }
        let mut sequences = Vec::with_capacity(self.batch_size);
        let mut labels = Vec::with_capacity(self.batch_size);
        let mut logits = Vec::with_capacity(self.batch_size);
        if self.batch_num() == 0 {
            return Ok(ExemplarBatch { sequences, labels, logits });
        }

        let offset = self.batch_counter * self.batch_size;
        for i in 0..self.batch_size {
            if offset + i >= self.prepared_data.len() {
                break;
            }
            let index = self.data_indices[offset + i];
            let session = &self.prepared_data[index];
            if session.len() <= 1 {
                continue;
            }
            let (sequence, label) = self.label_generator(session);
            sequences.push(sequence);
            labels.push(label);
            logits.push(self.logits[index].clone());
        }

        self.advance_cursor();
        Ok(ExemplarBatch { sequences, labels, logits })
    }

    fn advance_cursor(&mut self) {
        self.batch_counter += 1;
        if self.batch_counter >= self.batch_num() {
            self.batch_counter = 0;
            self.data_indices.shuffle(&mut self.rng);
        }
    }

    /// Appends exemplars from the previous cycle to the pool, keeping their
    /// logits index-aligned. Restarts the current epoch: the cursor is reset
    /// and the index permutation rebuilt, so no entry is skipped or served
    /// twice.
    pub fn add_exemplar(&mut self, exemplars: &[Exemplar]) {
        self.logits.resize(self.prepared_data.len(), Logits::new());
        for exemplar in exemplars {
            self.prepared_data.push(exemplar.session.clone());
            self.logits.push(exemplar.logits.clone());
        }

        self.exemplars_added = true;
        self.data_indices = (0..self.prepared_data.len()).collect();
        self.data_indices.shuffle(&mut self.rng);
        self.batch_counter = 0;
    }

    /// Moves a random `valid_portion` of the pool out as validation data and
    /// keeps the rest for training. Restarts the current epoch.
    pub fn split_data(&mut self, valid_portion: f64) -> Vec<Vec<ItemId>> {
        let data_size = self.prepared_data.len();
        let mut shuffled: Vec<usize> = (0..data_size).collect();
        shuffled.shuffle(&mut self.rng);

        let n_train = (data_size as f64 * (1.0 - valid_portion)).round() as usize;
        let valid_data: Vec<Vec<ItemId>> = shuffled[n_train..]
            .iter()
            .map(|&index| self.prepared_data[index].clone())
            .collect();
        let train_data: Vec<Vec<ItemId>> = shuffled[..n_train]
            .iter()
            .map(|&index| self.prepared_data[index].clone())
            .collect();

        if self.logits.len() == data_size {
            self.logits = shuffled[..n_train]
                .iter()
                .map(|&index| self.logits[index].clone())
                .collect();
        } else {
            self.logits.clear();
        }
        self.prepared_data = train_data;
        self.data_indices = (0..self.prepared_data.len()).collect();
        self.data_indices.shuffle(&mut self.rng);
        self.batch_counter = 0;

        valid_data
    }

    /// Remaining pool after construction, `add_exemplar` and `split_data`.
    pub fn sessions(&self) -> &[Vec<ItemId>] {
        &self.prepared_data
    }

    pub fn data_size(&self) -> usize {
        self.prepared_data.len()
    }

    /// Number of batches per epoch, the last one possibly short.
    pub fn batch_num(&self) -> usize {
        (self.prepared_data.len() + self.batch_size - 1) / self.batch_size
    }
}

#[cfg(test)]
mod sampler_test {
    use super::*;
    use rand::SeedableRng;

    fn seeded_rng() -> Pcg64 {
        Pcg64::seed_from_u64(42)
    }

    #[test]
    fn should_expand_sessions_into_all_prefixes() {
        let sessions = vec![vec![1, 2, 3, 4, 5], vec![6, 7], vec![8]];
        let prepared = expand_into_prefixes(sessions);

        // length 5 yields 4 sub-sequences, lengths 2 and 1 yield themselves
        assert_eq!(4 + 1 + 1, prepared.len());
        assert!(prepared.contains(&vec![1, 2, 3, 4, 5]));
        assert!(prepared.contains(&vec![1, 2, 3, 4]));
        assert!(prepared.contains(&vec![1, 2, 3]));
        assert!(prepared.contains(&vec![1, 2]));
        assert!(prepared.contains(&vec![6, 7]));
        assert!(prepared.contains(&vec![8]));
    }

    #[test]
    fn should_right_align_and_pad_sequences() {
        let sampler = Sampler::new(vec![], 5, 2, true, seeded_rng());

        let (sequence, label) = sampler.label_generator(&[10, 20, 30]);
        assert_eq!(vec![0, 0, 0, 10, 20], sequence);
        assert_eq!(30, label);

        // longer history than maxlen keeps only the most recent items
        let (sequence, label) = sampler.label_generator(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(vec![3, 4, 5, 6, 7], sequence);
        assert_eq!(8, label);
    }

    #[test]
    fn batches_have_fixed_length_sequences_and_padding_on_the_left_only() {
        let sessions = vec![vec![1, 2, 3, 4], vec![5, 6, 7], vec![8, 9]];
        let mut sampler = Sampler::new(sessions, 4, 3, false, seeded_rng());

        for _ in 0..sampler.batch_num() {
            let batch = sampler.next_batch();
            for sequence in batch.sequences.iter() {
                assert_eq!(4, sequence.len());
                let first_item = sequence.iter().position(|&item| item != PADDING_ITEM);
                if let Some(start) = first_item {
                    assert!(sequence[start..].iter().all(|&item| item != PADDING_ITEM));
                }
            }
        }
    }

    #[test]
    fn should_skip_subsequences_without_context() {
        let data = vec![vec![7], vec![1, 2], vec![3, 4]];
        let mut sampler = Sampler::new(data, 3, 3, true, seeded_rng());

        let batch = sampler.next_batch();
        // the singleton has no input items and is dropped from the batch
        assert_eq!(2, batch.sequences.len());
        assert_eq!(2, batch.labels.len());
    }

    #[test]
    fn epoch_should_cover_the_pool_and_wrap_around_reshuffled() {
        let sessions: Vec<Vec<ItemId>> = (1..=50).map(|i| vec![i, i + 100]).collect();
        let mut sampler = Sampler::new(sessions, 3, 7, true, seeded_rng());
        assert_eq!(8, sampler.batch_num());

        let collect_epoch = |sampler: &mut Sampler| -> Vec<ItemId> {
            let mut labels = Vec::new();
            for _ in 0..sampler.batch_num() {
                labels.extend(sampler.next_batch().labels);
            }
            labels
        };

        let first_epoch = collect_epoch(&mut sampler);
        let second_epoch = collect_epoch(&mut sampler);

        assert_eq!(50, first_epoch.len());
        assert_eq!(50, second_epoch.len());

        let mut first_sorted = first_epoch.clone();
        let mut second_sorted = second_epoch.clone();
        first_sorted.sort_unstable();
        second_sorted.sort_unstable();
        assert_eq!(first_sorted, second_sorted);
        // fresh epoch order after the wraparound
        assert_ne!(first_epoch, second_epoch);
    }

    #[test]
    fn should_split_off_validation_data_without_overlap() {
        let sessions: Vec<Vec<ItemId>> = (1..=40).map(|i| vec![i, i + 100]).collect();
        let mut sampler = Sampler::new(sessions, 3, 8, true, seeded_rng());

        let valid_data = sampler.split_data(0.25);

        assert_eq!(10, valid_data.len());
        assert_eq!(30, sampler.data_size());
        for session in valid_data.iter() {
            assert!(!sampler.sessions().contains(session));
        }
    }

    #[test]
    fn split_boundaries_keep_or_move_the_whole_pool() {
        let sessions: Vec<Vec<ItemId>> = (1..=12).map(|i| vec![i, i + 100]).collect();

        let mut sampler = Sampler::new(sessions.clone(), 3, 4, true, seeded_rng());
        let valid_data = sampler.split_data(0.0);
        assert!(valid_data.is_empty());
        assert_eq!(12, sampler.data_size());

        let mut sampler = Sampler::new(sessions, 3, 4, true, seeded_rng());
        let valid_data = sampler.split_data(1.0);
        assert_eq!(12, valid_data.len());
        assert_eq!(0, sampler.data_size());
        assert_eq!(0, sampler.batch_num());
    }

    #[test]
    fn exemplar_batches_require_add_exemplar_first() {
        // empty pool: the guard must not pass just because nothing is there
        let mut sampler = Sampler::new(vec![], 3, 2, true, seeded_rng());
        assert!(sampler.next_exemplar_batch().is_err());

        // populated pool without recorded logits
        let mut sampler = Sampler::new(vec![vec![1, 2], vec![2, 3]], 3, 2, true, seeded_rng());
        assert!(sampler.next_exemplar_batch().is_err());
    }

    #[test]
    fn added_exemplars_are_served_with_their_logits() {
        let mut sampler = Sampler::new(vec![], 3, 2, true, seeded_rng());
        assert!(sampler.next_exemplar_batch().is_err());

        let exemplars = vec![
            Exemplar { session: vec![1, 2, 3], logits: vec![0.1, 0.2] },
            Exemplar { session: vec![4, 5], logits: vec![0.3, 0.4] },
        ];
        sampler.add_exemplar(&exemplars);
        assert_eq!(2, sampler.data_size());

        let batch = sampler.next_exemplar_batch().unwrap();
        assert_eq!(2, batch.sequences.len());
        assert_eq!(batch.sequences.len(), batch.logits.len());
        for (label, logits) in batch.labels.iter().zip(batch.logits.iter()) {
            if *label == 3 {
                assert_eq!(vec![0.1, 0.2], *logits);
            } else {
                assert_eq!(5, *label);
                assert_eq!(vec![0.3, 0.4], *logits);
            }
        }
    }
}
