use crate::metrics::RankMetric;

pub struct Mrr {
    sum_of_scores: f64,
    qty: usize,
    length: usize,
}

impl Mrr {
    pub fn new(length: usize) -> Mrr {
        Mrr {
            sum_of_scores: 0_f64,
            qty: 0,
            length,
        }
    }
}

impl RankMetric for Mrr {
    fn add(&mut self, rank: usize) {
        self.qty += 1;
        if rank < self.length {
            self.sum_of_scores += 1_f64 / (rank as f64 + 1_f64);
        }
    }

    fn result(&self) -> f64 {
        if self.qty > 0 {
            self.sum_of_scores / self.qty as f64
        } else {
            0.0
        }
    }

    fn get_name(&self) -> String {
        format!("MRR@{}", self.length)
    }
}
