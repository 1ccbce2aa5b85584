use crate::metrics::mrr::Mrr;
use crate::metrics::recall::Recall;
use crate::metrics::RankMetric;

/// Aggregates the standard continual-recommendation metrics over all
/// evaluated sessions.
pub struct EvaluationReporter {
    mrr_20: Mrr,
    recall_20: Recall,
    mrr_10: Mrr,
    recall_10: Recall,
}

impl Default for EvaluationReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationReporter {
    pub fn new() -> EvaluationReporter {
        EvaluationReporter {
            mrr_20: Mrr::new(20),
            recall_20: Recall::new(20),
            mrr_10: Mrr::new(10),
            recall_10: Recall::new(10),
        }
    }

    pub fn add(&mut self, rank: usize) {
        self.mrr_20.add(rank);
        self.recall_20.add(rank);
        self.mrr_10.add(rank);
        self.recall_10.add(rank);
    }

    pub fn get_result(&self) -> String {
        let metrics: [&dyn RankMetric; 4] = [
            &self.mrr_20,
            &self.recall_20,
            &self.mrr_10,
            &self.recall_10,
        ];
        metrics
            .iter()
            .map(|metric| format!("{}: {:.4}", metric.get_name(), metric.result()))
            .collect::<Vec<String>>()
            .join(", ")
    }
}
