pub mod evaluation_reporter;
pub mod mrr;
pub mod recall;

/// Metric over the per-session rank of the true next item among all known
/// items. Ranks are zero-based: rank 0 means the model put the true item
/// first.
pub trait RankMetric {
    fn add(&mut self, rank: usize);
    fn result(&self) -> f64;
    fn get_name(&self) -> String;
}
