use crate::metrics::RankMetric;

/// Fraction of sessions whose true next item ranks within the top `length`.
pub struct Recall {
    qty_hits: usize,
    qty: usize,
    length: usize,
}

impl Recall {
    pub fn new(length: usize) -> Recall {
        Recall {
            qty_hits: 0,
            qty: 0,
            length,
        }
    }
}

impl RankMetric for Recall {
    fn add(&mut self, rank: usize) {
        self.qty += 1;
        if rank < self.length {
            self.qty_hits += 1;
        }
    }

    fn result(&self) -> f64 {
        if self.qty > 0 {
            self.qty_hits as f64 / self.qty as f64
        } else {
            0.0
        }
    }

    fn get_name(&self) -> String {
        format!("RECALL@{}", self.length)
    }
}

#[cfg(test)]
mod recall_test {
    use super::*;

    #[test]
    fn should_calculate_recall() {
        let mut mymetric = Recall::new(10);
        mymetric.add(0);
        mymetric.add(9);
        mymetric.add(10);
        mymetric.add(500);
        assert_eq!(0.5, mymetric.result());
        assert_eq!("RECALL@10", mymetric.get_name());
    }
}
