use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::exemplars::ExemplarsByItem;

/// Persists the per-item exemplar mapping produced at the end of a training
/// cycle so the next cycle can replay it through `Sampler::add_exemplar`.
pub fn write_exemplars(exemplar_file: &Path, exemplars: &ExemplarsByItem) -> Result<()> {
    let file = File::create(exemplar_file)
        .with_context(|| format!("Cannot create exemplar file {}", exemplar_file.display()))?;
    bincode::serialize_into(BufWriter::new(file), exemplars)
        .with_context(|| format!("Cannot serialize exemplars to {}", exemplar_file.display()))
}

pub fn read_exemplars(exemplar_file: &Path) -> Result<ExemplarsByItem> {
    let file = File::open(exemplar_file)
        .with_context(|| format!("Cannot open exemplar file {}", exemplar_file.display()))?;
    bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Cannot deserialize exemplars from {}", exemplar_file.display()))
}

#[cfg(test)]
mod store_test {
    use super::*;
    use crate::exemplars::Exemplar;
    use hashbrown::HashMap;

    #[test]
    fn should_round_trip_the_exemplar_mapping() {
        let mut exemplars: ExemplarsByItem = HashMap::new();
        exemplars.insert(
            3,
            vec![Exemplar { session: vec![1, 2, 3], logits: vec![0.25, 0.5, 0.25] }],
        );
        exemplars.insert(
            7,
            vec![
                Exemplar { session: vec![5, 7], logits: vec![0.1, 0.9] },
                Exemplar { session: vec![6, 5, 7], logits: vec![0.4, 0.6] },
            ],
        );

        let file = std::env::temp_dir().join("memoir_exemplar_store_test.bin");
        write_exemplars(&file, &exemplars).unwrap();
        let restored = read_exemplars(&file).unwrap();

        assert_eq!(exemplars, restored);
    }
}
