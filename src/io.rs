use anyhow::{bail, Context, Result};
use hashbrown::HashSet;
use itertools::Itertools;
use rayon::iter::ParallelBridge;
use rayon::prelude::ParallelIterator;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

pub type SessionId = u32;
pub type ItemId = u64;

/// Sentinel used for left-padding fixed-length input sequences.
/// Real item ids are always positive.
pub const PADDING_ITEM: ItemId = 0;

/// Reads one period file: one action per line, "sessionId itemId",
/// lines ordered by time within the period. Malformed lines are fatal.
pub fn read_period_file(period_file: &Path) -> Result<Vec<(SessionId, ItemId, usize)>> {
    let line_iterator = create_buffered_line_reader(period_file)
        .with_context(|| format!("Cannot open period file {}", period_file.display()))?;
    let mut actions: Vec<(SessionId, ItemId, usize)> = line_iterator
        .enumerate()
        .par_bridge()
        .map(|(line_number, result)| {
            let rawline = result?;
            let parts = rawline.split_whitespace().collect::<Vec<_>>();
            if parts.len() != 2 {
                bail!(
                    "Malformed line {} in {}: expected \"sessionId itemId\", got {:?}",
                    line_number + 1,
                    period_file.display(),
                    rawline
                );
            }
            let session_id = parts[0]
                .parse::<SessionId>()
                .with_context(|| format!("Invalid session id on line {}", line_number + 1))?;
            let item_id = parts[1]
                .parse::<ItemId>()
                .with_context(|| format!("Invalid item id on line {}", line_number + 1))?;
            Ok((session_id, item_id, line_number))
        })
        .collect::<Result<Vec<_>>>()?;
    actions.sort_unstable_by_key(|(_, _, line_number)| *line_number);
    Ok(actions)
}

fn create_buffered_line_reader<P>(filename: P) -> io::Result<io::Lines<io::BufReader<File>>>
where
    P: AsRef<Path>,
{
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}

fn group_into_sessions(actions: Vec<(SessionId, ItemId, usize)>) -> Vec<Vec<ItemId>> {
    actions
        .into_iter()
        .map(|(session_id, item_id, line_number)| (session_id, (item_id, line_number)))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(session_id, _)| *session_id)
        .map(|(_session_id, mut items_with_order)| {
            items_with_order.sort_unstable_by_key(|(_, line_number)| *line_number);
            items_with_order.into_iter().map(|(item, _)| item).collect()
        })
        .collect()
}

/// Loads per-period training and testing sessions and tracks the item
/// vocabulary accumulated over successive training cycles.
pub struct PeriodLoader {
    data_dir: PathBuf,
    item_set: HashSet<ItemId>,
}

impl PeriodLoader {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        PeriodLoader {
            data_dir: data_dir.as_ref().to_path_buf(),
            item_set: HashSet::new(),
        }
    }

    fn period_file(&self, period: usize) -> PathBuf {
        self.data_dir.join(format!("period_{}.txt", period))
    }

    /// Training sessions of one period. Every item id becomes part of the
    /// known vocabulary.
    pub fn load_train(&mut self, period: usize) -> Result<Vec<Vec<ItemId>>> {
        let actions = read_period_file(&self.period_file(period))?;
        for (_, item_id, _) in actions.iter() {
            self.item_set.insert(*item_id);
        }
        let sessions = group_into_sessions(actions);
        let qty_actions: usize = sessions.iter().map(|session| session.len()).sum();
        println!("Train set: {} actions in {} sessions.", qty_actions, sessions.len());
        Ok(sessions)
    }

    /// Test sessions of one period. Actions on items never seen in training
    /// data are dropped, as are sessions reduced to a single action.
    pub fn load_test(&mut self, period: usize) -> Result<Vec<Vec<ItemId>>> {
        let actions = read_period_file(&self.period_file(period))?;
        let qty_total = actions.len();
        let known_actions: Vec<_> = actions
            .into_iter()
            .filter(|(_, item_id, _)| self.item_set.contains(item_id))
            .collect();
        let mut qty_removed = qty_total - known_actions.len();

        let sessions: Vec<Vec<ItemId>> = group_into_sessions(known_actions)
            .into_iter()
            .filter(|session| {
                if session.len() == 1 {
                    qty_removed += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        println!("Test set: {} actions, {} removed.", qty_total, qty_removed);
        Ok(sessions)
    }

    /// Highest item id observed in training data so far.
    pub fn max_item(&self) -> ItemId {
        self.item_set.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod io_test {
    use super::*;
    use std::io::Write;

    fn write_period_file(dir: &Path, period: usize, lines: &[&str]) {
        let mut file = File::create(dir.join(format!("period_{}.txt", period))).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    #[test]
    fn should_group_actions_into_sessions_in_line_order() {
        let dir = std::env::temp_dir().join("memoir_io_train_test");
        std::fs::create_dir_all(&dir).unwrap();
        write_period_file(&dir, 1, &["1 10", "2 30", "1 20", "2 40", "1 30"]);

        let mut loader = PeriodLoader::new(&dir);
        let sessions = loader.load_train(1).unwrap();

        assert_eq!(2, sessions.len());
        assert_eq!(vec![10, 20, 30], sessions[0]);
        assert_eq!(vec![30, 40], sessions[1]);
        assert_eq!(40, loader.max_item());
    }

    #[test]
    fn should_remove_unknown_items_and_short_sessions_from_test_data() {
        let dir = std::env::temp_dir().join("memoir_io_eval_test");
        std::fs::create_dir_all(&dir).unwrap();
        write_period_file(&dir, 1, &["1 10", "1 20", "2 10", "2 20"]);
        // item 99 was never trained on, session 4 shrinks to one action
        write_period_file(&dir, 2, &["3 10", "3 20", "4 10", "4 99"]);

        let mut loader = PeriodLoader::new(&dir);
        loader.load_train(1).unwrap();
        let test_sessions = loader.load_test(2).unwrap();

        assert_eq!(1, test_sessions.len());
        assert_eq!(vec![10, 20], test_sessions[0]);
    }

    #[test]
    fn should_fail_on_malformed_lines() {
        let dir = std::env::temp_dir().join("memoir_io_malformed_test");
        std::fs::create_dir_all(&dir).unwrap();
        write_period_file(&dir, 1, &["1 10", "broken-line"]);

        let mut loader = PeriodLoader::new(&dir);
        assert!(loader.load_train(1).is_err());
    }
}
