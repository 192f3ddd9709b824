use serde::Serialize;

use crate::ledger::TransactionRecord;

/// Per-mode scores over every row of the mode.
///
/// Every transaction gets exactly one prediction attempt, so anything other than a match
/// (a wrong answer, or a row that was never evaluated) counts as a false positive and
/// `false_negatives` is always zero. `recall` is therefore 100 for any non-empty group and
/// carries no information; read `precision` or `accuracy` instead.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModeMetrics {
    pub mode: String,
    pub rows: usize,
    pub evaluated: usize,
    pub unevaluated: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub accuracy: f64,
}

#[derive(Debug, Default)]
struct ModeTally {
    rows: usize,
    unevaluated: usize,
    matched: usize,
}

pub fn summarize<'a>(records: impl IntoIterator<Item = &'a TransactionRecord>) -> Vec<ModeMetrics> {
    let mut tallies = Vec::<(String, ModeTally)>::new();

    for record in records {
        let position = match tallies.iter().position(|(mode, _)| *mode == record.mode) {
            Some(position) => position,
            None => {
                tallies.push((record.mode.clone(), ModeTally::default()));
                tallies.len() - 1
            }
        };
        let tally = &mut tallies[position].1;

        tally.rows += 1;
        match record.match_flag() {
            Some(true) => tally.matched += 1,
            Some(false) => {}
            None => tally.unevaluated += 1,
        }
    }

    tallies
        .into_iter()
        .map(|(mode, tally)| score_mode(mode, &tally))
        .collect()
}

fn score_mode(mode: String, tally: &ModeTally) -> ModeMetrics {
    let true_positives = tally.matched;
    let false_positives = tally.rows - tally.matched;
    let false_negatives = 0;

    ModeMetrics {
        mode,
        rows: tally.rows,
        evaluated: tally.rows - tally.unevaluated,
        unevaluated: tally.unevaluated,
        true_positives,
        false_positives,
        false_negatives,
        precision: percentage(true_positives, true_positives + false_positives),
        recall: if tally.rows == 0 { 0.0 } else { 100.0 },
        accuracy: percentage(true_positives, tally.rows),
    }
}

fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::columns::MATCH;

    fn record(transaction_no: u64, mode: &str, is_match: Option<bool>) -> TransactionRecord {
        let mut record = TransactionRecord::new(transaction_no, mode);
        if let Some(flag) = is_match {
            record.fields.insert(MATCH.to_string(), flag.into());
        }
        record
    }

    #[test]
    fn all_matches_score_one_hundred_everywhere() {
        let records = (1..=4)
            .map(|no| record(no, "hybrid", Some(true)))
            .collect::<Vec<_>>();
        let metrics = summarize(&records);

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].precision, 100.0);
        assert_eq!(metrics[0].recall, 100.0);
        assert_eq!(metrics[0].accuracy, 100.0);
    }

    #[test]
    fn all_misses_keep_recall_at_one_hundred() {
        let records = (1..=3)
            .map(|no| record(no, "hybrid", Some(false)))
            .collect::<Vec<_>>();
        let metrics = summarize(&records);

        assert_eq!(metrics[0].true_positives, 0);
        assert_eq!(metrics[0].false_positives, 3);
        assert_eq!(metrics[0].false_negatives, 0);
        assert_eq!(metrics[0].precision, 0.0);
        assert_eq!(metrics[0].accuracy, 0.0);
        assert_eq!(metrics[0].recall, 100.0);
    }

    #[test]
    fn modes_are_reported_in_first_seen_order() {
        let records = vec![
            record(1, "naive", Some(true)),
            record(1, "hybrid", Some(false)),
            record(2, "naive", Some(false)),
            record(2, "hybrid", Some(true)),
        ];
        let metrics = summarize(&records);

        let modes = metrics
            .iter()
            .map(|entry| entry.mode.as_str())
            .collect::<Vec<_>>();
        assert_eq!(modes, vec!["naive", "hybrid"]);
        assert_eq!(metrics[0].accuracy, 50.0);
        assert_eq!(metrics[1].accuracy, 50.0);
    }

    #[test]
    fn unevaluated_rows_count_against_the_group() {
        let metrics = summarize(&[record(1, "hybrid", Some(true)), record(2, "hybrid", None)]);

        assert_eq!(metrics[0].rows, 2);
        assert_eq!(metrics[0].evaluated, 1);
        assert_eq!(metrics[0].unevaluated, 1);
        assert_eq!(metrics[0].true_positives, 1);
        assert_eq!(metrics[0].false_positives, 1);
        assert_eq!(metrics[0].precision, 50.0);
        assert_eq!(metrics[0].accuracy, 50.0);
        assert_eq!(metrics[0].recall, 100.0);
    }

    #[test]
    fn unevaluated_only_group_still_has_full_recall() {
        let metrics = summarize(&[record(7, "local", None)]);
        assert_eq!(metrics[0].evaluated, 0);
        assert_eq!(metrics[0].false_positives, 1);
        assert_eq!(metrics[0].precision, 0.0);
        assert_eq!(metrics[0].recall, 100.0);
        assert_eq!(metrics[0].accuracy, 0.0);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(summarize(&Vec::<TransactionRecord>::new()).is_empty());
    }
}
