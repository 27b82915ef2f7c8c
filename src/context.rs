//! Selection of log lines sent to the ranking oracle alongside a record.

use std::collections::{BTreeSet, HashSet};

/// Share of the window taken from lines before the current one.
const BEFORE_SHARE: f64 = 0.3;

/// Indices (batch order, current line excluded) of at most `cap` lines: a
/// positional window 30% before and 70% after `current`, topped up with the
/// lines sharing the most words with the current one.
pub fn select_context(lines: &[String], current: usize, cap: usize) -> Vec<usize> {
    if cap == 0 || current >= lines.len() {
        return Vec::new();
    }
    let before = ((cap as f64) * BEFORE_SHARE).round() as usize;
    let after = cap - before.min(cap);

    let start = current.saturating_sub(before);
    let end = (current + after).min(lines.len() - 1);
    let mut picked: BTreeSet<usize> = (start..=end).filter(|&i| i != current).collect();

    if picked.len() < cap {
        let words = word_set(&lines[current]);
        if !words.is_empty() {
            let mut scored: Vec<(usize, f64)> = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != current && !picked.contains(i))
                .map(|(i, l)| (i, overlap(&words, l)))
                .filter(|(_, o)| *o > 0.0)
                .collect();
            // Stable: equal overlaps keep batch order.
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            let room = cap - picked.len();
            picked.extend(scored.into_iter().take(room).map(|(i, _)| i));
        }
    }
    picked.into_iter().collect()
}

/// The selected lines themselves.
pub fn context_lines(lines: &[String], current: usize, cap: usize) -> Vec<String> {
    select_context(lines, current, cap)
        .into_iter()
        .map(|i| lines[i].clone())
        .collect()
}

fn word_set(line: &str) -> HashSet<String> {
    line.split_whitespace().map(str::to_lowercase).collect()
}

/// Fraction of the current line's words that also occur in `line`.
fn overlap(words: &HashSet<String>, line: &str) -> f64 {
    let other = word_set(line);
    let shared = words.iter().filter(|w| other.contains(*w)).count();
    shared as f64 / words.len() as f64
}
