use crate::config::ScoreWeights;
use crate::resolve::classify::{is_declaration, is_import, is_logging, strip_line_comment};
use serde::Serialize;
use std::path::PathBuf;

/// A scored line. Ephemeral; lives only for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    /// Position of `file` in the scanned file list (tie-breaker).
    pub file_index: usize,
    pub file: PathBuf,
    /// 0-based.
    pub line: usize,
    pub score: u32,
}

/// Score a source line against a search string.
///
/// 0 when the line (minus any trailing comment) does not contain `search`
/// case-insensitively. Otherwise `base`, plus `exact` for a line equal to
/// the search string, plus `declaration` / `logging` for those shapes,
/// minus `import_penalty` for import lines, floored at 0.
pub fn calculate_match_score(line: &str, search: &str, weights: &ScoreWeights) -> u32 {
    let needle = search.trim();
    if needle.is_empty() {
        return 0;
    }
    let code = strip_line_comment(line);
    if !code.to_lowercase().contains(&needle.to_lowercase()) {
        return 0;
    }
    score_containing_line(code, needle, weights)
}

/// Scoring for a line already known to contain the needle; `needle_lower`
/// lets a scan lowercase the needle once.
pub(crate) fn score_line(line: &str, needle: &str, needle_lower: &str, weights: &ScoreWeights) -> u32 {
    let code = strip_line_comment(line);
    if !code.to_lowercase().contains(needle_lower) {
        return 0;
    }
    score_containing_line(code, needle, weights)
}

fn score_containing_line(code: &str, needle: &str, weights: &ScoreWeights) -> u32 {
    let mut score = weights.base;
    if code.trim() == needle {
        score += weights.exact;
    }
    if is_declaration(code) {
        score += weights.declaration;
    }
    if is_logging(code) {
        score += weights.logging;
    }
    if is_import(code) {
        score = score.saturating_sub(weights.import_penalty);
    }
    score
}

/// Highest score first; ties keep scan order (file, then line).
pub fn rank_candidates(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.file_index.cmp(&b.file_index))
            .then(a.line.cmp(&b.line))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(line: &str, search: &str) -> u32 {
        calculate_match_score(line, search, &ScoreWeights::default())
    }

    #[test]
    fn absent_needle_scores_zero() {
        assert_eq!(score("let x = 1;", "PlaceOrder"), 0);
        assert_eq!(score("let x = 1; // PlaceOrder", "PlaceOrder"), 0);
        assert_eq!(score("anything", "   "), 0);
    }

    #[test]
    fn match_is_case_insensitive() {
        assert_eq!(score("msg = placeorder", "PlaceOrder"), 10);
    }

    #[test]
    fn exact_line_beats_containing_line() {
        let exact = score("order placed", "order placed");
        let containing = score("x = order placed + y", "order placed");
        assert!(exact > containing);
        assert_eq!(exact, 40);
    }

    #[test]
    fn logging_line_outranks_import() {
        let logging = score(r#"log.info!("[PlaceOrder] started");"#, "PlaceOrder");
        let import = score("import { PlaceOrder } from './orders';", "PlaceOrder");
        assert_eq!(logging, 25);
        assert_eq!(import, 0);
    }

    #[test]
    fn declaration_bonus() {
        assert_eq!(score("fn place_order(o: Order) {", "place_order"), 30);
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let c = |file_index, line, score| MatchCandidate {
            file_index,
            file: PathBuf::from(format!("f{}", file_index)),
            line,
            score,
        };
        let mut v = vec![c(1, 0, 10), c(0, 5, 10), c(0, 2, 25), c(0, 1, 10)];
        rank_candidates(&mut v);
        let order: Vec<_> = v.iter().map(|m| (m.file_index, m.line)).collect();
        assert_eq!(order, vec![(0, 2), (0, 1), (0, 5), (1, 0)]);
    }
}
