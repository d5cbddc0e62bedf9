use super::lines::CandidateLine;

/// Scan `[anchor - radius, anchor + radius]` (clipped) in index order and return
/// the text of the first line satisfying `predicate`.
///
/// Index order, not distance order: a match above the anchor wins over a closer
/// one below it. Results must be reproducible on identical input, so keep it.
pub fn find_nearest<'a, F>(
    lines: &[CandidateLine<'a>],
    anchor: usize,
    radius: usize,
    predicate: F,
) -> Option<&'a str>
where
    F: Fn(&CandidateLine<'a>) -> bool,
{
    if lines.is_empty() || anchor >= lines.len() {
        return None;
    }
    let start = anchor.saturating_sub(radius);
    let end = anchor.saturating_add(radius).min(lines.len() - 1);

    lines[start..=end]
        .iter()
        .find(|line| predicate(*line))
        .map(|line| line.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lines::Tags;

    fn lines<'a>(texts: &[&'a str]) -> Vec<CandidateLine<'a>> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| CandidateLine {
                index,
                text,
                tags: Tags::default(),
            })
            .collect()
    }

    #[test]
    fn index_order_beats_distance() {
        let ls = lines(&["x1", "a", "x2", "ANCHOR", "x3"]);
        // x1 is two lines away, x3 one line away; x1 comes first in index order
        let hit = find_nearest(&ls, 3, 3, |l| l.text.starts_with('x'));
        assert_eq!(hit, Some("x1"));
    }

    #[test]
    fn clipped_to_bounds() {
        let ls = lines(&["ANCHOR", "a", "b"]);
        assert_eq!(find_nearest(&ls, 0, 10, |l| l.text == "b"), Some("b"));
        assert_eq!(find_nearest(&ls, 2, usize::MAX, |l| l.text == "ANCHOR"), Some("ANCHOR"));
    }

    #[test]
    fn outside_radius_is_ignored() {
        let ls = lines(&["hit", "a", "b", "ANCHOR"]);
        assert_eq!(find_nearest(&ls, 3, 2, |l| l.text == "hit"), None);
        assert_eq!(find_nearest(&ls, 3, 3, |l| l.text == "hit"), Some("hit"));
    }

    #[test]
    fn anchor_out_of_range() {
        let ls = lines(&["a"]);
        assert_eq!(find_nearest(&ls, 5, 2, |_| true), None);
        assert_eq!(find_nearest(&[], 0, 2, |_| true), None);
    }
}
