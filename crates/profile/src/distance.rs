/// Levenshtein distance between the previous and current serialization.
///
/// With no previous value everything counts as new, so the distance is the
/// length of `current`. Lengths are measured in chars, not bytes.
pub fn distance(previous: Option<&str>, current: &str) -> usize {
    let Some(previous) = previous else {
        return current.chars().count();
    };
    if previous == current {
        return 0;
    }

    let prev: Vec<char> = previous.chars().collect();
    let curr: Vec<char> = current.chars().collect();
    if prev.is_empty() {
        return curr.len();
    }
    if curr.is_empty() {
        return prev.len();
    }

    let mut row: Vec<usize> = (0..=curr.len()).collect();
    for (i, &p) in prev.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &c) in curr.iter().enumerate() {
            let substitution = diagonal + usize::from(p != c);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }
    row[curr.len()]
}
