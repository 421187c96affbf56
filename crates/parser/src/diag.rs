//! Smart-hint diagnostics: Levenshtein-distance "did you mean" suggestions
//! attached to parse and semantic errors, in the same voice as the original
//! compiler's `diag.py`.

const HINT_PREFIX: &str = "智能提示：";
const MAX_CANDIDATES: usize = 10;

/// Classic dynamic-programming edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in 0..=n {
        dp[i][0] = i;
    }
    for j in 0..=m {
        dp[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[n][m]
}

/// Finds the closest candidate to `word` by edit distance, only returning a
/// match when it's actually close (distance <= 2, or <= a third of the
/// word's length for longer identifiers).
pub fn nearest<'a>(word: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let threshold = (word.chars().count() / 3).max(2);
    candidates
        .into_iter()
        .map(|c| (c, levenshtein(&word.to_ascii_lowercase(), &c.to_ascii_lowercase())))
        .filter(|(_, d)| *d <= threshold)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

/// Renders a candidate list capped at [`MAX_CANDIDATES`] entries, appending
/// `...` when truncated.
pub fn format_candidates(candidates: &[String]) -> String {
    if candidates.len() <= MAX_CANDIDATES {
        format!("[{}]", candidates.join(", "))
    } else {
        let shown: Vec<&str> = candidates.iter().take(MAX_CANDIDATES).map(|s| s.as_str()).collect();
        format!("[{}, ...]", shown.join(", "))
    }
}

/// Builds the full "expected one of X, got Y" smart hint, including a
/// nearest-match suggestion when one is close enough to `got`.
pub fn suggest_expected_vs_got(expected: &[String], got: &str) -> String {
    let mut hint = format!("{HINT_PREFIX}可能的输入：{}", format_candidates(expected));
    let refs: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
    if let Some(near) = nearest(got, refs) {
        hint.push_str(&format!("；你是否想写 '{near}' ？"));
    }
    hint
}

/// Builds the alias-specific smart hint used when a query references an
/// unknown table alias.
pub fn suggest_alias(alias: &str, available: &[String]) -> String {
    let refs: Vec<&str> = available.iter().map(|s| s.as_str()).collect();
    match nearest(alias, refs) {
        Some(cand) => format!(
            "{HINT_PREFIX}你是否想写别名 '{cand}' ？（当前可用别名：{}）",
            format_candidates(available)
        ),
        None => format!("{HINT_PREFIX}当前可用别名：{}", format_candidates(available)),
    }
}

/// Builds the smart hint used when an unknown column is referenced,
/// suggesting the closest column name across every table in scope.
pub fn suggest_column(column: &str, available: &[String]) -> String {
    let refs: Vec<&str> = available.iter().map(|s| s.as_str()).collect();
    match nearest(column, refs) {
        Some(cand) => format!("{HINT_PREFIX}你是否想写 '{cand}' ？（可用列：{}）", format_candidates(available)),
        None => format!("{HINT_PREFIX}可用列：{}", format_candidates(available)),
    }
}

/// Builds the INSERT arity-mismatch smart hint, including a repaired
/// example with the right number of placeholders filled in.
pub fn suggest_insert_arity(table: &str, expected: usize, got: usize, column_names: &[String]) -> String {
    let placeholders: Vec<String> = (0..expected).map(|i| format!("<{}>", column_names.get(i).map(|s| s.as_str()).unwrap_or("v"))).collect();
    format!(
        "{HINT_PREFIX}表 '{table}' 需要 {expected} 个值，但提供了 {got} 个。例如：INSERT INTO {table} VALUES ({});",
        placeholders.join(", ")
    )
}

/// Builds the foreign-key-violation smart hint: up to ten existing values in
/// the referenced column, both repair suggestions, and a literal repaired
/// INSERT statement with the offending value replaced by the first
/// candidate (falling back to a plain placeholder when the parent table is
/// empty).
pub fn suggest_fk_violation(
    child_table: &str,
    child_column: &str,
    ref_table: &str,
    ref_column: &str,
    value: &str,
    insert_values: &[String],
    existing: &[String],
) -> String {
    let candidates = format_candidates(existing);
    let mut hint = format!(
        "{HINT_PREFIX}外键约束失败：{child_table}.{child_column} = {value} 在 {ref_table}.{ref_column} 中不存在。\n\
         现有取值：{candidates}\n\
         建议：先执行 INSERT INTO {ref_table} ({ref_column}) VALUES ({value}); 再重试此语句；"
    );
    if let Some(existing_value) = existing.first() {
        let repaired: Vec<String> = insert_values
            .iter()
            .map(|v| if v == value { existing_value.clone() } else { v.clone() })
            .collect();
        hint.push_str(&format!(
            "或改用已存在的值：INSERT INTO {child_table} VALUES ({});",
            repaired.join(", ")
        ));
    }
    hint
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_matches_known_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn nearest_finds_close_typo() {
        let candidates = vec!["SELECT", "INSERT", "UPDATE"];
        assert_eq!(nearest("SELET", candidates), Some("SELECT"));
    }

    #[test]
    fn nearest_returns_none_when_too_far() {
        let candidates = vec!["SELECT", "INSERT"];
        assert_eq!(nearest("ZZZZZZZZZZ", candidates), None);
    }

    #[test]
    fn candidate_list_truncates_past_ten() {
        let many: Vec<String> = (0..15).map(|i| format!("col{i}")).collect();
        let rendered = format_candidates(&many);
        assert!(rendered.ends_with("...]"));
    }

    #[test]
    fn hint_carries_chinese_prefix() {
        let hint = suggest_expected_vs_got(&["FROM".to_string()], "FORM");
        assert!(hint.starts_with(HINT_PREFIX));
        assert!(hint.contains("FROM"));
    }

    #[test]
    fn fk_violation_hint_names_the_failing_constraint_and_offers_a_repair() {
        let hint = suggest_fk_violation(
            "employees",
            "dept_id",
            "departments",
            "dept_id",
            "999",
            &["100".to_string(), "'Zoe'".to_string(), "999".to_string()],
            &["1".to_string()],
        );
        assert!(hint.starts_with(HINT_PREFIX));
        assert!(hint.contains("外键约束失败"));
        assert!(hint.contains("employees.dept_id = 999"));
        assert!(hint.contains("INSERT INTO employees VALUES (100, 'Zoe', 1);"));
    }
}
