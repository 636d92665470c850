//! Helpers for command logging and project identity.

/// Length of the (possibly quoted) value token at the start of `s`.
///
/// Stops at the first unquoted whitespace; backslash escapes and both
/// quote styles are honored so a quoted token masks as one unit.
fn value_len(s: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            _ if quote == Some(c) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(c),
            _ if quote.is_none() && c.is_whitespace() => return idx,
            _ => {}
        }
    }
    s.len()
}

/// Mask scanner credentials in a command line before logging it.
///
/// Keeps the flag or variable name, replaces the value with `***`.
pub fn mask_credentials(cmd: &str) -> String {
    const PATTERNS: &[(&str, &str)] = &[
        ("-Dsonar.login=", "-Dsonar.login=***"),
        ("-Dsonar.token=", "-Dsonar.token=***"),
        ("-Dsonar.password=", "-Dsonar.password=***"),
        ("SONAR_TOKEN=", "SONAR_TOKEN=***"),
        ("--token=", "--token=***"),
        ("--token ", "--token ***"),
    ];

    let mut result = cmd.to_string();
    for (pattern, replacement) in PATTERNS {
        let mut from = 0;
        while let Some(found) = result[from..].find(pattern) {
            let start = from + found;
            let value_start = start + pattern.len();
            let value_end = value_start + value_len(&result[value_start..]);
            result.replace_range(start..value_end, replacement);
            from = start + replacement.len();
        }
    }
    result
}

/// Project key for the scanner: repository basename with any
/// version-control suffix stripped.
pub fn project_key_from_repo(repository: &str) -> String {
    let trimmed = repository.trim_end_matches('/');
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let base = base.rsplit(':').next().unwrap_or(base);
    base.strip_suffix(".git").unwrap_or(base).to_string()
}

/// Make a string safe for use in scan ids and directory names.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
