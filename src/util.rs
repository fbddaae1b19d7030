//! Small string helpers shared by the framework.

/// Joins an array of strings into one, inserting `separator` between entries.
pub fn join_lines(lines: &[String], separator: char) -> String {
    let mut joined = String::new();
    for line in lines {
        if !joined.is_empty() {
            joined.push(separator);
        }
        joined.push_str(line);
    }
    joined
}

/// Splits `line` on `delimiter`, trimming leading whitespace from each token.
///
/// At most `max_tokens` tokens are returned; `0` means no limit.
pub fn parse_tokens(line: &str, delimiter: char, max_tokens: usize) -> Vec<String> {
    let cap = if max_tokens == 0 { usize::MAX } else { max_tokens };
    let mut tokens = Vec::new();
    for token in line.split(delimiter) {
        if tokens.len() == cap {
            break;
        }
        tokens.push(token.trim_start().to_string());
    }
    tokens
}

/// Collects the process arguments with the program name dropped, which is the
/// form the framework's configuration expects.
pub fn argv_without_program() -> Vec<String> {
    std::env::args().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_inserts_separator_between_entries_only() {
        let lines = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(join_lines(&lines, '\n'), "a\nb\nc");
        assert_eq!(join_lines(&[], '\n'), "");
        assert_eq!(join_lines(&lines[..1], '\n'), "a");
    }

    #[test]
    fn parse_respects_token_cap() {
        let tokens = parse_tokens("one,two,three", ',', 2);
        assert_eq!(tokens, vec!["one".to_string(), "two".to_string()]);
        let all = parse_tokens("one, two, three", ',', 0);
        assert_eq!(
            all,
            vec!["one".to_string(), "two".to_string(), "three".to_string()]
        );
    }
}
