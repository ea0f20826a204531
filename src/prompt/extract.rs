//! SQL extraction from generator replies
//!
//! Replies arrive as bare SQL, fenced markdown, or SQL wrapped in prose. The
//! statement starts at the first `SELECT`, `WITH` or `EXPLAIN` keyword that
//! really opens a statement and ends at the first `;` outside a literal, a
//! blank line, a line of trailing prose, or the end of the text.

/// Lines that mark the end of the statement and the start of commentary
const PROSE_MARKERS: &[&str] = &["Note:", "Explanation:", "This ", "Here"];

/// Single-line SQL statement from `reply`, `None` when there is none.
///
/// `<name><sample_suffix>` identifiers are rewritten to `<name>` so mock
/// sample tables are never queried.
pub fn extract_sql(reply: &str, sample_suffix: &str) -> Option<String> {
    let candidates = [fenced_block(reply), Some(reply)];
    for text in candidates.into_iter().flatten() {
        if let Some(start) = statement_start(text) {
            let sql = normalize(&text[start..], sample_suffix);
            if !sql.is_empty() {
                return Some(sql);
            }
        }
    }
    None
}

/// Body of the first ``` fence, language tag removed
fn fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after_tag = &reply[open + 3..];
    let body_start = after_tag.find('\n').map(|n| n + 1).unwrap_or(after_tag.len());
    let body = &after_tag[body_start..];
    Some(match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    })
}

/// Byte offset of the first keyword that opens a read statement
fn statement_start(text: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if in_string {
            if c == '\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '\'' {
            // apostrophes inside words ("here's") are not quotes
            let inside_word = i > 0
                && chars[i - 1].1.is_alphanumeric()
                && chars.get(i + 1).is_some_and(|(_, n)| n.is_alphanumeric());
            in_string = !inside_word;
            i += 1;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let end = chars.get(i).map(|(b, _)| *b).unwrap_or(text.len());
            if opens_statement(&text[pos..end], &text[end..]) {
                return Some(pos);
            }
            continue;
        }
        i += 1;
    }
    None
}

fn opens_statement(word: &str, rest: &str) -> bool {
    if word.eq_ignore_ascii_case("SELECT") {
        return true;
    }
    if word.eq_ignore_ascii_case("EXPLAIN") {
        let rest = rest.trim_start();
        return ["QUERY", "SELECT", "WITH"]
            .iter()
            .any(|k| strip_keyword(rest, k).is_some());
    }
    if word.eq_ignore_ascii_case("WITH") {
        return looks_like_cte(rest);
    }
    false
}

/// `[RECURSIVE] name [(columns)] AS [NOT] [MATERIALIZED] (`
fn looks_like_cte(after_with: &str) -> bool {
    let mut rest = after_with.trim_start();
    if let Some(r) = strip_keyword(rest, "RECURSIVE") {
        rest = r.trim_start();
    }
    let name_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '"'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return false;
    }
    rest = rest[name_len..].trim_start();
    if rest.starts_with('(') {
        match rest.find(')') {
            Some(close) => rest = rest[close + 1..].trim_start(),
            None => return false,
        }
    }
    let Some(mut rest) = strip_keyword(rest, "AS").map(str::trim_start) else {
        return false;
    };
    for optional in ["NOT", "MATERIALIZED"] {
        if let Some(r) = strip_keyword(rest, optional) {
            rest = r.trim_start();
        }
    }
    rest.starts_with('(')
}

/// Text after `keyword` when `text` starts with it as a whole word
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    let tail = &text[keyword.len()..];
    let boundary = tail.chars().next().map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
    (head.eq_ignore_ascii_case(keyword) && boundary).then_some(tail)
}

/// Statement from `text` on one line: comments removed, whitespace collapsed
/// outside literals, sample tables rewritten.
fn normalize(text: &str, sample_suffix: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' && statement_ends_after_newline(&chars[i + 1..]) {
            break;
        }
        if c.is_whitespace() {
            space = true;
            i += 1;
            continue;
        }
        if c == '`' && chars.get(i + 1) == Some(&'`') {
            break;
        }
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            space = true;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            space = true;
            continue;
        }

        if space && !out.is_empty() && c != ';' {
            out.push(' ');
        }
        space = false;

        match c {
            ';' => {
                out.push(';');
                break;
            }
            '\'' => {
                let end = quoted_end(&chars, i, '\'');
                out.extend(&chars[i..end]);
                i = end;
            }
            '"' => {
                let end = quoted_end(&chars, i, '"');
                let inner: String = chars[i + 1..end.saturating_sub(1).max(i + 1)].iter().collect();
                out.push('"');
                out.push_str(&without_sample_suffix(&inner, sample_suffix));
                out.push('"');
                i = end;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(&without_sample_suffix(&word, sample_suffix));
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    out.trim_end().to_string()
}

/// A blank line or a line of commentary closes the statement
fn statement_ends_after_newline(rest: &[char]) -> bool {
    let line: String = rest.iter().take_while(|c| **c != '\n').collect();
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    PROSE_MARKERS.iter().any(|m| trimmed.starts_with(m))
}

/// Index just past the closing quote, or the end of input
fn quoted_end(chars: &[char], open_at: usize, quote: char) -> usize {
    let mut i = open_at + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn without_sample_suffix(identifier: &str, suffix: &str) -> String {
    if suffix.is_empty() || identifier.len() <= suffix.len() {
        return identifier.to_string();
    }
    let split = identifier.len() - suffix.len();
    match (identifier.get(..split), identifier.get(split..)) {
        (Some(base), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => base.to_string(),
        _ => identifier.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_statement() {
        assert_eq!(
            extract_sql("SELECT name\nFROM   products\nLIMIT 5;", "_sample").as_deref(),
            Some("SELECT name FROM products LIMIT 5;")
        );
    }

    #[test]
    fn test_fenced_reply_with_prose() {
        let reply = concat!(
            "Here's the query you asked for:\n",
            "```sql\nSELECT p.name, p.price\n  FROM products p\n",
            " ORDER BY p.price DESC\n LIMIT 5;\n```\n",
            "This returns the five most expensive products.",
        );
        assert_eq!(
            extract_sql(reply, "_sample").as_deref(),
            Some("SELECT p.name, p.price FROM products p ORDER BY p.price DESC LIMIT 5;")
        );
    }

    #[test]
    fn test_prose_without_fence() {
        let reply = concat!(
            "Sure! Here's what I'd run:\n",
            "select count(*) from users\nwhere email like '%@example.com'\n\n",
            "Note: counts every user.",
        );
        assert_eq!(
            extract_sql(reply, "_sample").as_deref(),
            Some("select count(*) from users where email like '%@example.com'")
        );
    }

    #[test]
    fn test_with_in_prose_is_not_a_statement() {
        let reply = concat!(
            "Start with the orders table: ",
            "WITH recent AS (SELECT * FROM orders) SELECT * FROM recent",
        );
        assert_eq!(
            extract_sql(reply, "_sample").as_deref(),
            Some("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent")
        );
    }

    #[test]
    fn test_stops_at_first_semicolon_outside_literals() {
        let reply = "SELECT 'a;  b' AS x FROM users; DROP TABLE users;";
        assert_eq!(
            extract_sql(reply, "_sample").as_deref(),
            Some("SELECT 'a;  b' AS x FROM users;")
        );
    }

    #[test]
    fn test_comments_are_removed() {
        let reply = "SELECT name -- the product name\nFROM products /* all of them */ LIMIT 3";
        assert_eq!(
            extract_sql(reply, "_sample").as_deref(),
            Some("SELECT name FROM products LIMIT 3")
        );
    }

    #[test]
    fn test_sample_tables_are_rewritten() {
        let reply = concat!(
            "SELECT * FROM Products_SAMPLE ps ",
            "JOIN \"orders_sample\" o ON o.product_id = ps.product_id",
        );
        assert_eq!(
            extract_sql(reply, "_sample").as_deref(),
            Some("SELECT * FROM Products ps JOIN \"orders\" o ON o.product_id = ps.product_id")
        );
    }

    #[test]
    fn test_explain_must_precede_a_statement() {
        assert_eq!(
            extract_sql("Let me explain: EXPLAIN QUERY PLAN SELECT 1", "_sample").as_deref(),
            Some("EXPLAIN QUERY PLAN SELECT 1")
        );
    }

    #[test]
    fn test_no_statement() {
        assert_eq!(extract_sql("I cannot answer that question.", "_sample"), None);
        assert_eq!(extract_sql("", "_sample"), None);
        assert_eq!(extract_sql("```\n```", "_sample"), None);
    }
}
