//! Question tokenization

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "did", "do",
    "does", "each", "every", "find", "for", "from", "get", "give", "has", "have", "how", "i", "in",
    "is", "it", "its", "list", "many", "me", "most", "much", "my", "of", "on", "or", "our", "per",
    "please", "show", "than", "that", "the", "their", "there", "these", "this", "those", "to",
    "top", "was", "we", "were", "what", "when", "where", "which", "who", "with", "you",
];

/// Lowercase alphanumeric terms of `text`, stop words and bare numbers removed.
/// Order of first appearance is kept, duplicates are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| t.len() > 1 && !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Singular form for the common English plural endings
pub fn singular(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 4
        && (word.ends_with("ses") || word.ends_with("xes") || word.ends_with("ches"))
    {
        word[..word.len() - 2].to_string()
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Identifier and its singular, lowercased
pub fn forms(word: &str) -> BTreeSet<String> {
    let lower = word.to_ascii_lowercase();
    let mut set = BTreeSet::new();
    set.insert(singular(&lower));
    set.insert(lower);
    set
}

/// True when `a` and `b` share a form (`products` ~ `product`)
pub fn same_word(a: &str, b: &str) -> bool {
    let fa = forms(a);
    forms(b).iter().any(|f| fa.contains(f))
}

/// Underscore-separated parts of an identifier (`order_items` -> `order`, `items`)
pub fn identifier_parts(name: &str) -> Vec<String> {
    name.split('_')
        .filter(|p| !p.is_empty())
        .map(|p| p.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_numbers() {
        assert_eq!(
            tokenize("Top 5 most expensive Products!"),
            vec!["expensive".to_string(), "products".to_string()]
        );
        assert_eq!(tokenize("users, USERS and user_ids"), vec!["users", "user", "ids"]);
        assert!(tokenize("  ?? 42 ").is_empty());
    }

    #[test]
    fn test_singular_forms() {
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("products"), "product");
        assert_eq!(singular("boxes"), "box");
        assert_eq!(singular("address"), "address");
        assert_eq!(singular("bus"), "bus");
        assert!(same_word("orders", "order"));
        assert!(!same_word("orders", "users"));
    }

    #[test]
    fn test_identifier_parts() {
        assert_eq!(identifier_parts("order_items"), vec!["order", "items"]);
        assert_eq!(identifier_parts("users"), vec!["users"]);
    }
}
