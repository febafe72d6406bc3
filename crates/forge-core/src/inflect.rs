//! English inflection for naming conventions.
//!
//! Table names default to the snake-cased, pluralized model name
//! (`BlogPost` -> `blog_posts`) and foreign keys to the singular table name
//! plus `_id`. The rules cover regular nouns plus a short irregular table.

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
];

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "news",
    "data",
    "metadata",
];

/// Convert `CamelCase` (or `mixedCase`) to `snake_case`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Pluralize the last word of a snake_case name.
pub fn pluralize(word: &str) -> String {
    let (prefix, last) = split_last_word(word);
    format!("{prefix}{}", pluralize_word(last))
}

/// Singularize the last word of a snake_case name.
pub fn singularize(word: &str) -> String {
    let (prefix, last) = split_last_word(word);
    format!("{prefix}{}", singularize_word(last))
}

fn split_last_word(word: &str) -> (&str, &str) {
    match word.rfind('_') {
        Some(idx) => (&word[..=idx], &word[idx + 1..]),
        None => ("", word),
    }
}

fn pluralize_word(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
        return word.to_string();
    }
    let chars: Vec<char> = lower.chars().collect();
    let last = chars[chars.len() - 1];
    let before_last = chars.len().checked_sub(2).map(|i| chars[i]);

    if last == 'y' && before_last.is_some_and(|c| !is_vowel(c)) {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn singularize_word(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if word.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return (*singular).to_string();
    }
    if let Some(stem) = lower.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", &word[..word.len() - 3]);
        }
    }
    for suffix in ["sses", "xes", "zes", "ches", "shes"] {
        if lower.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if lower.ends_with('s') && !lower.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Default table name for a Rust type name such as `my_app::models::BlogPost`.
pub fn table_name_for(type_name: &str) -> String {
    let short = type_name
        .rsplit("::")
        .next()
        .unwrap_or(type_name)
        .split('<')
        .next()
        .unwrap_or(type_name);
    pluralize(&snake_case(short))
}

/// Default foreign key pointing at `table` (`users` -> `user_id`).
pub fn foreign_key_for(table: &str) -> String {
    format!("{}_id", singularize(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("User"), "user");
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("HTTPRequest"), "http_request");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("blog_post"), "blog_posts");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("news"), "news");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("blog_posts"), "blog_post");
    }

    #[test]
    fn test_table_name_for_type() {
        assert_eq!(table_name_for("app::models::BlogPost"), "blog_posts");
        assert_eq!(table_name_for("User"), "users");
        assert_eq!(foreign_key_for("users"), "user_id");
        assert_eq!(foreign_key_for("categories"), "category_id");
    }
}
