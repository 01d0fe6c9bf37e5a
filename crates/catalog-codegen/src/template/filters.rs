//! Identifier case conversion, exposed to templates as filters.

/// `user_account`, `UserAccount`, `userAccount` -> `user_account`.
pub fn snake_case(value: String) -> String {
    words(&value).join("_")
}

/// `user_account` -> `UserAccount`.
pub fn pascal_case(value: String) -> String {
    words(&value).iter().map(|w| capitalize(w)).collect()
}

/// `user_account` -> `userAccount`.
pub fn camel_case(value: String) -> String {
    let words = words(&value);
    let mut out = String::new();
    for (i, w) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.push_str(&capitalize(w));
        }
    }
    out
}

/// Escape Rust reserved keywords with the `r#` prefix.
///
/// `self`, `Self`, `super` and `crate` cannot be raw identifiers and get a
/// trailing underscore instead.
pub fn escape_ident(name: &str) -> String {
    const RUST_KEYWORDS: &[&str] = &[
        "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
        "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
        "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use",
        "where", "while", "abstract", "become", "box", "do", "final", "macro", "override",
        "priv", "try", "typeof", "unsized", "virtual", "yield", "gen",
    ];

    match name {
        "self" | "Self" | "super" | "crate" => format!("{}_", name),
        _ if RUST_KEYWORDS.contains(&name) => format!("r#{}", name),
        _ if name.starts_with(|c: char| c.is_ascii_digit()) => format!("_{}", name),
        _ => name.to_string(),
    }
}

/// Split on separators and case boundaries into lowercase words.
fn words(value: &str) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // "userAccount" and the "R" in "HTTPRequest"
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
