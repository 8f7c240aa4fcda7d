//! Small text utilities shared by the analyzers and the slot mapper.

/// Split into trimmed, non-empty sentences on `.`, `!`, `?` (when followed by whitespace or the
/// end of text) and on line breaks.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if end {
            push_sentence(&mut out, &text[start..i]);
            start = i + c.len_utf8();
        }
    }
    push_sentence(&mut out, &text[start..]);
    out
}

fn push_sentence<'t>(out: &mut Vec<&'t str>, candidate: &'t str) {
    let trimmed = candidate
        .trim()
        .trim_matches(|c: char| matches!(c, '.' | '!' | '?'))
        .trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

/// Word tokens: runs of alphanumerics plus inner apostrophes and hyphens.
pub fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '(' | ')' | '"'))
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '[' && c != ']'))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lower-case and collapse runs of whitespace to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-case the first character.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip trailing sentence punctuation and whitespace.
pub fn trim_sentence(text: &str) -> &str {
    text.trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',' | ';' | ':'))
        .trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sentences_on_terminators_and_newlines() {
        let got = sentences("First one. Second one!  Third?\nFourth");
        assert_eq!(got, vec!["First one", "Second one", "Third", "Fourth"]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        assert_eq!(sentences("Version 2.5 is out."), vec!["Version 2.5 is out"]);
    }

    #[test]
    fn words_drop_punctuation() {
        assert_eq!(
            words("Hello, world: it's \"fine\" (really)."),
            vec!["Hello", "world", "it's", "fine", "really"]
        );
    }

    #[test]
    fn words_keep_placeholders_whole() {
        assert_eq!(words("about [REDACTED]."), vec!["about", "[REDACTED]"]);
    }

    #[test]
    fn normalize_and_capitalize() {
        assert_eq!(normalize("  Hello   WORLD \n again"), "hello world again");
        assert_eq!(capitalize("prepare for exam"), "Prepare for exam");
        assert_eq!(capitalize(""), "");
        assert_eq!(trim_sentence("Do it now!! "), "Do it now");
    }
}
