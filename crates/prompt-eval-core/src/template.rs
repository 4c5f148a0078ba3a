//! Placeholder substitution for candidate prompts.
//!
//! Tokens are literal strings such as `{name}`. Expansion is a single
//! left-to-right pass over the template: substituted values are never
//! scanned again, so a value containing `{age}` stays as written. Text
//! that matches no token (including unknown placeholders) is copied
//! through unchanged.

pub const NAME: &str = "{name}";
pub const AGE: &str = "{age}";
pub const ABOUT_ME: &str = "{about_me}";
pub const CONVERSATION_TYPE: &str = "{conversation_type}";
pub const SETTING: &str = "{setting}";
pub const TONE: &str = "{tone}";
pub const UTTERANCE: &str = "{utterance}";

/// Tokens a test case supplies, in substitution order.
pub const PLACEHOLDERS: [&str; 7] = [
    NAME,
    AGE,
    ABOUT_ME,
    CONVERSATION_TYPE,
    SETTING,
    TONE,
    UTTERANCE,
];

/// Replace every occurrence of each token in `template` with its value.
///
/// When two tokens match at the same position the earlier entry in
/// `fields` wins. Empty tokens are ignored.
pub fn expand<K, V>(template: &str, fields: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let fields: Vec<(&str, &str)> = fields
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, _)| !k.is_empty())
        .collect();

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while !rest.is_empty() {
        for (token, value) in &fields {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_name_and_age() {
        let out = expand("Hi {name}, age {age}", &[(NAME, "Alice"), (AGE, "5")]);
        assert_eq!(out, "Hi Alice, age 5");
    }

    #[test]
    fn replaces_every_occurrence() {
        let out = expand("{tone}! {tone}? {tone}.", &[(TONE, "warm")]);
        assert_eq!(out, "warm! warm? warm.");
    }

    #[test]
    fn unknown_placeholders_left_verbatim() {
        let out = expand("{name} likes {hobby}", &[(NAME, "Ana")]);
        assert_eq!(out, "Ana likes {hobby}");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let out = expand("{name} / {age}", &[(NAME, "{age}"), (AGE, "41")]);
        assert_eq!(out, "{age} / 41");
    }

    #[test]
    fn no_tokens_returns_template() {
        let fields: [(&str, &str); 0] = [];
        assert_eq!(expand("plain text", &fields), "plain text");
    }

    #[test]
    fn empty_token_ignored() {
        assert_eq!(expand("abc", &[("", "x")]), "abc");
    }

    #[test]
    fn multibyte_text_preserved() {
        let out = expand("¡Hola {name}! 👋", &[(NAME, "José")]);
        assert_eq!(out, "¡Hola José! 👋");
    }

    #[test]
    fn earlier_field_wins_on_overlap() {
        let out = expand("{name}", &[("{name}", "first"), ("{na", "second")]);
        assert_eq!(out, "first");
    }
}
