//! Placeholder rendering for webhook fields.
//!
//! Target configurations embed `{{Username}}`-style placeholders in URLs,
//! bodies and header values. `{{ .Username }}` (leading dot, padding) is
//! accepted too so configurations written for the upstream sidecar keep
//! working. Unknown variables render as the empty string; an unterminated
//! `{{` is a syntax error.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TemplateError {
    #[error("unterminated '{{{{' at byte {0}")]
    Unterminated(usize),
}

/// Render `template`, substituting `{{Var}}` placeholders from `data`.
pub fn render(
    template: &str,
    data: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(TemplateError::Unterminated(offset + start));
        };

        let name = after[..end].trim().trim_start_matches('.');
        if let Some(value) = data.get(name) {
            out.push_str(value);
        }

        offset += start + 2 + end + 2;
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Merge a target's own variables with the event dataset. Target variables
/// take precedence on key collision.
pub fn merge_vars(
    env: &HashMap<String, String>,
    vars: &[(&str, &str)],
) -> HashMap<String, String> {
    let mut data: HashMap<String, String> =
        vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    for (key, value) in env {
        data.insert(key.clone(), value.clone());
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_render_basic() {
        let vars = data(&[("Username", "alice"), ("Password", "pw")]);

        assert_eq!(
            render("user={{Username}} pass={{Password}}", &vars).unwrap(),
            "user=alice pass=pw"
        );
        assert_eq!(render("no placeholders", &vars).unwrap(), "no placeholders");
        assert_eq!(render("", &vars).unwrap(), "");
    }

    #[test]
    fn test_render_dot_and_padding() {
        let vars = data(&[("Username", "alice")]);

        assert_eq!(render("{{.Username}}", &vars).unwrap(), "alice");
        assert_eq!(render("{{ Username }}", &vars).unwrap(), "alice");
        assert_eq!(render("{{ .Username }}", &vars).unwrap(), "alice");
    }

    #[test]
    fn test_render_unknown_is_empty() {
        let vars = data(&[("Username", "alice")]);
        assert_eq!(render("x{{Missing}}y", &vars).unwrap(), "xy");
    }

    #[test]
    fn test_render_unterminated() {
        let vars = data(&[]);
        assert_eq!(
            render("abc{{Oops", &vars),
            Err(TemplateError::Unterminated(3))
        );
    }

    #[test]
    fn test_merge_precedence() {
        let env = data(&[("Username", "override"), ("Realm", "internal")]);
        let merged = merge_vars(&env, &[("Username", "alice"), ("Password", "pw")]);

        // Target variables win on collision.
        assert_eq!(merged.get("Username").unwrap(), "override");
        assert_eq!(merged.get("Password").unwrap(), "pw");
        assert_eq!(merged.get("Realm").unwrap(), "internal");
    }
}
