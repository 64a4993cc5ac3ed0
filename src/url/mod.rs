use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_-]+)\}").unwrap());

/// Names of the `{placeholder}`s in a URL template, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    RE_PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute every `{name}` in `template` with `vars[name]`.
///
/// Fails if the template names a placeholder that `vars` does not supply.
/// Extra entries in `vars` are ignored.
pub fn render_template(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut missing = Vec::new();
    let rendered = RE_PLACEHOLDER.replace_all(template, |c: &regex::Captures| {
        match vars.get(&c[1]) {
            Some(v) => v.clone(),
            None => {
                missing.push(c[1].to_string());
                String::new()
            }
        }
    });
    if !missing.is_empty() {
        return Err(Error::UrlParse(format!(
            "template {template} is missing values for: {}",
            missing.join(", ")
        )));
    }
    Ok(rendered.into_owned())
}

/// Flatten the scalar fields of a JSON object into template variables.
/// Nested objects and arrays are skipped; `null` becomes an empty string.
pub fn vars_from_json(value: &serde_json::Value) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    if let Some(obj) = value.as_object() {
        for (k, v) in obj {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => String::new(),
                _ => continue,
            };
            vars.insert(k.clone(), s);
        }
    }
    vars
}

/// Check that a template yields a well-formed absolute URL once every
/// placeholder is filled in.
pub fn validate_template(template: &str) -> Result<()> {
    let vars = placeholders(template)
        .into_iter()
        .map(|p| (p, "0".to_string()))
        .collect();
    let sample = render_template(template, &vars)?;
    url::Url::parse(&sample).map_err(|e| Error::UrlParse(format!("{template}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("https://x.test/{type}/{date-str}.json"),
            vec!["type", "date-str"]
        );
        assert!(placeholders("https://x.test/plain").is_empty());
    }

    #[test]
    fn test_render_template() {
        let url = render_template(
            "https://x.test/puzzle/{type}/{date-str}.json",
            &vars(&[("type", "mini"), ("date-str", "2024-01-02"), ("unused", "x")]),
        )
        .unwrap();
        assert_eq!(url, "https://x.test/puzzle/mini/2024-01-02.json");
    }

    #[test]
    fn test_render_template_missing_var() {
        let err = render_template("https://x.test/{puzzle_id}", &vars(&[])).unwrap_err();
        assert!(err.to_string().contains("puzzle_id"));
    }

    #[test]
    fn test_vars_from_json() {
        let v = serde_json::json!({
            "puzzle_id": 21567,
            "print_date": "2024-01-01",
            "solved": true,
            "author": null,
            "nested": {"a": 1}
        });
        let vars = vars_from_json(&v);
        assert_eq!(vars["puzzle_id"], "21567");
        assert_eq!(vars["print_date"], "2024-01-01");
        assert_eq!(vars["solved"], "true");
        assert_eq!(vars["author"], "");
        assert!(!vars.contains_key("nested"));
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("https://x.test/users/{userId}/stats").is_ok());
        assert!(validate_template("not a url {x}").is_err());
    }
}
