//! Late-bound text templates.
//!
//! Outgoing text may reference `{{vars.name}}`, `{{ vars.name.path }}` or
//! `{{responses.key}}`. References are resolved every time a message is sent,
//! so a thread defined before a variable exists still renders it once the
//! variable is set. Unknown references render as the empty string.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::convo::session::{Responses, Variables};

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z0-9_.]+)\s*\}\}"));

pub fn render(template: &str, vars: &Variables, responses: &Responses) -> String {
    REFERENCE
        .replace_all(template, |captures: &Captures<'_>| {
            let path = &captures[2];
            match &captures[1] {
                "vars" => vars.lookup_path(path).map(value_to_text).unwrap_or_default(),
                "responses" => responses.get(path).cloned().unwrap_or_default(),
                _ => String::new(),
            }
        })
        .into_owned()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", ")
        }
        other => other.to_string(),
    }
}

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("invalid template reference pattern `{pattern}`: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::render;
    use crate::convo::session::{Responses, Variables};

    #[test]
    fn renders_set_variable() {
        let mut vars = Variables::default();
        vars.set("nickname", "Ari");

        assert_eq!(render("Hello {{vars.nickname}}", &vars, &Responses::new()), "Hello Ari");
    }

    #[test]
    fn unset_variable_renders_empty() {
        let rendered = render("Hello {{vars.nickname}}", &Variables::default(), &Responses::new());
        assert_eq!(rendered, "Hello ");
    }

    #[test]
    fn tolerates_whitespace_and_nested_paths() {
        let mut vars = Variables::default();
        vars.set("curRashi", json!({ "ref": "Rashi on Genesis 1:1:1" }));
        vars.set("rashiLoopCount", 2);

        let rendered = render(
            "```{{ vars.curRashi.ref }}``` seen {{vars.rashiLoopCount}} times",
            &vars,
            &Responses::new(),
        );
        assert_eq!(rendered, "```Rashi on Genesis 1:1:1``` seen 2 times");
    }

    #[test]
    fn renders_captured_responses() {
        let mut responses = Responses::new();
        responses.insert("reference".to_owned(), "Genesis 1:1".to_owned());

        assert_eq!(
            render("Looking up {{responses.reference}}", &Variables::default(), &responses),
            "Looking up Genesis 1:1"
        );
    }

    #[test]
    fn leaves_plain_braces_alone() {
        let rendered = render("{ not a reference } {{nope}}", &Variables::default(), &Responses::new());
        assert_eq!(rendered, "{ not a reference } {{nope}}");
    }
}
