//! Slack mrkdwn helpers.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| compile_tag(r"<br\s*/?>"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| compile_tag(r"</?(?:b|strong)(?:\s[^>]*)?>"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| compile_tag(r"</?(?:i|em)(?:\s[^>]*)?>"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| compile_tag(r"</?[a-z][a-z0-9]*(?:\s[^>]*)?/?>"));

fn compile_tag(pattern: &str) -> Regex {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => regex,
        Err(err) => panic!("invalid html pattern `{pattern}`: {err}"),
    }
}

/// Converts the light HTML found in commentary texts to Slack mrkdwn.
///
/// `&amp;`, `&lt;` and `&gt;` stay escaped; Slack expects them that way.
pub fn slackify_html(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = BOLD.replace_all(&text, "*");
    let text = ITALIC.replace_all(&text, "_");
    let text = ANY_TAG.replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .trim()
        .to_owned()
}

pub fn user_mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

pub fn code_block(text: &str) -> String {
    format!("```\n{text}\n```")
}
