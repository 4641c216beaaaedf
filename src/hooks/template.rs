// src/hooks/template.rs

//! `<token>` substitution for hook command lines.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::HookData;

static TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<([A-Za-z0-9_]+)>").ok());

/// Replace every `<key>` whose key is present in `data`.
///
/// Unknown tokens are left untouched, and substituted values are never
/// rescanned.
pub fn substitute(template: &str, data: &HookData) -> String {
    let Some(token) = TOKEN.as_ref() else {
        return template.to_string();
    };
    token
        .replace_all(template, |caps: &Captures<'_>| match data.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
