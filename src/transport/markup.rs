//! Plain-text conversion of HTML bodies

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]*>").expect("valid tag regex");
}

/// Remove every `<...>` span from `html`.
///
/// Text between tags is kept as-is, including surrounding whitespace.
pub fn strip_markup(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}
