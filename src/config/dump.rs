//! Rendering the current flag values as a config file.

use super::parser::quote_value;
use crate::registry::FlagRegistry;
use std::collections::BTreeSet;

/// Characters dropped from usage text so it stays a single-line comment
/// that reads back cleanly.
const STRIPPED: &[char] = &[
    '\t', '\u{0b}', '\u{0c}', '\u{08}', '\u{07}', '\\', '"', // control and quoting
    '\u{b2}', '\u{b3}', '\u{b9}', '\u{2070}', '\u{2074}', '\u{2075}', '\u{2076}', '\u{2077}',
    '\u{2078}', '\u{2079}', // superscript digits
];

/// Render every flag not in `excluded` as `name = value  # usage`, one per
/// line, ordered by flag name.
pub fn dump_flags(registry: &dyn FlagRegistry, excluded: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for flag in registry.flags() {
        if excluded.contains(&flag.name) {
            continue;
        }
        out.push_str(&format!(
            "{} = {}  # {}\n",
            flag.name,
            quote_value(&flag.value),
            escape_usage(&flag.usage)
        ));
    }
    out
}

/// Make usage text safe to put after a `#` marker.
///
/// Newlines continue the comment on an indented `#` line.
pub fn escape_usage(usage: &str) -> String {
    usage
        .replace('\n', "\n    # ")
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .collect()
}
