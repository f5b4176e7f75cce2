//! INI dialect tokenizer.
//!
//! Turns decoded lines into an ordered list of [`Directive`]s:
//! - `# comment` / `; comment` lines become the comment of the next directive
//! - `[section]` headers and blank lines reset the pending comment
//! - `key = value` and `key = "quoted value"` emit a directive
//! - `key{delim} = part` lines with the same base name are joined
//! - `#import "path"` splices the imported source in place

use super::decoder::Line;
use crate::error::{ConfigError, Result};
use serde::Serialize;

/// One key/value pair read from a config source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub key: String,
    pub value: String,
    /// Identifier of the source the directive came from.
    pub source: String,
    pub line: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// Parse the lines of one source.
///
/// `on_import` is called with the raw import path and the line number of
/// every import directive, and returns the directives of the imported
/// source.
pub fn parse_lines<I, F>(lines: I, source_id: &str, mut on_import: F) -> Result<Vec<Directive>>
where
    I: IntoIterator<Item = Result<Line>>,
    F: FnMut(&str, usize) -> Result<Vec<Directive>>,
{
    let mut directives = Vec::new();
    let mut comment = String::new();
    let mut multiline: Option<Directive> = None;

    for line in lines {
        let line = line?;
        let text = line.text.trim();

        if let Some(raw_path) = import_path(text) {
            let (path, _) = unquote_value(raw_path, source_id, line.number)?;
            if path.is_empty() {
                return Err(ConfigError::syntax(
                    source_id,
                    line.number,
                    "empty import path",
                ));
            }
            directives.extend(multiline.take());
            directives.extend(on_import(&path, line.number)?);
            continue;
        }
        if text.is_empty() || text.starts_with('[') {
            comment.clear();
            continue;
        }
        if let Some(rest) = text.strip_prefix('#').or_else(|| text.strip_prefix(';')) {
            comment = rest.trim().to_string();
            continue;
        }

        let Some((key, raw_value)) = text.split_once('=') else {
            return Err(ConfigError::syntax(
                source_id,
                line.number,
                format!("cannot split [{}] into key and value", text),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::syntax(
                source_id,
                line.number,
                format!("missing key in [{}]", text),
            ));
        }
        let (value, trailing) = unquote_value(raw_value, source_id, line.number)?;
        if comment.is_empty() {
            comment = trailing;
        }

        let directive = Directive {
            key: key.to_string(),
            value,
            source: source_id.to_string(),
            line: line.number,
            comment: std::mem::take(&mut comment),
        };

        match split_multiline_key(key, source_id, line.number)? {
            None => {
                directives.extend(multiline.take());
                directives.push(directive);
            }
            Some((base, delimiter)) => match multiline.as_mut() {
                Some(pending) if pending.key == base => {
                    pending.value.push_str(delimiter);
                    pending.value.push_str(&directive.value);
                }
                _ => {
                    directives.extend(multiline.take());
                    multiline = Some(Directive {
                        key: base.to_string(),
                        ..directive
                    });
                }
            },
        }
    }

    directives.extend(multiline);
    Ok(directives)
}

/// Path part of an `#import "path"` line, if the line is one.
fn import_path(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('#').or_else(|| text.strip_prefix(';'))?;
    let rest = rest.strip_prefix("import")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Split `name{delim}` into `(name, delim)`. Plain keys yield `None`.
fn split_multiline_key<'a>(
    key: &'a str,
    source_id: &str,
    line: usize,
) -> Result<Option<(&'a str, &'a str)>> {
    let Some(inner) = key.strip_suffix('}') else {
        return Ok(None);
    };
    let Some(open) = inner.rfind('{') else {
        return Err(ConfigError::syntax(
            source_id,
            line,
            format!("cannot find '{{' in the multiline key [{}]", key),
        ));
    };
    let base = inner[..open].trim();
    if base.is_empty() {
        return Err(ConfigError::syntax(
            source_id,
            line,
            format!("missing name in the multiline key [{}]", key),
        ));
    }
    Ok(Some((base, &inner[open + 1..])))
}

/// Split the right-hand side of a key line into `(value, trailing_comment)`.
pub fn unquote_value(raw: &str, source_id: &str, line: usize) -> Result<(String, String)> {
    let v = raw.trim();
    if v.is_empty() {
        return Ok((String::new(), String::new()));
    }

    let Some(body) = v.strip_prefix('"') else {
        return Ok(split_unquoted(v));
    };

    let mut value = String::new();
    let mut chars = body.char_indices();
    let mut close = None;
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => value.push('\\'),
            },
            '"' => {
                close = Some(i);
                break;
            }
            _ => value.push(c),
        }
    }
    let Some(close) = close else {
        return Err(ConfigError::syntax(
            source_id,
            line,
            format!("unclosed string found [{}]", v),
        ));
    };

    let rest = &body[close + 1..];
    let comment = rest
        .find(['#', ';'])
        .map(|pos| rest[pos + 1..].trim().to_string())
        .unwrap_or_default();
    Ok((value, comment))
}

fn split_unquoted(v: &str) -> (String, String) {
    let mut value = String::new();
    let mut chars = v.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some(&(_, marker @ ('#' | ';'))) = chars.peek() {
                    chars.next();
                    value.push(marker);
                } else {
                    value.push('\\');
                }
            }
            '#' | ';' => {
                return (value.trim().to_string(), v[i + 1..].trim().to_string());
            }
            _ => value.push(c),
        }
    }
    (value.trim().to_string(), String::new())
}

/// Quote a value for writing it back into a config file, if needed.
pub fn quote_value(v: &str) -> String {
    let needs_quotes = v.contains(['\n', '#', ';'])
        || v.starts_with('"')
        || v.trim() != v;
    if !needs_quotes {
        return v.to_string();
    }
    let escaped = v
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::decoder::LineDecoder;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Vec<Directive>> {
        let lines = LineDecoder::new(Cursor::new(text.as_bytes().to_vec()), "test.ini");
        parse_lines(lines, "test.ini", |path, _| {
            Ok(vec![Directive {
                key: "imported".into(),
                value: path.to_string(),
                source: path.to_string(),
                line: 1,
                comment: String::new(),
            }])
        })
    }

    fn pairs(directives: &[Directive]) -> Vec<(&str, &str)> {
        directives
            .iter()
            .map(|d| (d.key.as_str(), d.value.as_str()))
            .collect()
    }

    #[test]
    fn test_basic_key_values() {
        let d = parse("a = 1\n  b=two words  \n[section]\nc =\n").unwrap();
        assert_eq!(pairs(&d), vec![("a", "1"), ("b", "two words"), ("c", "")]);
        assert_eq!(d[1].line, 2);
        assert_eq!(d[1].source, "test.ini");
    }

    #[test]
    fn test_leading_comment_wins_over_trailing() {
        let d = parse("# leading\na = 1 # trailing\nb = 2 ; only trailing\n").unwrap();
        assert_eq!(d[0].comment, "leading");
        assert_eq!(d[1].comment, "only trailing");
        assert_eq!(d[1].value, "2");
    }

    #[test]
    fn test_blank_line_and_section_reset_comment() {
        let d = parse("# lost\n\na = 1\n; lost too\n[s]\nb = 2\n").unwrap();
        assert_eq!(d[0].comment, "");
        assert_eq!(d[1].comment, "");
    }

    #[test]
    fn test_multiline_join() {
        let d = parse("m{,} = line1\nm{,} = line2\nm{|} = line3\nm{} = line4\n").unwrap();
        assert_eq!(pairs(&d), vec![("m", "line1,line2|line3line4")]);
        assert_eq!(d[0].line, 1);
    }

    #[test]
    fn test_multiline_flushed_by_other_keys() {
        let d = parse("x{\\n} = a\nx{\\n} = b\ny{ } = c\ny{ } = d\nz = e\nx{,} = f\n").unwrap();
        assert_eq!(
            pairs(&d),
            vec![("x", "a\\nb"), ("y", "c d"), ("z", "e"), ("x", "f")]
        );
    }

    #[test]
    fn test_quoted_values() {
        let d = parse(
            "a = \"  padded  \"\nb = \"say \\\"hi\\\"\" # greeting\nc = \"x\\ny\\\\z\"\nd = \"a#b;c\"\n",
        )
        .unwrap();
        assert_eq!(d[0].value, "  padded  ");
        assert_eq!(d[1].value, "say \"hi\"");
        assert_eq!(d[1].comment, "greeting");
        assert_eq!(d[2].value, "x\ny\\z");
        assert_eq!(d[3].value, "a#b;c");
        assert_eq!(d[3].comment, "");
    }

    #[test]
    fn test_escaped_comment_markers_in_bare_value() {
        let d = parse("a = C\\#sharp \\; ok # real comment\n").unwrap();
        assert_eq!(d[0].value, "C#sharp ; ok");
        assert_eq!(d[0].comment, "real comment");
    }

    #[test]
    fn test_unclosed_quote_is_syntax_error() {
        let err = parse("a = 1\nb = \"open\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_unsplittable_line_is_syntax_error() {
        let err = parse("just words\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("cannot split [just words]"));
    }

    #[test]
    fn test_malformed_multiline_key() {
        let err = parse("bad} = 1\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let d = parse("url = http://x/?a=b\n").unwrap();
        assert_eq!(d[0].value, "http://x/?a=b");
    }

    #[test]
    fn test_import_spliced_in_place() {
        let d = parse("a = 1\nm{,} = x\n#import \"other.ini\"\nb = 2\n").unwrap();
        assert_eq!(
            pairs(&d),
            vec![("a", "1"), ("m", "x"), ("imported", "other.ini"), ("b", "2")]
        );
    }

    #[test]
    fn test_import_lookalike_is_a_comment() {
        let d = parse("#important note\na = 1\n").unwrap();
        assert_eq!(pairs(&d), vec![("a", "1")]);
        assert_eq!(d[0].comment, "important note");
    }

    #[test]
    fn test_empty_import_path() {
        let err = parse("#import \"\"\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(quote_value("plain"), "plain");
        assert_eq!(quote_value(""), "");
        assert_eq!(quote_value(" lead"), "\" lead\"");
        assert_eq!(quote_value("a#b"), "\"a#b\"");
        assert_eq!(quote_value("a\nb"), "\"a\\nb\"");
        assert_eq!(quote_value("\"q\""), "\"\\\"q\\\"\"");
    }

    #[test]
    fn test_quote_then_unquote() {
        for v in ["a;b", " x ", "line1\nline2", "back\\slash #", "\"quoted\""] {
            let (back, _) = unquote_value(&quote_value(v), "t", 1).unwrap();
            assert_eq!(back, v);
        }
    }
}
