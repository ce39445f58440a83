//! SQL dialect differences that matter when statements are combined.

use serde::{Deserialize, Serialize};

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are escaped by doubling them.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// Separator placed between statements of a combined round trip.
    pub const fn statement_separator(self) -> &'static str {
        ";\n"
    }

    /// Prefix byte of numbered placeholders, if the dialect numbers them.
    const fn numbered_prefix(self) -> Option<u8> {
        match self {
            Dialect::Postgres => Some(b'$'),
            Dialect::Sqlite => Some(b'?'),
            Dialect::Mysql => None,
        }
    }

    /// Renumber every numbered placeholder in `sql` by `offset`.
    ///
    /// `$2` becomes `$5` for an offset of 3 (Postgres), `?2` becomes `?5`
    /// (SQLite). Placeholders inside string literals, quoted identifiers,
    /// comments and Postgres dollar-quoted bodies are left untouched. MySQL
    /// placeholders are positional, so the text is returned unchanged.
    pub fn shift_placeholders(self, sql: &str, offset: usize) -> String {
        if offset == 0 || self.numbered_prefix().is_none() {
            return sql.to_string();
        }
        self.scan(sql, offset).sql
    }

    /// Prepare `sql` for embedding inside a larger statement.
    ///
    /// Trailing semicolons are trimmed and placeholders are shifted by
    /// `offset`. When the text ends inside a `--` comment a newline is
    /// appended, so whatever follows it is not commented out.
    pub fn embed(self, sql: &str, offset: usize) -> String {
        let body = sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        let scan = self.scan(body, offset);
        let mut out = scan.sql;
        if scan.open_line_comment {
            out.push('\n');
        }
        out
    }

    /// Whether a `'` string opening at `quote` treats backslash as an escape.
    fn backslash_escapes(self, bytes: &[u8], quote: usize) -> bool {
        match self {
            Dialect::Mysql => true,
            Dialect::Sqlite => false,
            // E'...' escape strings only
            Dialect::Postgres => {
                quote >= 1
                    && matches!(bytes[quote - 1], b'E' | b'e')
                    && (quote == 1 || !is_word_byte(bytes[quote - 2]))
            }
        }
    }

    fn scan(self, sql: &str, offset: usize) -> Scan {
        let bytes = sql.as_bytes();
        let prefix = self.numbered_prefix().filter(|_| offset > 0);
        let mut out = String::with_capacity(sql.len() + 8);
        let mut copied = 0;
        let mut open_line_comment = false;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\'' => i = skip_quoted(bytes, i, self.backslash_escapes(bytes, i)),
                b'"' => i = skip_quoted(bytes, i, self == Dialect::Mysql),
                b'`' => i = skip_quoted(bytes, i, false),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    match bytes[i..].iter().position(|&b| b == b'\n') {
                        Some(newline) => i += newline + 1,
                        None => {
                            open_line_comment = true;
                            i = bytes.len();
                        }
                    }
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = find(bytes, i + 2, b"*/").map_or(bytes.len(), |end| end + 2);
                }
                b'$' if self == Dialect::Postgres && !next_is_digit(bytes, i) => {
                    i = dollar_quoted_end(bytes, i).unwrap_or(i + 1);
                }
                b if prefix == Some(b) && next_is_digit(bytes, i) => {
                    let start = i + 1;
                    let end = bytes[start..]
                        .iter()
                        .position(|d| !d.is_ascii_digit())
                        .map_or(bytes.len(), |len| start + len);
                    out.push_str(&sql[copied..start]);
                    match sql[start..end].parse::<usize>() {
                        Ok(n) => out.push_str(&(n + offset).to_string()),
                        Err(_) => out.push_str(&sql[start..end]),
                    }
                    copied = end;
                    i = end;
                }
                _ => i += 1,
            }
        }

        out.push_str(&sql[copied..]);
        Scan {
            sql: out,
            open_line_comment,
        }
    }
}

struct Scan {
    sql: String,
    /// The text ends inside a `--` comment.
    open_line_comment: bool,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn next_is_digit(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}

/// Index just past the quoted run opening at `start`.
///
/// A doubled quote stays inside the run. Unterminated runs extend to the end.
fn skip_quoted(bytes: &[u8], start: usize, backslash_escapes: bool) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash_escapes => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index just past a `$tag$ ... $tag$` body opening at `start`, or `None`
/// when the `$` does not open one.
fn dollar_quoted_end(bytes: &[u8], start: usize) -> Option<usize> {
    if start > 0 && is_word_byte(bytes[start - 1]) {
        return None;
    }
    let tag_end = bytes[start + 1..]
        .iter()
        .position(|&b| !is_word_byte(b))
        .map_or(bytes.len(), |len| start + 1 + len);
    if bytes.get(tag_end) != Some(&b'$') {
        return None;
    }
    let tag = &bytes[start..=tag_end];
    Some(find(bytes, tag_end + 1, tag).map_or(bytes.len(), |pos| pos + tag.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_shift_postgres() {
        let sql = "SELECT * FROM t WHERE a = $1 AND b = $2 OR c = $10";
        assert_eq!(
            Dialect::Postgres.shift_placeholders(sql, 3),
            "SELECT * FROM t WHERE a = $4 AND b = $5 OR c = $13"
        );
    }

    #[test]
    fn test_shift_sqlite_leaves_bare_markers() {
        let sql = "SELECT ?1, ?2, ?";
        assert_eq!(Dialect::Sqlite.shift_placeholders(sql, 2), "SELECT ?3, ?4, ?");
    }

    #[test]
    fn test_shift_skips_literals_and_comments() {
        let sql = "SELECT '$1', \"$2\" -- $3\n, $1 /* $4 */ FROM t";
        assert_eq!(
            Dialect::Postgres.shift_placeholders(sql, 5),
            "SELECT '$1', \"$2\" -- $3\n, $6 /* $4 */ FROM t"
        );
    }

    #[test]
    fn test_shift_ignores_dollar_quote_tags() {
        let sql = "SELECT $tag$ x $tag$, $$y$$, $1";
        assert_eq!(
            Dialect::Postgres.shift_placeholders(sql, 1),
            "SELECT $tag$ x $tag$, $$y$$, $2"
        );
    }

    #[test]
    fn test_shift_skips_dollar_quoted_bodies() {
        let sql = "SELECT $$ $1 $$, $fn$ it's $2 $fn$, $1";
        assert_eq!(
            Dialect::Postgres.shift_placeholders(sql, 1),
            "SELECT $$ $1 $$, $fn$ it's $2 $fn$, $2"
        );
    }

    #[test]
    fn test_shift_honours_escape_strings() {
        let sql = "SELECT E'it\\'s $1', $1";
        assert_eq!(
            Dialect::Postgres.shift_placeholders(sql, 2),
            "SELECT E'it\\'s $1', $3"
        );

        // Standard strings take backslashes literally.
        let sql = "SELECT 'C:\\', $1";
        assert_eq!(
            Dialect::Postgres.shift_placeholders(sql, 2),
            "SELECT 'C:\\', $3"
        );
    }

    #[test]
    fn test_shift_keeps_doubled_quotes_inside_literal() {
        assert_eq!(
            Dialect::Sqlite.shift_placeholders("SELECT 'it''s ?1', ?1", 4),
            "SELECT 'it''s ?1', ?5"
        );
    }

    #[test]
    fn test_embed_terminates_trailing_line_comment() {
        assert_eq!(
            Dialect::Postgres.embed("SELECT COUNT(*) FROM a -- total", 0),
            "SELECT COUNT(*) FROM a -- total\n"
        );
        assert_eq!(
            Dialect::Postgres.embed("SELECT $1 -- note\nFROM t;  ", 1),
            "SELECT $2 -- note\nFROM t"
        );
        assert_eq!(Dialect::Mysql.embed("SELECT ? -- why;", 3), "SELECT ? -- why\n");
        assert_eq!(Dialect::Postgres.embed("SELECT '--'", 0), "SELECT '--'");
    }

    #[test]
    fn test_shift_zero_and_mysql_are_identity() {
        let sql = "SELECT $1, ?";
        assert_eq!(Dialect::Postgres.shift_placeholders(sql, 0), sql);
        assert_eq!(Dialect::Mysql.shift_placeholders(sql, 7), sql);
    }
}
