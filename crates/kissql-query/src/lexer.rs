//! Query tokenizer.
//!
//! Splits a raw query string into [`Token`]s. Whitespace outside quotes
//! separates tokens. Everything after the first lone `|` is pipe segments.
//!
//! `NOT` may also be written `!`, standalone or glued to the front of a
//! term, phrase or constraint (`!Google`).
//!
//! Only broken delimiters are errors: an unterminated quote, an `in(` without
//! its `)`, or a malformed range. Anything else that cannot be classified
//! degrades to a free-text word.

use kissql_core::LexError;

use crate::ast::Operator;
use crate::token::{LogicalOp, MetaKey, Token, TokenKind};

/// Operator spellings, longest first so `!=` is never read as `=`.
const OPERATORS: &[(&str, Option<Operator>)] = &[
    ("!=", Some(Operator::Ne)),
    ("<=", Some(Operator::Le)),
    (">=", Some(Operator::Ge)),
    ("^=", Some(Operator::StartsWith)),
    ("$=", Some(Operator::EndsWith)),
    ("~=", Some(Operator::Contains)),
    ("=", Some(Operator::Eq)),
    ("<", Some(Operator::Lt)),
    (">", Some(Operator::Gt)),
    // `field:value` on an unrecognized prefix is an equality
    (":", None),
];

const META_PREFIXES: &[(&str, MetaKey)] = &[
    ("sort:", MetaKey::Sort),
    ("limit:", MetaKey::Limit),
    ("similar:", MetaKey::Similar),
    ("cluster=", MetaKey::Cluster),
];

/// Tokenize a raw query string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn push(&mut self, kind: TokenKind, offset: usize) {
        self.tokens.push(Token::new(kind, offset));
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else if c == '|' {
                if self.input[self.pos..].starts_with("||") {
                    self.push(TokenKind::LogicalOp(LogicalOp::Or), self.pos);
                    self.pos += 2;
                } else {
                    self.lex_pipes();
                }
            } else if prefix_not(&self.input[self.pos..]) {
                self.push(TokenKind::LogicalOp(LogicalOp::Not), self.pos);
                self.pos += 1;
            } else if c == '"' {
                self.lex_phrase()?;
            } else {
                let start = self.pos;
                let end = chunk_end(self.input, start)?;
                let kind = classify(&self.input[start..end], start)?;
                self.push(kind, start);
                self.pos = end;
            }
        }
        Ok(self.tokens)
    }

    /// Consume the rest of the input as `| NAME [ARG]` segments.
    fn lex_pipes(&mut self) {
        while self.pos < self.input.len() {
            let offset = self.pos;
            let body_start = offset + 1;
            let body_end = self.input[body_start..]
                .find('|')
                .map_or(self.input.len(), |i| body_start + i);

            let mut words = self.input[body_start..body_end].split_whitespace();
            let name = words.next().unwrap_or_default().to_string();
            let args = words.map(str::to_string).collect();
            self.push(TokenKind::PipeOp { name, args }, offset);
            self.pos = body_end;
        }
    }

    fn lex_phrase(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let close = find_quote_end(self.input, start)
            .ok_or_else(|| LexError::new(start, "unterminated quote"))?;
        let text = unescape(&self.input[start + 1..close]);
        self.pos = close + 1;

        // A `~k` / `^n` suffix is only taken when the whole glued suffix is valid
        let suffix_end = self.input[self.pos..]
            .find(|c: char| c.is_whitespace() || c == '|')
            .map_or(self.input.len(), |i| self.pos + i);
        let (distance, boost) = match parse_phrase_suffix(&self.input[self.pos..suffix_end]) {
            Some(parsed) => {
                self.pos = suffix_end;
                parsed
            }
            None => (None, None),
        };

        let kind = match distance {
            Some(distance) => TokenKind::ProximityPhrase {
                text,
                distance,
                boost,
            },
            None => TokenKind::Phrase { text, boost },
        };
        self.push(kind, start);
        Ok(())
    }
}

/// End of the bare chunk starting at `start`. Quoted spans and `in(...)`
/// lists are swallowed whole, whitespace included.
fn chunk_end(input: &str, start: usize) -> Result<usize, LexError> {
    let mut i = start;
    while let Some(c) = input[i..].chars().next() {
        if c.is_whitespace() || c == '|' {
            break;
        }
        match c {
            '"' => {
                let close = find_quote_end(input, i)
                    .ok_or_else(|| LexError::new(i, "unterminated quote"))?;
                i = close + 1;
            }
            '(' if opens_set(&input[start..i]) => {
                let close = find_paren_end(input, i)?
                    .ok_or_else(|| LexError::new(i - 2, "unterminated in("))?;
                i = close + 1;
            }
            _ => i += c.len_utf8(),
        }
    }
    Ok(i)
}

/// Whether a `(` following `prefix` opens an `in(...)` list.
fn opens_set(prefix: &str) -> bool {
    let lower = prefix.to_ascii_lowercase();
    lower.ends_with("=in") || lower.ends_with(":in")
}

/// Index of the `)` closing the paren at `open`, skipping quoted items.
fn find_paren_end(input: &str, open: usize) -> Result<Option<usize>, LexError> {
    let bytes = input.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let close = find_quote_end(input, i)
                    .ok_or_else(|| LexError::new(i, "unterminated quote"))?;
                i = close + 1;
            }
            b')' => return Ok(Some(i)),
            _ => i += 1,
        }
    }
    Ok(None)
}

/// Index of the quote closing the one at `open`, honouring `\` escapes.
fn find_quote_end(input: &str, open: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_boost(raw: &str) -> Option<f32> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    raw.parse::<f32>()
        .ok()
        .filter(|w| w.is_finite() && *w > 0.0)
}

/// `~k`, `^n`, `~k^n`, or empty.
fn parse_phrase_suffix(suffix: &str) -> Option<(Option<u32>, Option<f32>)> {
    if suffix.is_empty() {
        return Some((None, None));
    }
    let (distance_part, boost_part) = match suffix.split_once('^') {
        Some((d, b)) => (d, Some(b)),
        None => (suffix, None),
    };
    let distance = match distance_part {
        "" => None,
        d => {
            let digits = d.strip_prefix('~')?;
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(digits.parse::<u32>().ok()?)
        }
    };
    let boost = match boost_part {
        Some(b) => Some(parse_boost(b)?),
        None => None,
    };
    Some((distance, boost))
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// A `!` glued to the front of a term, phrase or constraint negates it.
/// `!has:` and `!=` keep their own meaning.
fn prefix_not(rest: &str) -> bool {
    let mut chars = rest.chars();
    if chars.next() != Some('!') {
        return false;
    }
    match chars.next() {
        None | Some('=') => false,
        Some(c) if c.is_whitespace() => false,
        Some(_) => !rest.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("!has:")),
    }
}

fn word(chunk: &str) -> TokenKind {
    if let Some((text, raw_boost)) = chunk.rsplit_once('^') {
        if !text.is_empty() {
            if let Some(boost) = parse_boost(raw_boost) {
                return TokenKind::Word {
                    text: text.to_string(),
                    boost: Some(boost),
                };
            }
        }
    }
    TokenKind::Word {
        text: chunk.to_string(),
        boost: None,
    }
}

fn classify(chunk: &str, offset: usize) -> Result<TokenKind, LexError> {
    match chunk.to_ascii_uppercase().as_str() {
        "AND" | "&&" => return Ok(TokenKind::LogicalOp(LogicalOp::And)),
        "OR" => return Ok(TokenKind::LogicalOp(LogicalOp::Or)),
        "NOT" | "!" => return Ok(TokenKind::LogicalOp(LogicalOp::Not)),
        _ => {}
    }

    let lower = chunk.to_ascii_lowercase();

    for (prefix, present) in [("!has:", false), ("has:", true)] {
        if lower.starts_with(prefix) {
            let field = &chunk[prefix.len()..];
            if is_field_name(field) {
                return Ok(TokenKind::ExistenceExpr {
                    field: field.to_string(),
                    present,
                });
            }
            return Ok(word(chunk));
        }
    }

    for (prefix, key) in META_PREFIXES {
        if lower.starts_with(prefix) {
            return Ok(TokenKind::MetaDirective {
                key: *key,
                value: chunk[prefix.len()..].to_string(),
            });
        }
    }

    match find_operator(chunk) {
        Some((at, symbol, op)) => {
            classify_field_expr(chunk, offset, at, symbol.len(), op).map(|kind| {
                kind.unwrap_or_else(|| word(chunk))
            })
        }
        None => Ok(word(chunk)),
    }
}

/// First operator in the chunk, stopping at any quote.
fn find_operator(chunk: &str) -> Option<(usize, &'static str, Option<Operator>)> {
    for (i, c) in chunk.char_indices() {
        if c == '"' {
            return None;
        }
        let rest = &chunk[i..];
        for (symbol, op) in OPERATORS {
            if rest.starts_with(symbol) {
                return Some((i, symbol, *op));
            }
        }
    }
    None
}

/// `Ok(None)` means the chunk is not a usable field expression and should
/// fall back to a word.
fn classify_field_expr(
    chunk: &str,
    offset: usize,
    at: usize,
    op_len: usize,
    op: Option<Operator>,
) -> Result<Option<TokenKind>, LexError> {
    let field_part = &chunk[..at];
    let value_start = at + op_len;
    let value = &chunk[value_start..];
    let value_offset = offset + value_start;

    let (field, boost) = match field_part.rsplit_once('^') {
        Some((name, raw)) => match parse_boost(raw) {
            Some(b) => (name, Some(b)),
            None => return Ok(None),
        },
        None => (field_part, None),
    };
    if !is_field_name(field) || value.is_empty() {
        return Ok(None);
    }
    let field = field.to_string();

    let op = match op {
        Some(Operator::Eq) | None => {
            if value.to_ascii_lowercase().starts_with("in(") {
                let values = parse_set(value, value_offset)?;
                return Ok(Some(TokenKind::SetExpr {
                    field,
                    values,
                    boost,
                }));
            }
            if !value.starts_with('"') && value.contains("..") {
                let (lower, upper) = parse_range(value, value_offset)?;
                return Ok(Some(TokenKind::RangeExpr {
                    field,
                    lower,
                    upper,
                    boost,
                }));
            }
            Operator::Eq
        }
        Some(op) => op,
    };

    let value = parse_scalar(value, value_offset)?;
    Ok(Some(TokenKind::FieldExpr {
        field,
        op,
        value,
        boost,
    }))
}

fn parse_scalar(value: &str, offset: usize) -> Result<String, LexError> {
    if !value.starts_with('"') {
        return Ok(value.to_string());
    }
    let close = find_quote_end(value, 0).ok_or_else(|| LexError::new(offset, "unterminated quote"))?;
    if close + 1 != value.len() {
        return Err(LexError::new(
            offset,
            "unexpected characters after quoted value",
        ));
    }
    Ok(unescape(&value[1..close]))
}

fn parse_range(value: &str, offset: usize) -> Result<(String, String), LexError> {
    let mut bounds = value.split("..");
    match (bounds.next(), bounds.next(), bounds.next()) {
        (Some(lower), Some(upper), None) if !lower.is_empty() && !upper.is_empty() => {
            Ok((lower.to_string(), upper.to_string()))
        }
        _ => Err(LexError::new(offset, "malformed range")),
    }
}

/// Items of `in(a, "b c", d)`.
fn parse_set(value: &str, offset: usize) -> Result<Vec<String>, LexError> {
    let malformed = || LexError::new(offset, "malformed in(...)");
    let open = 2;
    let close = find_paren_end(value, open)?.ok_or_else(malformed)?;
    if close + 1 != value.len() {
        return Err(malformed());
    }

    let body = &value[open + 1..close];
    let mut items = Vec::new();
    let mut i = 0;
    let mut item_start = 0;
    let bytes = body.as_bytes();
    while i <= bytes.len() {
        if i == bytes.len() || bytes[i] == b',' {
            let item = body[item_start..i].trim();
            if item.is_empty() {
                return Err(malformed());
            }
            items.push(parse_scalar(item, offset).map_err(|_| malformed())?);
            item_start = i + 1;
            i += 1;
        } else if bytes[i] == b'"' {
            i = find_quote_end(body, i).ok_or_else(malformed)? + 1;
        } else {
            i += 1;
        }
    }
    Ok(items)
}
