//! Tokenizer for the expression language.

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Dollar,
    At,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Int(n) => format!("number {n}"),
            Token::Float(n) => format!("number {n}"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Eof => "end of expression".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Dollar => "$",
            Token::At => "@",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Question => "?",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            _ => "?",
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = peek(i + 1);
        let two = |expected: char| next == Some(expected);
        let (token, width) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '{' => (Token::LBrace, 1),
            '}' => (Token::RBrace, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            ',' => (Token::Comma, 1),
            ':' => (Token::Colon, 1),
            '.' => (Token::Dot, 1),
            '?' => (Token::Question, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '$' => (Token::Dollar, 1),
            '@' => (Token::At, 1),
            '=' if two('=') => (Token::EqEq, 2),
            '!' if two('=') => (Token::NotEq, 2),
            '!' => (Token::Bang, 1),
            '<' if two('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if two('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '&' if two('&') => (Token::AndAnd, 2),
            '|' if two('|') => (Token::OrOr, 2),
            '"' | '\'' => {
                let (s, consumed) = lex_string(&chars, i, c)?;
                tokens.push(Spanned {
                    token: Token::Str(s),
                    offset,
                });
                i += consumed;
                continue;
            }
            c if c.is_ascii_digit() => {
                let (token, consumed) = lex_number(&chars, i)?;
                tokens.push(Spanned { token, offset });
                i += consumed;
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while let Some(n) = peek(i)
                    && (n.is_alphanumeric() || n == '_')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push(Spanned { token, offset });
                continue;
            }
            other => {
                return Err(ParseError::new(
                    offset,
                    format!("unexpected character '{other}'"),
                ));
            }
        };

        tokens.push(Spanned { token, offset });
        i += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

fn lex_string(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> Result<(String, usize), ParseError> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            c if c == quote => return Ok((out, i - start + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| ParseError::new(offset, "unterminated escape"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ParseError::new(chars[start].0, "unterminated string"))
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), ParseError> {
    let mut i = start;
    let mut is_float = false;
    let digit_at = |i: usize| chars.get(i).is_some_and(|(_, c)| c.is_ascii_digit());

    while digit_at(i) {
        i += 1;
    }
    // A '.' only continues the number when a digit follows, so `items[0].name`
    // still lexes the dot as field access.
    if chars.get(i).is_some_and(|(_, c)| *c == '.') && digit_at(i + 1) {
        is_float = true;
        i += 1;
        while digit_at(i) {
            i += 1;
        }
    }
    if chars.get(i).is_some_and(|(_, c)| *c == 'e' || *c == 'E') {
        let mut j = i + 1;
        if chars.get(j).is_some_and(|(_, c)| *c == '+' || *c == '-') {
            j += 1;
        }
        if digit_at(j) {
            is_float = true;
            i = j;
            while digit_at(i) {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
    let offset = chars[start].0;
    let token = if is_float {
        Token::Float(
            text.parse::<f64>()
                .map_err(|_| ParseError::new(offset, format!("invalid number '{text}'")))?,
        )
    } else {
        match text.parse::<i64>() {
            Ok(n) => Token::Int(n),
            Err(_) => Token::Float(
                text.parse::<f64>()
                    .map_err(|_| ParseError::new(offset, format!("invalid number '{text}'")))?,
            ),
        }
    };
    Ok((token, i - start))
}
