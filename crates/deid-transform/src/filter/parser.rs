//! Tokenizer and recursive-descent parser for filter conditions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and (("or" | "|") and)*
//! and        := not (("and" | "&") not)*
//! not        := ("not" | "~") not | primary
//! primary    := "(" or ")" | comparison
//! comparison := operand ( cmp operand
//!                       | "is" ["not"] "null"
//!                       | ["not"] "in" "[" literal ("," literal)* "]" )
//! ```
//!
//! Keywords are case-insensitive. Columns are bare identifiers or
//! backtick-quoted names; strings use single or double quotes.

use crate::error::FilterError;

use super::predicate::{CompareOp, Literal, Operand, Predicate};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    Str(String),
    Int(i64),
    Float(f64),
    Cmp(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    offset: usize,
}

pub(super) fn parse(condition: &str) -> Result<Predicate, FilterError> {
    let tokens = tokenize(condition)?;
    let mut parser = Parser {
        condition,
        tokens,
        pos: 0,
    };
    let predicate = parser.parse_or()?;
    match parser.peek() {
        None => Ok(predicate),
        Some(spanned) => Err(parser.error_at(spanned.offset, "unexpected trailing input")),
    }
}

fn syntax(condition: &str, offset: usize, message: impl Into<String>) -> FilterError {
    FilterError::Syntax {
        condition: condition.to_string(),
        offset,
        message: message.into(),
    }
}

fn tokenize(condition: &str) -> Result<Vec<Spanned>, FilterError> {
    let bytes = condition.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'[' => {
                i += 1;
                Token::LBracket
            }
            b']' => {
                i += 1;
                Token::RBracket
            }
            b',' => {
                i += 1;
                Token::Comma
            }
            b'&' => {
                i += if bytes.get(i + 1) == Some(&b'&') { 2 } else { 1 };
                Token::And
            }
            b'|' => {
                i += if bytes.get(i + 1) == Some(&b'|') { 2 } else { 1 };
                Token::Or
            }
            b'~' => {
                i += 1;
                Token::Not
            }
            b'=' => {
                i += if bytes.get(i + 1) == Some(&b'=') { 2 } else { 1 };
                Token::Cmp(CompareOp::Eq)
            }
            b'!' => {
                if bytes.get(i + 1) != Some(&b'=') {
                    return Err(syntax(condition, start, "expected '!='"));
                }
                i += 2;
                Token::Cmp(CompareOp::NotEq)
            }
            b'<' | b'>' => {
                let with_eq = bytes.get(i + 1) == Some(&b'=');
                i += if with_eq { 2 } else { 1 };
                Token::Cmp(match (c, with_eq) {
                    (b'<', false) => CompareOp::Lt,
                    (b'<', true) => CompareOp::LtEq,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::GtEq,
                })
            }
            b'\'' | b'"' | b'`' => {
                let end = condition[i + 1..]
                    .find(c as char)
                    .map(|pos| i + 1 + pos)
                    .ok_or_else(|| syntax(condition, start, "unterminated quote"))?;
                let text = condition[i + 1..end].to_string();
                i = end + 1;
                if c == b'`' {
                    Token::Quoted(text)
                } else {
                    Token::Str(text)
                }
            }
            b'0'..=b'9' | b'-' | b'.' => {
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &condition[start..i];
                if text.contains('.') {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| syntax(condition, start, format!("invalid number '{text}'")))?;
                    Token::Float(value)
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| syntax(condition, start, format!("invalid number '{text}'")))?;
                    Token::Int(value)
                }
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                let word = &condition[start..i];
                match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word.to_string()),
                }
            }
            _ => {
                let found = condition[start..].chars().next().unwrap_or('?');
                return Err(syntax(
                    condition,
                    start,
                    format!("unexpected character '{found}'"),
                ));
            }
        };
        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    Ok(tokens)
}

struct Parser<'a> {
    condition: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_offset(&self) -> usize {
        self.condition.len()
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> FilterError {
        syntax(self.condition, offset, message)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|spanned| &spanned.token == expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let matched = matches!(
            self.peek(),
            Some(Spanned { token: Token::Ident(word), .. }) if word.eq_ignore_ascii_case(keyword)
        );
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), FilterError> {
        if self.eat(expected) {
            return Ok(());
        }
        let offset = self.peek().map_or(self.end_offset(), |spanned| spanned.offset);
        Err(self.error_at(offset, format!("expected {what}")))
    }

    fn parse_or(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Predicate, FilterError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, FilterError> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Predicate, FilterError> {
        let left = self.parse_operand()?;

        if self.eat_keyword("is") {
            let negated = self.eat(&Token::Not);
            if !self.eat_keyword("null") {
                let offset = self.peek().map_or(self.end_offset(), |spanned| spanned.offset);
                return Err(self.error_at(offset, "expected 'null'"));
            }
            return Ok(Predicate::IsNull {
                operand: left,
                negated,
            });
        }

        let negated = self.eat(&Token::Not);
        if self.eat_keyword("in") {
            let values = self.parse_list()?;
            return Ok(Predicate::InList {
                operand: left,
                values,
                negated,
            });
        }
        if negated {
            let offset = self.peek().map_or(self.end_offset(), |spanned| spanned.offset);
            return Err(self.error_at(offset, "expected 'in' after 'not'"));
        }

        match self.advance() {
            Some(Spanned {
                token: Token::Cmp(op),
                ..
            }) => {
                let right = self.parse_operand()?;
                Ok(Predicate::Compare { left, op, right })
            }
            Some(spanned) => Err(self.error_at(spanned.offset, "expected a comparison operator")),
            None => Err(self.error_at(self.end_offset(), "expected a comparison operator")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>, FilterError> {
        self.expect(&Token::LBracket, "'['")?;
        let mut values = Vec::new();
        loop {
            match self.parse_operand()? {
                Operand::Literal(value) => values.push(value),
                Operand::Column(name) => {
                    let offset = self.tokens[self.pos - 1].offset;
                    return Err(self.error_at(
                        offset,
                        format!("list items must be literals, found column '{name}'"),
                    ));
                }
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket, "']'")?;
        Ok(values)
    }

    fn parse_operand(&mut self) -> Result<Operand, FilterError> {
        let Some(spanned) = self.advance() else {
            return Err(self.error_at(self.end_offset(), "expected a column or literal"));
        };
        let operand = match spanned.token {
            Token::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "true" => Operand::Literal(Literal::Bool(true)),
                "false" => Operand::Literal(Literal::Bool(false)),
                "null" | "is" | "in" => {
                    return Err(self.error_at(
                        spanned.offset,
                        format!("'{word}' cannot be used as an operand"),
                    ));
                }
                _ => Operand::Column(word),
            },
            Token::Quoted(name) => Operand::Column(name),
            Token::Str(value) => Operand::Literal(Literal::Str(value)),
            Token::Int(value) => Operand::Literal(Literal::Int(value)),
            Token::Float(value) => Operand::Literal(Literal::Float(value)),
            _ => {
                return Err(self.error_at(spanned.offset, "expected a column or literal"));
            }
        };
        Ok(operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> Operand {
        Operand::Column(name.to_string())
    }

    #[test]
    fn parses_simple_comparison() {
        let predicate = parse("age > 30").unwrap();
        assert_eq!(
            predicate,
            Predicate::Compare {
                left: column("age"),
                op: CompareOp::Gt,
                right: Operand::Literal(Literal::Int(30)),
            }
        );
    }

    #[test]
    fn single_equals_is_equality() {
        let predicate = parse("status = 'active'").unwrap();
        assert!(matches!(
            predicate,
            Predicate::Compare {
                op: CompareOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let predicate = parse("a == 1 or b == 2 AND c == 3").unwrap();
        let Predicate::Or(_, right) = predicate else {
            panic!("expected or at the root");
        };
        assert!(matches!(*right, Predicate::And(_, _)));
    }

    #[test]
    fn parses_membership_and_null_checks() {
        let predicate = parse("department not in ['A', \"B\"] & `event value` is not null").unwrap();
        let Predicate::And(left, right) = predicate else {
            panic!("expected and at the root");
        };
        assert_eq!(
            *left,
            Predicate::InList {
                operand: column("department"),
                values: vec![Literal::Str("A".into()), Literal::Str("B".into())],
                negated: true,
            }
        );
        assert_eq!(
            *right,
            Predicate::IsNull {
                operand: column("event value"),
                negated: true,
            }
        );
    }

    #[test]
    fn negative_and_float_literals() {
        let predicate = parse("delta >= -1.5").unwrap();
        assert!(matches!(
            predicate,
            Predicate::Compare {
                right: Operand::Literal(Literal::Float(value)),
                ..
            } if value == -1.5
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        for condition in ["", "age >", "age 30", "(age > 1", "age > 1 )", "name == 'x", "a ! b"] {
            assert!(
                matches!(parse(condition), Err(FilterError::Syntax { .. })),
                "{condition:?} should not parse"
            );
        }
    }
}
