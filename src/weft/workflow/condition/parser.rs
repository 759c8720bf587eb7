// SPDX-License-Identifier: MIT

//! Tokenizer and recursive-descent parser for `when` expressions
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "(" expr ")" | "true" | "false" | path (op literal)?
//! ```

use super::ast::{CompareOp, Expression, Literal};
use super::ConditionError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Str(String),
    Number(f64),
    Op(CompareOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
    True,
    False,
    Null,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Path(p) => format!("'{}'", p),
            Token::Str(s) => format!("string '{}'", s),
            Token::Number(n) => format!("number {}", n),
            Token::Op(op) => format!("'{}'", op),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Null => "'null'".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let start = i;
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .map(|offset| i + 1 + offset)
                    .ok_or(ConditionError::UnterminatedString(start))?;
                tokens.push(Token::Str(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '<' | '>' => {
                let followed_by_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, followed_by_eq) {
                    ('=', true) => CompareOp::Eq,
                    ('!', true) => CompareOp::NotEq,
                    ('<', true) => CompareOp::Lte,
                    ('>', true) => CompareOp::Gte,
                    ('<', false) => CompareOp::Lt,
                    ('>', false) => CompareOp::Gt,
                    _ => return Err(ConditionError::UnexpectedChar { ch: c, pos: i }),
                };
                tokens.push(Token::Op(op));
                i += if followed_by_eq { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "contains" => Token::Op(CompareOp::Contains),
                    _ => Token::Path(word),
                });
            }
            _ => return Err(ConditionError::UnexpectedChar { ch: c, pos: i }),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            let right = self.unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, ConditionError> {
        if self.eat(&Token::Not) {
            return Ok(Expression::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, ConditionError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(unexpected(&other, "')'")),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Some(Token::True) => Ok(Expression::True),
            Some(Token::False) => Ok(Expression::False),
            Some(Token::Path(path)) => {
                let op = match self.peek() {
                    Some(Token::Op(op)) => *op,
                    _ => return Ok(Expression::Truthy(path)),
                };
                self.pos += 1;
                let value = self.literal()?;
                Ok(Expression::Compare { path, op, value })
            }
            Some(other) => Err(unexpected(&other, "a field name")),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }

    fn literal(&mut self) -> Result<Literal, ConditionError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::String(s)),
            Some(Token::Number(n)) => Ok(Literal::Number(n)),
            Some(Token::True) => Ok(Literal::Boolean(true)),
            Some(Token::False) => Ok(Literal::Boolean(false)),
            Some(Token::Null) => Ok(Literal::Null),
            Some(other) => Err(unexpected(&other, "a literal")),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }
}

fn unexpected(token: &Token, expected: &str) -> ConditionError {
    ConditionError::UnexpectedToken {
        found: token.describe(),
        expected: expected.to_string(),
    }
}

/// Parse a `when` expression
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(extra) => Err(unexpected(extra, "end of expression")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(path: &str, op: CompareOp, value: Literal) -> Expression {
        Expression::Compare {
            path: path.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_parse_comparisons() {
        assert_eq!(
            parse("intent == 'search'").unwrap(),
            compare("intent", CompareOp::Eq, Literal::String("search".to_string()))
        );
        assert_eq!(
            parse("score>=0.5").unwrap(),
            compare("score", CompareOp::Gte, Literal::Number(0.5))
        );
        assert_eq!(
            parse("retries < -1").unwrap(),
            compare("retries", CompareOp::Lt, Literal::Number(-1.0))
        );
        assert_eq!(
            parse(r#"name != "bob""#).unwrap(),
            compare("name", CompareOp::NotEq, Literal::String("bob".to_string()))
        );
        assert_eq!(
            parse("error == null").unwrap(),
            compare("error", CompareOp::Eq, Literal::Null)
        );
        assert_eq!(
            parse("tags contains 'bug'").unwrap(),
            compare("tags", CompareOp::Contains, Literal::String("bug".to_string()))
        );
    }

    #[test]
    fn test_parse_nested_path() {
        assert_eq!(
            parse("result.data.ok == true").unwrap(),
            compare("result.data.ok", CompareOp::Eq, Literal::Boolean(true))
        );
    }

    #[test]
    fn test_quoted_keywords_stay_strings() {
        assert_eq!(
            parse("mode == 'a and b'").unwrap(),
            compare("mode", CompareOp::Eq, Literal::String("a and b".to_string()))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a or b and c").unwrap();
        assert_eq!(expr.to_string(), "(a or (b and c))");
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = parse("(a or b) and c").unwrap();
        assert_eq!(expr.to_string(), "((a or b) and c)");
    }

    #[test]
    fn test_not_and_bare_paths() {
        assert_eq!(
            parse("not done").unwrap(),
            Expression::Not(Box::new(Expression::Truthy("done".to_string())))
        );
        assert_eq!(parse("true").unwrap(), Expression::True);
        assert_eq!(
            parse("not (x > 1)").unwrap().to_string(),
            "not x > 1"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(ConditionError::Empty));
        assert_eq!(parse("name == 'open"), Err(ConditionError::UnterminatedString(8)));
        assert_eq!(parse("(a and b"), Err(ConditionError::UnexpectedEnd));
        assert_eq!(parse("a = 1"), Err(ConditionError::UnexpectedChar { ch: '=', pos: 2 }));
        assert!(matches!(
            parse("a == b"),
            Err(ConditionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("this is not valid"),
            Err(ConditionError::UnexpectedToken { .. })
        ));
    }
}
