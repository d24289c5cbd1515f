//! Recursive-descent arithmetic evaluator for `[CALCULATE: ...]` tool calls.
//!
//! Grammar: expr = term (('+'|'-') term)*; term = factor (('*'|'/') factor)*;
//! factor = '-' factor | number | '(' expr ')'.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum CalcError {
    UnexpectedChar(char),
    UnexpectedEnd,
    TrailingInput,
    DivisionByZero,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcError::UnexpectedChar(c) => write!(f, "unexpected character '{c}'"),
            CalcError::UnexpectedEnd => write!(f, "expression ended unexpectedly"),
            CalcError::TrailingInput => write!(f, "unexpected input after expression"),
            CalcError::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl StdError for CalcError {}

pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        bytes: expr.as_bytes(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_whitespace();
    if parser.pos < parser.bytes.len() {
        return Err(CalcError::TrailingInput);
    }
    Ok(value)
}

/// Evaluate and render the result the way tool messages show it:
/// integral values without a decimal point.
pub fn evaluate_display(expr: &str) -> Result<String, CalcError> {
    let value = evaluate(expr)?;
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Ok(format!("{}", value as i64))
    } else {
        Ok(format!("{value}"))
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(c) => Err(CalcError::UnexpectedChar(c as char)),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(CalcError::UnexpectedChar(c as char)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
        {
            self.pos += 1;
        }
        // slice bounds are ASCII positions, always a char boundary
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| CalcError::UnexpectedEnd)?;
        text.parse::<f64>()
            .map_err(|_| CalcError::UnexpectedChar('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("25 * 4").unwrap(), 100.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 - 2 - 3").unwrap(), 5.0);
    }

    #[test]
    fn tabs_and_newlines_are_whitespace() {
        assert_eq!(evaluate("2 +\t2").unwrap(), 4.0);
        assert_eq!(evaluate("2\n* 3").unwrap(), 6.0);
        assert_eq!(evaluate("\t 7 \n").unwrap(), 7.0);
    }

    #[test]
    fn unary_minus_and_decimals() {
        assert_eq!(evaluate("-4 + 10").unwrap(), 6.0);
        assert_eq!(evaluate("--4").unwrap(), 4.0);
        assert_eq!(evaluate("1.5 * 2").unwrap(), 3.0);
    }

    #[test]
    fn division_by_zero_is_a_tool_error() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("1 / (2 - 2)"), Err(CalcError::DivisionByZero));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("2 x 3"), Err(CalcError::TrailingInput));
        assert!(matches!(evaluate("hello"), Err(CalcError::UnexpectedChar('h'))));
    }

    #[test]
    fn display_formatting() {
        assert_eq!(evaluate_display("25 * 4").unwrap(), "100");
        assert_eq!(evaluate_display("1 / 2").unwrap(), "0.5");
    }
}
