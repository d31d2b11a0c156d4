//! SQL text rewriting used before execution.
//!
//! Uses sqlparser-rs with the SQLite dialect. Rewrites operate on the token
//! stream and re-render every untouched token verbatim, so whitespace,
//! comments and quoting survive.

use std::collections::HashSet;

use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::debug;

use crate::error::{EvalError, Result};

/// Default cap on value-substitution variants per datapoint.
pub const DEFAULT_MAX_VARIANTS: usize = 256;

/// Text collaborators the judge applies to gold and predicted SQL.
pub trait SqlRewriter: Send + Sync {
    /// Fixes spacing inside comparison operators.
    fn normalize(&self, sql: &str) -> String {
        normalize_operators(sql)
    }

    /// Removes DISTINCT modifiers. Fails on SQL that cannot be tokenized or
    /// has unbalanced parentheses.
    fn strip_distinct(&self, sql: &str) -> Result<String>;

    /// Enumerates variants of `predicted` with gold literals plugged into its
    /// literal slots.
    fn substitute_values(&self, gold: &str, predicted: &str) -> Vec<String>;
}

/// Default [`SqlRewriter`] built on the sqlparser tokenizer.
#[derive(Debug)]
pub struct StandardRewriter {
    dialect: SQLiteDialect,
    max_variants: usize,
}

impl Default for StandardRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VARIANTS)
    }
}

impl StandardRewriter {
    /// Creates a rewriter producing at most `max_variants` substitutions.
    pub fn new(max_variants: usize) -> Self {
        Self {
            dialect: SQLiteDialect {},
            max_variants,
        }
    }

    fn tokenize(&self, sql: &str) -> Result<Vec<Token>> {
        Tokenizer::new(&self.dialect, sql)
            .with_unescape(false)
            .tokenize()
            .map_err(|e| EvalError::parse(format!("SQL tokenize error: {e}")))
    }
}

impl SqlRewriter for StandardRewriter {
    fn strip_distinct(&self, sql: &str) -> Result<String> {
        let tokens = self.tokenize(sql)?;
        check_balanced(&tokens)?;
        Ok(render(tokens.iter().filter(|token| !is_distinct(token))))
    }

    fn substitute_values(&self, gold: &str, predicted: &str) -> Vec<String> {
        let (gold_tokens, predicted_tokens) = match (self.tokenize(gold), self.tokenize(predicted)) {
            (Ok(g), Ok(p)) => (g, p),
            (Err(e), _) | (_, Err(e)) => {
                debug!("Skipping value substitution: {e}");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let gold_values: Vec<Token> = literal_slots(&gold_tokens)
            .into_iter()
            .map(|i| gold_tokens[i].clone())
            .filter(|token| seen.insert(token.to_string()))
            .collect();
        let slots = literal_slots(&predicted_tokens);

        if gold_values.is_empty() || slots.is_empty() {
            return Vec::new();
        }

        enumerate_assignments(
            &predicted_tokens,
            &slots,
            &gold_values,
            predicted,
            self.max_variants,
        )
    }
}

/// Walks every assignment of gold literals to slots in odometer order.
fn enumerate_assignments(
    tokens: &[Token],
    slots: &[usize],
    values: &[Token],
    predicted: &str,
    max_variants: usize,
) -> Vec<String> {
    let mut variants = Vec::new();
    let mut choice = vec![0usize; slots.len()];
    let mut tokens = tokens.to_vec();

    while variants.len() < max_variants {
        for (&slot, &pick) in slots.iter().zip(&choice) {
            tokens[slot] = values[pick].clone();
        }
        let sql = render(tokens.iter());
        if sql != predicted {
            variants.push(sql);
        }

        let mut pos = slots.len();
        loop {
            if pos == 0 {
                return variants;
            }
            pos -= 1;
            choice[pos] += 1;
            if choice[pos] < values.len() {
                break;
            }
            choice[pos] = 0;
        }
    }

    debug!("Value substitution capped at {max_variants} variants");
    variants
}

/// Replaces `"> ="`, `"< ="` and `"! ="` with the operators they were meant to be.
pub fn normalize_operators(sql: &str) -> String {
    sql.replace("> =", ">=")
        .replace("< =", "<=")
        .replace("! =", "!=")
}

/// Returns true if the query asks for an explicit row order.
pub fn has_order_by(sql: &str) -> bool {
    sql.to_lowercase().contains("order by")
}

/// Rejects unbalanced parentheses. Grammar is left to the engine.
fn check_balanced(tokens: &[Token]) -> Result<()> {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| EvalError::parse("SQL parse error: unexpected ')'"))?;
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(EvalError::parse("SQL parse error: unclosed '('"));
    }
    Ok(())
}

fn is_distinct(token: &Token) -> bool {
    matches!(token, Token::Word(word) if word.quote_style.is_none() && word.keyword == Keyword::DISTINCT)
}

/// Positions of value literals: numbers, single-quoted strings, and
/// double-quoted words compared against something (SQLite reads `"France"`
/// as a string when no such column exists).
fn literal_slots(tokens: &[Token]) -> Vec<usize> {
    let mut slots = Vec::new();
    let mut previous: Option<&Token> = None;
    for (i, token) in tokens.iter().enumerate() {
        let literal = match token {
            Token::Number(..) | Token::SingleQuotedString(_) => true,
            Token::Word(word) if word.quote_style == Some('"') => {
                previous.is_some_and(is_comparison)
            }
            _ => false,
        };
        if literal {
            slots.push(i);
        }
        if !matches!(token, Token::Whitespace(_)) {
            previous = Some(token);
        }
    }
    slots
}

fn is_comparison(token: &Token) -> bool {
    match token {
        Token::Eq | Token::DoubleEq | Token::Neq | Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => true,
        Token::Word(word) => {
            word.quote_style.is_none()
                && (word.value.eq_ignore_ascii_case("like") || word.value.eq_ignore_ascii_case("glob"))
        }
        _ => false,
    }
}

fn render<'a>(tokens: impl Iterator<Item = &'a Token>) -> String {
    tokens.map(ToString::to_string).collect()
}
