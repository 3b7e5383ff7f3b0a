//! Transactional query engine for the in-memory server
//!
//! Supports the subset of the query language that seed scripts and tests
//! need:
//!
//! ```text
//! INSERT {"_key": "u1", "name": "Ann"} INTO user
//! INSERT @doc INTO @@coll
//! REMOVE "u1" IN user
//! RETURN LENGTH(user)
//! FOR u IN user RETURN u
//! ```
//!
//! Statements are separated by whitespace or `;`, `//` starts a line
//! comment, keywords are case-insensitive.
//!
//! # Atomicity
//!
//! The whole script is parsed before anything runs, then every statement is
//! applied to a staged copy of the collections. The copy replaces the live
//! collections only after the last statement succeeds, so a failure at any
//! statement leaves no trace.

use crate::store::Collection;
use seedbed_core::{BindVars, CollectionKind};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Server error numbers reported with query failures
pub mod codes {
    /// Document with the given key does not exist
    pub const DOCUMENT_NOT_FOUND: u32 = 1202;
    /// Collection does not exist
    pub const COLLECTION_NOT_FOUND: u32 = 1203;
    /// Duplicate `_key`
    pub const UNIQUE_CONSTRAINT_VIOLATED: u32 = 1210;
    /// `_key` has the wrong type or characters
    pub const DOCUMENT_KEY_BAD: u32 = 1221;
    /// Inserted value is not an object
    pub const DOCUMENT_TYPE_INVALID: u32 = 1227;
    /// Edge without valid `_from` / `_to`
    pub const EDGE_ATTRIBUTE_INVALID: u32 = 1233;
    /// Syntax error
    pub const PARSE: u32 = 1501;
    /// Bind variable referenced but not supplied
    pub const BIND_PARAMETER_MISSING: u32 = 1552;
}

/// Failure of one statement; `statement` is 1-based
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statement {statement}: {message} (error {code})")]
pub struct QueryError {
    /// 1-based index of the failing statement
    pub statement: usize,
    /// Server error number
    pub code: u32,
    /// Human-readable reason
    pub message: String,
}

impl QueryError {
    fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            statement: 0,
            code,
            message: message.into(),
        }
    }

    fn at(mut self, statement: usize) -> Self {
        self.statement = statement;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Literal(Value),
    Bind(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Named(String),
    Bind(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Insert { document: Operand, collection: Target },
    Remove { key: Operand, collection: Target },
    Length { collection: Target },
    Scan { collection: Target },
}

// ============================================================================
// Parsing
// ============================================================================

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                let line = trimmed.find('\n').map_or(trimmed.len(), |i| i + 1);
                self.pos += line;
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_trivia();
        self.pos >= self.src.len()
    }

    fn ident(&mut self) -> Result<&'a str, QueryError> {
        self.skip_trivia();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        if len == 0 {
            let found: String = rest.chars().take(16).collect();
            return Err(QueryError::new(
                codes::PARSE,
                format!("syntax error, expected identifier near '{found}'"),
            ));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        let word = self.ident()?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(QueryError::new(
                codes::PARSE,
                format!("syntax error, expected {keyword}, found '{word}'"),
            ))
        }
    }

    fn punct(&mut self, c: char) -> Result<(), QueryError> {
        self.skip_trivia();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(QueryError::new(
                codes::PARSE,
                format!("syntax error, expected '{c}'"),
            ))
        }
    }

    fn operand(&mut self) -> Result<Operand, QueryError> {
        self.skip_trivia();
        if self.rest().starts_with('@') && !self.rest().starts_with("@@") {
            self.pos += 1;
            return Ok(Operand::Bind(self.ident()?.to_string()));
        }
        let mut values = serde_json::Deserializer::from_str(self.rest()).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                self.pos += values.byte_offset();
                Ok(Operand::Literal(value))
            }
            Some(Err(e)) => Err(QueryError::new(
                codes::PARSE,
                format!("syntax error in value: {e}"),
            )),
            None => Err(QueryError::new(
                codes::PARSE,
                "syntax error, expected a value",
            )),
        }
    }

    fn target(&mut self) -> Result<Target, QueryError> {
        self.skip_trivia();
        if self.rest().starts_with("@@") {
            self.pos += 2;
            return Ok(Target::Bind(self.ident()?.to_string()));
        }
        Ok(Target::Named(self.ident()?.to_string()))
    }

    fn statement(&mut self) -> Result<Statement, QueryError> {
        let word = self.ident()?.to_ascii_uppercase();
        match word.as_str() {
            "INSERT" => {
                let document = self.operand()?;
                self.keyword("INTO")?;
                let collection = self.target()?;
                Ok(Statement::Insert {
                    document,
                    collection,
                })
            }
            "REMOVE" => {
                let key = self.operand()?;
                self.keyword("IN")?;
                let collection = self.target()?;
                Ok(Statement::Remove { key, collection })
            }
            "RETURN" => {
                self.keyword("LENGTH")?;
                self.punct('(')?;
                let collection = self.target()?;
                self.punct(')')?;
                Ok(Statement::Length { collection })
            }
            "FOR" => {
                let variable = self.ident()?.to_string();
                self.keyword("IN")?;
                let collection = self.target()?;
                self.keyword("RETURN")?;
                let returned = self.ident()?;
                if returned != variable {
                    return Err(QueryError::new(
                        codes::PARSE,
                        format!("variable '{returned}' is not defined"),
                    ));
                }
                Ok(Statement::Scan { collection })
            }
            _ => Err(QueryError::new(
                codes::PARSE,
                format!("syntax error, unexpected '{word}'"),
            )),
        }
    }
}

fn parse(script: &str) -> Result<Vec<Statement>, QueryError> {
    let mut parser = Parser::new(script);
    let mut statements = Vec::new();
    while !parser.at_end() {
        let number = statements.len() + 1;
        statements.push(parser.statement().map_err(|e| e.at(number))?);
    }
    Ok(statements)
}

// ============================================================================
// Execution
// ============================================================================

/// Run `script` against `collections` atomically and return its result rows
pub(crate) fn execute(
    collections: &mut BTreeMap<String, Collection>,
    script: &str,
    bind_vars: &BindVars,
) -> Result<Vec<Value>, QueryError> {
    let statements = parse(script)?;
    let mut staged = collections.clone();
    let mut rows = Vec::new();
    for (index, statement) in statements.iter().enumerate() {
        apply(&mut staged, statement, bind_vars, &mut rows).map_err(|e| e.at(index + 1))?;
    }
    *collections = staged;
    Ok(rows)
}

fn apply(
    staged: &mut BTreeMap<String, Collection>,
    statement: &Statement,
    bind_vars: &BindVars,
    rows: &mut Vec<Value>,
) -> Result<(), QueryError> {
    match statement {
        Statement::Insert {
            document,
            collection,
        } => {
            let name = resolve_target(collection, bind_vars)?;
            let value = resolve_operand(document, bind_vars)?;
            insert(lookup(staged, &name)?, &name, value)
        }
        Statement::Remove { key, collection } => {
            let name = resolve_target(collection, bind_vars)?;
            let key = match resolve_operand(key, bind_vars)? {
                Value::String(key) => key,
                Value::Object(doc) => match doc.get("_key") {
                    Some(Value::String(key)) => key.clone(),
                    _ => return Err(QueryError::new(codes::DOCUMENT_KEY_BAD, "illegal document key")),
                },
                _ => return Err(QueryError::new(codes::DOCUMENT_KEY_BAD, "illegal document key")),
            };
            let target = lookup(staged, &name)?;
            if target.documents.remove(&key).is_none() {
                return Err(QueryError::new(
                    codes::DOCUMENT_NOT_FOUND,
                    format!("document not found: {name}/{key}"),
                ));
            }
            Ok(())
        }
        Statement::Length { collection } => {
            let name = resolve_target(collection, bind_vars)?;
            rows.push(Value::from(lookup(staged, &name)?.documents.len()));
            Ok(())
        }
        Statement::Scan { collection } => {
            let name = resolve_target(collection, bind_vars)?;
            rows.extend(lookup(staged, &name)?.documents.values().cloned());
            Ok(())
        }
    }
}

fn insert(collection: &mut Collection, name: &str, value: Value) -> Result<(), QueryError> {
    let Value::Object(mut document) = value else {
        return Err(QueryError::new(
            codes::DOCUMENT_TYPE_INVALID,
            "invalid document type",
        ));
    };
    let key = match document.get("_key") {
        Some(Value::String(key)) if is_valid_key(key) => key.clone(),
        Some(_) => {
            return Err(QueryError::new(
                codes::DOCUMENT_KEY_BAD,
                "illegal document key",
            ))
        }
        None => collection.generate_key(),
    };
    if collection.documents.contains_key(&key) {
        return Err(QueryError::new(
            codes::UNIQUE_CONSTRAINT_VIOLATED,
            format!("unique constraint violated - in index primary over '_key'; conflicting key: {key}"),
        ));
    }
    if collection.kind == CollectionKind::Edge {
        for attribute in ["_from", "_to"] {
            match document.get(attribute) {
                Some(Value::String(handle)) if is_document_handle(handle) => {}
                _ => {
                    return Err(QueryError::new(
                        codes::EDGE_ATTRIBUTE_INVALID,
                        format!("edge attribute missing or invalid: {attribute}"),
                    ))
                }
            }
        }
    }
    document.insert("_key".to_string(), Value::String(key.clone()));
    document.insert("_id".to_string(), Value::String(format!("{name}/{key}")));
    collection.documents.insert(key, Value::Object(document));
    Ok(())
}

fn lookup<'c>(
    staged: &'c mut BTreeMap<String, Collection>,
    name: &str,
) -> Result<&'c mut Collection, QueryError> {
    staged.get_mut(name).ok_or_else(|| {
        QueryError::new(
            codes::COLLECTION_NOT_FOUND,
            format!("collection or view not found: {name}"),
        )
    })
}

fn resolve_operand(operand: &Operand, bind_vars: &BindVars) -> Result<Value, QueryError> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Bind(name) => bind_vars.get(name).cloned().ok_or_else(|| {
            QueryError::new(
                codes::BIND_PARAMETER_MISSING,
                format!("bind parameter '{name}' was not declared"),
            )
        }),
    }
}

fn resolve_target(target: &Target, bind_vars: &BindVars) -> Result<String, QueryError> {
    match target {
        Target::Named(name) => Ok(name.clone()),
        Target::Bind(name) => match bind_vars.get(&format!("@{name}")) {
            Some(Value::String(collection)) => Ok(collection.clone()),
            _ => Err(QueryError::new(
                codes::BIND_PARAMETER_MISSING,
                format!("bind parameter '@{name}' was not declared"),
            )),
        },
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 254
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-:.@()+,=;$!*'%".contains(c))
}

fn is_document_handle(handle: &str) -> bool {
    match handle.split_once('/') {
        Some((collection, key)) => {
            !collection.is_empty() && is_valid_key(key) && !key.contains('/')
        }
        None => false,
    }
}
