//! Read-only policy for normalized SQL text.
//!
//! Classification is pattern based: a separator check, a command prefix
//! allow-list and a whole-word deny-list of mutation keywords. It does not
//! parse SQL, so keywords inside comments or string literals count too.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::GatewayError;

/// Commands a query may start with.
pub const ALLOWED_COMMANDS: [AllowedCommand; 4] = [
    AllowedCommand::Select,
    AllowedCommand::Show,
    AllowedCommand::Describe,
    AllowedCommand::Explain,
];

/// Keywords that reject a query wherever they appear as a whole word.
pub const MUTATION_KEYWORDS: [&str; 11] = [
    "INSERT", "UPDATE", "DELETE", "REPLACE", "MERGE", "TRUNCATE", "CREATE", "ALTER", "DROP",
    "GRANT", "REVOKE",
];

static MUTATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({})\b", MUTATION_KEYWORDS.join("|")))
        .expect("mutation keyword pattern is a valid regex")
});

/// Read-only command a validated query starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllowedCommand {
    Select,
    Show,
    Describe,
    Explain,
}

impl AllowedCommand {
    /// Upper-case prefix matched against the query.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Explain => "EXPLAIN",
        }
    }
}

impl fmt::Display for AllowedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Validator applying the read-only policy.
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    mutation_pattern: Regex,
}

impl Default for PolicyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyValidator {
    /// Creates a validator using the built-in allow and deny lists.
    pub fn new() -> Self {
        Self {
            mutation_pattern: MUTATION_PATTERN.clone(),
        }
    }

    /// Validates normalized SQL, returning the command it starts with.
    ///
    /// Rules are checked in order, so `update ZUTAT set BESTAND=0` fails the
    /// command rule before the keyword rule is reached. The input is never
    /// modified; matching runs on an upper-cased copy.
    pub fn validate(&self, sql: &str) -> Result<AllowedCommand, GatewayError> {
        if sql.contains(';') {
            return Err(GatewayError::MultipleStatements);
        }

        let upper = sql.to_uppercase();

        let command = ALLOWED_COMMANDS
            .into_iter()
            .find(|command| upper.starts_with(command.prefix()))
            .ok_or(GatewayError::CommandNotAllowed)?;

        if let Some(found) = self.mutation_pattern.find(&upper) {
            return Err(GatewayError::MutationKeywordPresent {
                keyword: found.as_str().to_string(),
            });
        }

        Ok(command)
    }
}

/// Convenience function to validate without holding a validator.
pub fn validate(sql: &str) -> Result<AllowedCommand, GatewayError> {
    PolicyValidator::new().validate(sql)
}
