//! Queries for locating records in a catalog.
//!
//! The backend's query engine is whitespace-sensitive: clauses are joined by
//! `"\nand "` and the field name, operator and value of a clause are separated
//! by tabs. The canned constructors below produce exactly that layout.

use crate::{
    Result,
    constants::{field_names, field_values},
    error::{DamError, ensure_not_empty},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Separator between the clauses of a query expression.
pub const CLAUSE_SEPARATOR: &str = "\nand ";

/// Separator between the tokens of a single clause.
pub const TOKEN_SEPARATOR: &str = "\t";

/// Flags controlling how the backend evaluates a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FindFlag {
    /// Referencing a field missing from the catalog fails the query
    MissingFieldsAreError,
    /// Referencing an unknown string-list value fails the query
    MissingStringListValuesAreError,
    /// Unknown string-list values are replaced instead of failing
    MissingStringListValuesReplace,
    /// Category searches follow the user's settings
    SearchCategoriesUseUserSettings,
}

/// How a query result is combined with a previous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineMode {
    /// Start a new result
    FindNew,
    /// Restrict the previous result
    FindNarrow,
    /// Extend the previous result
    FindWiden,
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineMode::FindNew => write!(f, "FIND_NEW"),
            CombineMode::FindNarrow => write!(f, "FIND_NARROW"),
            CombineMode::FindWiden => write!(f, "FIND_WIDEN"),
        }
    }
}

/// Comparison operators understood by the query grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Exact match
    Is,
    /// Substring match
    Contains,
}

impl Operator {
    /// The keyword of the operator in a query expression.
    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Is => "is",
            Operator::Contains => "contains",
        }
    }

    /// Parses an operator keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "is" => Some(Operator::Is),
            "contains" => Some(Operator::Contains),
            _ => None,
        }
    }
}

/// Locale used by the backend for value comparisons, as a BCP 47 tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale(String);

impl Locale {
    /// The root (language-neutral) locale.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Creates a locale from a language tag such as `da-DK`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The language tag; empty for the root locale.
    pub fn tag(&self) -> &str {
        &self.0
    }
}

/// One `field operator value` clause of a query expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause<'a> {
    /// Field name
    pub field: &'a str,
    /// Comparison operator
    pub operator: Operator,
    /// Value compared against
    pub value: &'a str,
}

impl fmt::Display for Clause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.field,
            TOKEN_SEPARATOR,
            self.operator.keyword(),
            TOKEN_SEPARATOR,
            self.value
        )
    }
}

/// A query for locating records in a catalog.
///
/// Everything except the locale is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    expression: String,
    find_flags: BTreeSet<FindFlag>,
    combine_mode: CombineMode,
    locale: Option<Locale>,
}

impl Query {
    /// Creates a query; the locale starts out unset.
    ///
    /// # Errors
    /// Returns [`DamError::InvalidArgument`] when the expression or the flag set
    /// is empty.
    pub fn new(
        expression: impl Into<String>,
        find_flags: impl IntoIterator<Item = FindFlag>,
        combine_mode: CombineMode,
    ) -> Result<Self> {
        let expression = expression.into();
        ensure_not_empty(&expression, "query expression")?;
        let find_flags: BTreeSet<FindFlag> = find_flags.into_iter().collect();
        if find_flags.is_empty() {
            return Err(DamError::invalid_argument(
                "query find flags must not be empty",
            ));
        }

        tracing::debug!(
            "Instantiated query '{}' with flags {:?} and combine-mode {}",
            expression,
            find_flags,
            combine_mode
        );

        Ok(Self {
            expression,
            find_flags,
            combine_mode,
            locale: None,
        })
    }

    /// Query for every record of a catalog.
    pub fn all_in_catalog(catalog_name: &str) -> Result<Self> {
        ensure_not_empty(catalog_name, "catalog name")?;
        Self::canned(&[Clause {
            field: field_names::CATALOG_NAME,
            operator: Operator::Is,
            value: catalog_name,
        }])
    }

    /// Query for the records of a catalog with a given record name.
    pub fn by_record_name(catalog_name: &str, name: &str) -> Result<Self> {
        ensure_not_empty(catalog_name, "catalog name")?;
        ensure_not_empty(name, "record name")?;
        Self::canned(&[
            Clause {
                field: field_names::RECORD_NAME,
                operator: Operator::Is,
                value: name,
            },
            Clause {
                field: field_names::CATALOG_NAME,
                operator: Operator::Is,
                value: catalog_name,
            },
        ])
    }

    /// Query for the registered records of a catalog whose identifier contains
    /// `identifier`.
    ///
    /// The stored identifier carries a vendor prefix, so this is a substring
    /// match. A full identifier should match a single record.
    pub fn by_identifier(catalog_name: &str, identifier: &str) -> Result<Self> {
        ensure_not_empty(catalog_name, "catalog name")?;
        ensure_not_empty(identifier, "identifier")?;
        Self::canned(&[
            Clause {
                field: field_names::GUID,
                operator: Operator::Contains,
                value: identifier,
            },
            Clause {
                field: field_names::REGISTRATION_STATE,
                operator: Operator::Is,
                value: field_values::REGISTRATION_STATE_FINISHED,
            },
            Clause {
                field: field_names::CATALOG_NAME,
                operator: Operator::Is,
                value: catalog_name,
            },
        ])
    }

    fn canned(clauses: &[Clause<'_>]) -> Result<Self> {
        let expression = clauses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(CLAUSE_SEPARATOR);
        Self::new(
            expression,
            [
                FindFlag::MissingFieldsAreError,
                FindFlag::MissingStringListValuesAreError,
            ],
            CombineMode::FindNew,
        )
    }

    /// The query expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The evaluation flags.
    pub fn find_flags(&self) -> &BTreeSet<FindFlag> {
        &self.find_flags
    }

    /// Whether the given evaluation flag is set.
    pub fn has_flag(&self, flag: FindFlag) -> bool {
        self.find_flags.contains(&flag)
    }

    /// The combine mode.
    pub fn combine_mode(&self) -> CombineMode {
        self.combine_mode
    }

    /// The locale, if one has been set.
    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    /// Sets or clears the locale.
    pub fn set_locale(&mut self, locale: Option<Locale>) {
        self.locale = locale;
    }

    /// Splits the expression back into its clauses.
    ///
    /// Returns `None` when a clause does not follow the
    /// `field<TAB>operator<TAB>value` layout.
    pub fn clauses(&self) -> Option<Vec<Clause<'_>>> {
        self.expression
            .split(CLAUSE_SEPARATOR)
            .map(|clause| {
                let mut tokens = clause.splitn(3, TOKEN_SEPARATOR);
                let field = tokens.next()?;
                let operator = Operator::from_keyword(tokens.next()?)?;
                let value = tokens.next()?;
                Some(Clause {
                    field,
                    operator,
                    value,
                })
            })
            .collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Query: {}]", self.expression)
    }
}
