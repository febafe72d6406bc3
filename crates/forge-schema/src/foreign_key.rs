//! Foreign-key declarations.
//!
//! A [`ForeignKey`] is declared either on the blueprint
//! (`t.foreign("user_id").references("id").on("users")`) or inline on a
//! column (`t.foreign_id("user_id").constrained()`). Actions are given as
//! strings and validated when declared; an unknown action is reported when
//! the blueprint is compiled, before any statement runs.

use std::fmt;
use std::str::FromStr;

use forge_core::Error;

/// What happens to referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    /// Raise an error if references exist (engine default).
    #[default]
    NoAction,
    /// Reject the change.
    Restrict,
    /// Delete or update the referencing rows.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
    /// Set referencing columns to their default.
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword(s).
    pub const fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl FromStr for ReferentialAction {
    type Err = Error;

    /// Case-insensitive; spaces, underscores or nothing between words.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Ok(ReferentialAction::NoAction),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" | "NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" | "SET_DEFAULT" => Ok(ReferentialAction::SetDefault),
            _ => Err(Error::configuration(format!(
                "invalid referential action `{s}`"
            ))),
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single-column foreign-key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Constraint name; derived from the table and column when `None`.
    pub name: Option<String>,
    /// Referencing column.
    pub column: String,
    /// Referenced column.
    pub references: String,
    /// Referenced table.
    pub on: String,
    /// `ON DELETE` action.
    pub on_delete: ReferentialAction,
    /// `ON UPDATE` action.
    pub on_update: ReferentialAction,
    invalid: Vec<String>,
}

impl ForeignKey {
    /// A foreign key on `column` referencing `id` on a table still to be named.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            name: None,
            column: column.into(),
            references: "id".to_string(),
            on: String::new(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
            invalid: Vec::new(),
        }
    }

    /// Referenced column.
    pub fn references(&mut self, column: &str) -> &mut Self {
        self.references = column.to_string();
        self
    }

    /// Referenced table.
    pub fn on(&mut self, table: &str) -> &mut Self {
        self.on = table.to_string();
        self
    }

    /// Explicit constraint name.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    /// `ON DELETE` action by name (`cascade`, `set null`, `restrict`, ...).
    pub fn on_delete(&mut self, action: &str) -> &mut Self {
        match action.parse() {
            Ok(action) => self.on_delete = action,
            Err(err) => self.invalid.push(format!("ON DELETE for `{}`: {err}", self.column)),
        }
        self
    }

    /// `ON UPDATE` action by name.
    pub fn on_update(&mut self, action: &str) -> &mut Self {
        match action.parse() {
            Ok(action) => self.on_update = action,
            Err(err) => self.invalid.push(format!("ON UPDATE for `{}`: {err}", self.column)),
        }
        self
    }

    /// `ON DELETE CASCADE`.
    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete = ReferentialAction::Cascade;
        self
    }

    /// `ON DELETE SET NULL`.
    pub fn null_on_delete(&mut self) -> &mut Self {
        self.on_delete = ReferentialAction::SetNull;
        self
    }

    /// `ON DELETE RESTRICT`.
    pub fn restrict_on_delete(&mut self) -> &mut Self {
        self.on_delete = ReferentialAction::Restrict;
        self
    }

    /// `ON UPDATE CASCADE`.
    pub fn cascade_on_update(&mut self) -> &mut Self {
        self.on_update = ReferentialAction::Cascade;
        self
    }

    /// Constraint name, `<table>_<column>_foreign` unless set explicitly.
    pub fn constraint_name(&self, table: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{table}_{}_foreign", self.column))
    }

    /// Problems recorded while the key was declared.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = self.invalid.clone();
        if self.on.is_empty() {
            problems.push(format!(
                "foreign key on `{}` does not name a referenced table",
                self.column
            ));
        }
        problems
    }
}
