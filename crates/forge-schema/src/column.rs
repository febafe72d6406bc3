//! Column definitions.
//!
//! A [`Column`] is dialect independent: it records a [`ColumnType`] and its
//! modifiers. The DDL generators turn it into SQL for a specific engine.

use forge_core::Value;

use crate::foreign_key::ForeignKey;

/// Abstract column types understood by every generator.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    TinyInteger,
    SmallInteger,
    Integer,
    BigInteger,
    Char { length: u32 },
    String { length: u32 },
    Text,
    MediumText,
    LongText,
    Boolean,
    Date,
    Time,
    DateTime,
    Timestamp,
    Decimal { precision: u8, scale: u8 },
    Float,
    Double,
    Enum(Vec<String>),
    Set(Vec<String>),
    Json,
    Jsonb,
    Uuid,
    Binary,
    IpAddress,
    MacAddress,
}

impl ColumnType {
    /// Whether `UNSIGNED` and auto-increment apply.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyInteger
                | ColumnType::SmallInteger
                | ColumnType::Integer
                | ColumnType::BigInteger
        )
    }

    /// Whether `UNSIGNED` applies (integers and fixed/floating point).
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ColumnType::Decimal { .. } | ColumnType::Float | ColumnType::Double
            )
    }
}

/// A column default.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// A literal, quoted for the target dialect.
    Value(Value),
    /// An SQL expression emitted verbatim.
    Raw(String),
}

/// One column of a blueprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub unsigned: bool,
    pub auto_increment: bool,
    pub primary: bool,
    pub unique: bool,
    pub index: bool,
    pub comment: Option<String>,
    /// Modify an existing column instead of adding one (alter mode).
    pub change: bool,
    /// Inline foreign key declared with `references`/`constrained`.
    pub foreign: Option<ForeignKey>,
}

impl Column {
    /// A `NOT NULL` column without modifiers.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
            unsigned: false,
            auto_increment: false,
            primary: false,
            unique: false,
            index: false,
            comment: None,
            change: false,
            foreign: None,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Set nullability explicitly (used with `change()` to make a column required).
    pub fn nullable_if(&mut self, nullable: bool) -> &mut Self {
        self.nullable = nullable;
        self
    }

    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    /// Default given as a raw SQL expression.
    pub fn default_raw(&mut self, expression: &str) -> &mut Self {
        self.default = Some(ColumnDefault::Raw(expression.to_string()));
        self
    }

    /// `DEFAULT CURRENT_TIMESTAMP`.
    pub fn use_current(&mut self) -> &mut Self {
        self.default_raw("CURRENT_TIMESTAMP")
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Auto-incrementing primary key.
    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self.primary = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn index(&mut self) -> &mut Self {
        self.index = true;
        self
    }

    pub fn comment(&mut self, comment: &str) -> &mut Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Mark the column as a modification of an existing one.
    pub fn change(&mut self) -> &mut Self {
        self.change = true;
        self
    }

    // ==================== Inline foreign keys ====================

    fn foreign_mut(&mut self) -> &mut ForeignKey {
        let name = self.name.clone();
        self.foreign.get_or_insert_with(|| ForeignKey::new(name))
    }

    /// Referenced column of the inline foreign key.
    pub fn references(&mut self, column: &str) -> &mut Self {
        self.foreign_mut().references(column);
        self
    }

    /// Referenced table of the inline foreign key.
    pub fn on(&mut self, table: &str) -> &mut Self {
        self.foreign_mut().on(table);
        self
    }

    /// Reference the conventional table for this column: `user_id` points
    /// at `users.id`.
    pub fn constrained(&mut self) -> &mut Self {
        let base = self.name.strip_suffix("_id").unwrap_or(&self.name);
        let table = forge_core::inflect::pluralize(base);
        self.foreign_mut().references("id").on(&table);
        self
    }

    /// Reference `table.id`.
    pub fn constrained_on(&mut self, table: &str) -> &mut Self {
        self.foreign_mut().references("id").on(table);
        self
    }

    pub fn on_delete(&mut self, action: &str) -> &mut Self {
        self.foreign_mut().on_delete(action);
        self
    }

    pub fn on_update(&mut self, action: &str) -> &mut Self {
        self.foreign_mut().on_update(action);
        self
    }

    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.foreign_mut().cascade_on_delete();
        self
    }

    pub fn null_on_delete(&mut self) -> &mut Self {
        self.foreign_mut().null_on_delete();
        self
    }

    pub fn restrict_on_delete(&mut self) -> &mut Self {
        self.foreign_mut().restrict_on_delete();
        self
    }

    pub fn cascade_on_update(&mut self) -> &mut Self {
        self.foreign_mut().cascade_on_update();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign_key::ReferentialAction;

    #[test]
    fn test_modifiers_chain() {
        let mut column = Column::new("votes", ColumnType::Integer);
        column.unsigned().nullable().default(0).comment("tally");
        assert!(column.unsigned && column.nullable);
        assert_eq!(column.default, Some(ColumnDefault::Value(Value::Int(0))));
        assert_eq!(column.comment.as_deref(), Some("tally"));
        assert!(column.foreign.is_none());
    }

    #[test]
    fn test_auto_increment_implies_primary() {
        let mut column = Column::new("id", ColumnType::BigInteger);
        column.auto_increment();
        assert!(column.primary);
    }

    #[test]
    fn test_constrained_infers_table() {
        let mut column = Column::new("category_id", ColumnType::BigInteger);
        column.constrained().null_on_delete();
        let fk = column.foreign.as_ref().unwrap();
        assert_eq!(fk.on, "categories");
        assert_eq!(fk.references, "id");
        assert_eq!(fk.column, "category_id");
        assert_eq!(fk.on_delete, ReferentialAction::SetNull);
    }

    #[test]
    fn test_references_on() {
        let mut column = Column::new("author_id", ColumnType::BigInteger);
        column.references("uuid").on("people").on_update("cascade");
        let fk = column.foreign.as_ref().unwrap();
        assert_eq!((fk.references.as_str(), fk.on.as_str()), ("uuid", "people"));
        assert_eq!(fk.on_update, ReferentialAction::Cascade);
    }

    #[test]
    fn test_numeric_classification() {
        assert!(ColumnType::BigInteger.is_integer());
        assert!(ColumnType::Decimal { precision: 8, scale: 2 }.is_numeric());
        assert!(!ColumnType::Text.is_numeric());
    }
}
