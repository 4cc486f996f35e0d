//! Column declarations produced by `#[derive(Table)]` or written by hand.

use std::collections::BTreeMap;

use crate::error::DeclarationError;

/// Recognized column tag keys.
pub mod tags {
    /// Overrides the column name.
    pub const NAME: &str = "name";
    /// Text width (turns TEXT into VARCHAR) or integer display width.
    pub const WIDTH: &str = "width";
    /// Character set for text columns.
    pub const CHARSET: &str = "charset";
    /// Collation for text columns.
    pub const COLLATION: &str = "collation";
    /// Whether NULL is allowed. Defaults to `true` outside primary keys.
    pub const NULLABLE: &str = "nullable";
    /// Default value, as text.
    pub const DEFAULT: &str = "default";
    /// Primary key membership.
    pub const PRIMARY: &str = "primary";
    /// Auto-increment marker. Implies `primary`.
    pub const AUTO_INCREMENT: &str = "auto_increment";
    /// Row version bumped on every update.
    pub const AUTO_VERSION: &str = "auto_version";
    /// Filled with the current time on insert.
    pub const CREATED_AT: &str = "created_at";
    /// Refreshed with the current time on insert and update.
    pub const UPDATED_AT: &str = "updated_at";
    /// Comma separated index names, or `true` for a single-column index.
    pub const INDEX: &str = "index";
    /// Like [`INDEX`] but the indexes are unique.
    pub const UNIQUE_INDEX: &str = "unique_index";
    /// ClickHouse `PARTITION BY` expression.
    pub const CLICKHOUSE_PARTITION_BY: &str = "clickhouse_partition_by";
    /// ClickHouse sorting key membership.
    pub const CLICKHOUSE_ORDER_BY: &str = "clickhouse_order_by";
}

/// One declared field of a table struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDecl {
    /// Column name before normalization.
    pub name: String,
    /// Rust type with whitespace removed and `Option<..>` unwrapped.
    pub rust_type: String,
    /// Whether the field was declared as `Option<T>`.
    pub is_pointer: bool,
    /// Flat tag map.
    pub tags: BTreeMap<String, String>,
}

impl ColumnDecl {
    /// Creates a declaration with no tags.
    #[must_use]
    pub fn new(name: impl Into<String>, rust_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rust_type: rust_type.into(),
            is_pointer: false,
            tags: BTreeMap::new(),
        }
    }

    /// Marks the field as optional.
    #[must_use]
    pub const fn pointer(mut self, is_pointer: bool) -> Self {
        self.is_pointer = is_pointer;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The effective column name: the `name` tag if present, lower-cased.
    #[must_use]
    pub fn column_name(&self) -> String {
        self.tags
            .get(tags::NAME)
            .unwrap_or(&self.name)
            .to_lowercase()
    }

    /// Maps the Rust type to its storage category.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::UnsupportedType`] for references, unit
    /// and tuple types.
    pub fn native_type(&self) -> Result<NativeType, DeclarationError> {
        NativeType::from_rust_type(&self.rust_type).ok_or_else(|| {
            DeclarationError::UnsupportedType {
                column: self.column_name(),
                rust_type: self.rust_type.clone(),
            }
        })
    }
}

/// Storage category of a declared Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    /// `bool`.
    Bool,
    /// [`crate::TriState`].
    TriState,
    /// Fixed width integers.
    Int {
        /// Width in bits.
        bits: u8,
        /// Unsigned flag.
        unsigned: bool,
    },
    /// `f32` or `f64`.
    Float {
        /// `f64` when set.
        double: bool,
    },
    /// `String`.
    Text,
    /// `chrono` timestamps.
    DateTime,
    /// Anything else serializable; stored as JSON text.
    Compound,
}

impl NativeType {
    /// Classifies a whitespace-free Rust type string.
    #[must_use]
    pub fn from_rust_type(rust_type: &str) -> Option<Self> {
        if rust_type.is_empty() || rust_type.starts_with('&') || rust_type.starts_with('(') {
            return None;
        }
        let base = rust_type.split('<').next().unwrap_or(rust_type);
        let last = base.rsplit("::").next().unwrap_or(base);
        let native = match last {
            "bool" => Self::Bool,
            "TriState" => Self::TriState,
            "i8" => Self::Int { bits: 8, unsigned: false },
            "i16" => Self::Int { bits: 16, unsigned: false },
            "i32" => Self::Int { bits: 32, unsigned: false },
            "i64" | "isize" => Self::Int { bits: 64, unsigned: false },
            "u8" => Self::Int { bits: 8, unsigned: true },
            "u16" => Self::Int { bits: 16, unsigned: true },
            "u32" => Self::Int { bits: 32, unsigned: true },
            "u64" | "usize" => Self::Int { bits: 64, unsigned: true },
            "f32" => Self::Float { double: false },
            "f64" => Self::Float { double: true },
            "String" | "str" => Self::Text,
            "NaiveDateTime" | "DateTime" => Self::DateTime,
            _ => Self::Compound,
        };
        Some(native)
    }
}
