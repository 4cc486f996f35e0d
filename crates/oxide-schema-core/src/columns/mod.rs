//! Column type system.
//!
//! A [`ColumnSpec`] describes one table column: its semantic kind, storage
//! attributes and the backend that renders it. Columns are built once from
//! a flat tag map and are immutable afterwards. The definition string a
//! column renders to is a pure function of these attributes plus the
//! backend, which is what the diff engine compares.

mod convert;
mod decl;

use std::collections::BTreeMap;
use std::fmt;

pub(crate) use convert::{parse_bool_text, parse_datetime};
pub use decl::{tags, ColumnDecl, NativeType};

use crate::backend::Backend;
use crate::error::DeclarationError;
use crate::tristate::TriState;

/// Semantic kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Two-valued boolean stored as an integer.
    Boolean,
    /// [`TriState`] stored as a nullable integer.
    TriState,
    /// Integer.
    Integer {
        /// Unsigned flag.
        unsigned: bool,
    },
    /// Floating point number.
    Float,
    /// Character data.
    Text,
    /// Timestamp.
    DateTime,
    /// Structured value serialized as JSON text.
    Compound,
}

impl ColumnKind {
    /// Returns `true` for kinds whose stored form is character data.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::Text | Self::Compound)
    }

    /// Returns `true` for integer-backed kinds.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::TriState | Self::Integer { .. } | Self::Float
        )
    }
}

/// SQL types whose values live out of row and which some backends refuse
/// to give a default.
const TEXT_BLOB_TYPES: &[&str] = &[
    "TINYTEXT",
    "TEXT",
    "MEDIUMTEXT",
    "LONGTEXT",
    "TINYBLOB",
    "BLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "JSON",
];

/// A column of a table, bound to the backend that renders it.
#[derive(Clone)]
pub struct ColumnSpec {
    pub(crate) name: String,
    pub(crate) sql_type: String,
    pub(crate) kind: ColumnKind,
    pub(crate) width: Option<u32>,
    pub(crate) charset: Option<String>,
    pub(crate) collation: Option<String>,
    pub(crate) nullable: bool,
    pub(crate) default: Option<String>,
    pub(crate) primary: bool,
    pub(crate) auto_increment: bool,
    pub(crate) auto_version: bool,
    pub(crate) created_at: bool,
    pub(crate) updated_at: bool,
    pub(crate) is_pointer: bool,
    pub(crate) tags: BTreeMap<String, String>,
    pub(crate) backend: &'static dyn Backend,
}

impl ColumnSpec {
    /// Builds a column from a tag map and validates it.
    ///
    /// `sql_type` is the backend type keyword (`VARCHAR`, `INTEGER`, ...);
    /// the width comes from the `width` tag.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] when a tag value cannot be parsed, a
    /// default is set on a non-pointer boolean/tri-state column, or the
    /// backend forbids a default for this type.
    pub fn new(
        backend: &'static dyn Backend,
        name: &str,
        kind: ColumnKind,
        sql_type: &str,
        tags: &BTreeMap<String, String>,
        is_pointer: bool,
    ) -> Result<Self, DeclarationError> {
        let spec = Self::from_tags(backend, name, kind, sql_type, tags, is_pointer)?;
        spec.check_default()?;
        backend.validate_column(&spec)?;
        Ok(spec)
    }

    /// Builds a column without default-legality checks. Used for columns
    /// read back from a live database, which may hold anything.
    pub(crate) fn from_tags(
        backend: &'static dyn Backend,
        name: &str,
        kind: ColumnKind,
        sql_type: &str,
        tags: &BTreeMap<String, String>,
        is_pointer: bool,
    ) -> Result<Self, DeclarationError> {
        let name = name.to_lowercase();
        let flag = |key: &str| -> Result<Option<bool>, DeclarationError> {
            tags.get(key)
                .map(|v| {
                    parse_bool_text(v).ok_or_else(|| DeclarationError::InvalidTag {
                        column: name.clone(),
                        tag: key.to_string(),
                        value: v.clone(),
                    })
                })
                .transpose()
        };

        let auto_increment = flag(tags::AUTO_INCREMENT)?.unwrap_or(false);
        let primary = flag(tags::PRIMARY)?.unwrap_or(false) || auto_increment;
        // A tri-state needs NULL to store `none`.
        let nullable = if primary {
            false
        } else {
            kind == ColumnKind::TriState || flag(tags::NULLABLE)?.unwrap_or(true)
        };
        let width = tags
            .get(tags::WIDTH)
            .map(|w| {
                w.trim().parse::<u32>().map_err(|_| DeclarationError::InvalidTag {
                    column: name.clone(),
                    tag: tags::WIDTH.to_string(),
                    value: w.clone(),
                })
            })
            .transpose()?;
        let default = tags
            .get(tags::DEFAULT)
            .map(|d| normalize_default(&name, kind, d))
            .transpose()?
            .flatten();

        Ok(Self {
            sql_type: sql_type.to_string(),
            kind,
            width,
            charset: tags.get(tags::CHARSET).cloned(),
            collation: tags.get(tags::COLLATION).cloned(),
            nullable,
            default,
            primary,
            auto_increment,
            auto_version: flag(tags::AUTO_VERSION)?.unwrap_or(false),
            created_at: flag(tags::CREATED_AT)?.unwrap_or(false),
            updated_at: flag(tags::UPDATED_AT)?.unwrap_or(false),
            is_pointer,
            tags: tags.clone(),
            backend,
            name,
        })
    }

    fn check_default(&self) -> Result<(), DeclarationError> {
        if self.is_pointer {
            return Ok(());
        }
        let reason = match (self.kind, self.default.as_deref()) {
            (ColumnKind::Boolean, Some(d)) if d != "0" => {
                "a non-optional boolean may only default to false"
            }
            (ColumnKind::TriState, Some(_)) => "a non-optional tri-state may only default to none",
            _ => return Ok(()),
        };
        Err(DeclarationError::DefaultNotAllowed {
            column: self.name.clone(),
            reason: reason.to_string(),
        })
    }

    /// Renders the column definition used in CREATE/ALTER statements.
    #[must_use]
    pub fn definition_string(&self) -> String {
        self.backend.column_definition(self)
    }

    /// Two columns are identical when their definition strings match.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.backend.columns_equivalent(self, other)
    }

    /// Column name, lower-cased.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column name quoted for the owning backend.
    #[must_use]
    pub fn quoted_name(&self) -> String {
        self.backend.quote_identifier(&self.name)
    }

    /// Backend type keyword, without width.
    #[must_use]
    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    /// Semantic kind.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Declared width.
    #[must_use]
    pub const fn width(&self) -> Option<u32> {
        self.width
    }

    /// Character set, if the backend keeps one.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Collation, if the backend keeps one.
    #[must_use]
    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Whether NULL is allowed.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Normalized default value text.
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Primary key membership.
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.primary
    }

    /// Auto-increment marker.
    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Row version marker.
    #[must_use]
    pub const fn is_auto_version(&self) -> bool {
        self.auto_version
    }

    /// Creation timestamp marker.
    #[must_use]
    pub const fn is_created_at(&self) -> bool {
        self.created_at
    }

    /// Modification timestamp marker.
    #[must_use]
    pub const fn is_updated_at(&self) -> bool {
        self.updated_at
    }

    /// Whether the declaring field was optional.
    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        self.is_pointer
    }

    /// Raw tag value.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Backend owning this column.
    #[must_use]
    pub fn backend(&self) -> &'static dyn Backend {
        self.backend
    }

    /// Returns `true` for TEXT/BLOB class types.
    #[must_use]
    pub fn is_text_blob(&self) -> bool {
        TEXT_BLOB_TYPES.contains(&self.sql_type.to_ascii_uppercase().as_str())
    }
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("backend", &self.backend.name())
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("definition", &self.definition_string())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ColumnSpec {
    fn eq(&self, other: &Self) -> bool {
        self.backend.name() == other.backend.name()
            && self.name == other.name
            && self.kind == other.kind
            && self.is_pointer == other.is_pointer
            && self.auto_version == other.auto_version
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.definition_string() == other.definition_string()
    }
}

fn normalize_default(
    column: &str,
    kind: ColumnKind,
    value: &str,
) -> Result<Option<String>, DeclarationError> {
    let invalid = || DeclarationError::InvalidTag {
        column: column.to_string(),
        tag: tags::DEFAULT.to_string(),
        value: value.to_string(),
    };
    match kind {
        ColumnKind::Boolean => parse_bool_text(value)
            .map(|b| Some(if b { "1" } else { "0" }.to_string()))
            .ok_or_else(invalid),
        ColumnKind::TriState => {
            let t = value.parse::<TriState>().map_err(|_| invalid())?;
            Ok(t.as_bool().map(|b| if b { "1" } else { "0" }.to_string()))
        }
        ColumnKind::Integer { unsigned } => {
            let trimmed = value.trim();
            let ok = if unsigned {
                trimmed.parse::<u64>().is_ok()
            } else {
                trimmed.parse::<i64>().is_ok()
            };
            if ok {
                Ok(Some(trimmed.to_string()))
            } else {
                Err(invalid())
            }
        }
        ColumnKind::Float => {
            let trimmed = value.trim();
            trimmed
                .parse::<f64>()
                .map(|_| Some(trimmed.to_string()))
                .map_err(|_| invalid())
        }
        ColumnKind::Text | ColumnKind::DateTime | ColumnKind::Compound => {
            Ok(Some(value.to_string()))
        }
    }
}
