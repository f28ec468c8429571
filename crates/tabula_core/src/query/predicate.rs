//! Caller-supplied filters over entity fields.
//!
//! # Responsibility
//! - Let callers express boolean tests over entity fields without knowing
//!   storage column names.
//! - Translate field-level filters to column-level filters for a session.
//! - Evaluate the same filter against an in-memory entity.
//!
//! # Invariants
//! - `Predicate<T>` always names entity fields; column names only appear
//!   after `Filter::to_columns`.
//! - Comparisons involving null never match, on either evaluation path.

use crate::mapping::schema::SchemaDescriptor;
use crate::repo::error::{RepoError, RepoResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Untyped filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// SQL `LIKE`: `%` matches any run, `_` one character, ASCII case-insensitive.
    Like {
        field: String,
        pattern: String,
    },
    IsNull(String),
    NotNull(String),
    /// Matches nothing when `values` is empty.
    OneOf {
        field: String,
        values: Vec<Value>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Rewrites entity field names to storage columns of `schema`.
    ///
    /// # Errors
    /// - `InvalidArgument` when a field is unknown or ignored.
    pub fn to_columns(&self, schema: &SchemaDescriptor) -> RepoResult<Filter> {
        let column = |field: &str| -> RepoResult<String> {
            schema
                .column_for(field)
                .map(|binding| binding.column.clone())
                .ok_or_else(|| {
                    RepoError::InvalidArgument(format!(
                        "predicate field `{field}` is not persisted by {}",
                        schema.entity_name()
                    ))
                })
        };

        Ok(match self {
            Self::All => Self::All,
            Self::Compare { field, op, value } => Self::Compare {
                field: column(field)?,
                op: *op,
                value: value.clone(),
            },
            Self::Like { field, pattern } => Self::Like {
                field: column(field)?,
                pattern: pattern.clone(),
            },
            Self::IsNull(field) => Self::IsNull(column(field)?),
            Self::NotNull(field) => Self::NotNull(column(field)?),
            Self::OneOf { field, values } => Self::OneOf {
                field: column(field)?,
                values: values.clone(),
            },
            Self::And(filters) => Self::And(
                filters
                    .iter()
                    .map(|filter| filter.to_columns(schema))
                    .collect::<RepoResult<_>>()?,
            ),
            Self::Or(filters) => Self::Or(
                filters
                    .iter()
                    .map(|filter| filter.to_columns(schema))
                    .collect::<RepoResult<_>>()?,
            ),
            Self::Not(inner) => Self::Not(Box::new(inner.to_columns(schema)?)),
        })
    }

    /// Evaluates the filter against a field map.
    ///
    /// Unknown outcomes (a comparison against null) count as "no match",
    /// including under `Not`, the way SQL three-valued logic does.
    pub fn evaluate(&self, fields: &Map<String, Value>) -> bool {
        self.evaluate_tri(fields) == Some(true)
    }

    fn evaluate_tri(&self, fields: &Map<String, Value>) -> Option<bool> {
        let lookup = |field: &str| fields.get(field).unwrap_or(&Value::Null);
        match self {
            Self::All => Some(true),
            Self::Compare { field, op, value } => {
                let current = lookup(field);
                if current.is_null() || value.is_null() {
                    return None;
                }
                Some(compare_values(current, value).is_some_and(|ordering| op.accepts(ordering)))
            }
            Self::Like { field, pattern } => match lookup(field) {
                Value::Null => None,
                Value::String(text) => Some(like_matches(pattern, text)),
                Value::Number(number) => Some(like_matches(pattern, &number.to_string())),
                _ => Some(false),
            },
            Self::IsNull(field) => Some(lookup(field).is_null()),
            Self::NotNull(field) => Some(!lookup(field).is_null()),
            Self::OneOf { field, values } => {
                let current = lookup(field);
                if values.is_empty() {
                    return Some(false);
                }
                if current.is_null() {
                    return None;
                }
                Some(
                    values
                        .iter()
                        .any(|candidate| compare_values(current, candidate) == Some(Ordering::Equal)),
                )
            }
            Self::And(filters) => {
                let mut outcome = Some(true);
                for filter in filters {
                    match filter.evaluate_tri(fields) {
                        Some(false) => return Some(false),
                        None => outcome = None,
                        Some(true) => {}
                    }
                }
                outcome
            }
            Self::Or(filters) => {
                let mut outcome = Some(false);
                for filter in filters {
                    match filter.evaluate_tri(fields) {
                        Some(true) => return Some(true),
                        None => outcome = None,
                        Some(false) => {}
                    }
                }
                outcome
            }
            Self::Not(inner) => inner.evaluate_tri(fields).map(|outcome| !outcome),
        }
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(left), Value::Number(right)) => {
            if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
                return Some(left.cmp(&right));
            }
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        (Value::Bool(flag), Value::Number(number)) => {
            Some(i64::from(*flag).cmp(&number.as_i64()?))
        }
        (Value::Number(number), Value::Bool(flag)) => {
            Some(number.as_i64()?.cmp(&i64::from(*flag)))
        }
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

/// SQLite `LIKE` semantics: `%` spans any run, `_` one character, and
/// letters compare ASCII case-insensitively.
fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();
    let (mut p, mut t) = (0, 0);
    // Last `%` seen and the text position it currently absorbs up to.
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some('%') => {
                resume = Some((p, t));
                p += 1;
            }
            Some(ch) if ch == '_' || ch.eq_ignore_ascii_case(&text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match resume {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    resume = Some((star, t));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|ch| *ch == '%')
}

/// Typed boolean test over the fields of `T`.
///
/// ```
/// use tabula_core::Predicate;
///
/// # #[derive(Default, serde::Serialize)]
/// # struct Beverage { id: i64, key: String }
/// let guinness = Predicate::<Beverage>::eq("key", "GUINNESS").or(Predicate::gt("id", 10));
/// assert!(guinness.matches(&Beverage { id: 1, key: "GUINNESS".into() }).unwrap());
/// ```
pub struct Predicate<T> {
    filter: Filter,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T> Predicate<T> {
    pub fn from_filter(filter: Filter) -> Self {
        Self {
            filter,
            _entity: PhantomData,
        }
    }

    /// Matches every row.
    pub fn all() -> Self {
        Self::from_filter(Filter::All)
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn like(field: &str, pattern: impl Into<String>) -> Self {
        Self::from_filter(Filter::Like {
            field: field.to_string(),
            pattern: pattern.into(),
        })
    }

    pub fn is_null(field: &str) -> Self {
        Self::from_filter(Filter::IsNull(field.to_string()))
    }

    pub fn not_null(field: &str) -> Self {
        Self::from_filter(Filter::NotNull(field.to_string()))
    }

    pub fn one_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::from_filter(Filter::OneOf {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn and(self, other: Self) -> Self {
        Self::from_filter(match self.filter {
            Filter::And(mut filters) => {
                filters.push(other.filter);
                Filter::And(filters)
            }
            filter => Filter::And(vec![filter, other.filter]),
        })
    }

    pub fn or(self, other: Self) -> Self {
        Self::from_filter(match self.filter {
            Filter::Or(mut filters) => {
                filters.push(other.filter);
                Filter::Or(filters)
            }
            filter => Filter::Or(vec![filter, other.filter]),
        })
    }

    pub fn negate(self) -> Self {
        Self::from_filter(Filter::Not(Box::new(self.filter)))
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    fn compare(field: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::from_filter(Filter::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        })
    }
}

impl<T: Serialize> Predicate<T> {
    /// Evaluates the predicate against one in-memory value.
    pub fn matches(&self, item: &T) -> RepoResult<bool> {
        match serde_json::to_value(item) {
            Ok(Value::Object(fields)) => Ok(self.filter.evaluate(&fields)),
            Ok(_) => Err(RepoError::InvalidArgument(
                "predicates only apply to struct-shaped values".to_string(),
            )),
            Err(err) => Err(RepoError::InvalidArgument(format!(
                "failed to serialize predicate subject: {err}"
            ))),
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_filter(self.filter.clone())
    }
}

impl<T> Debug for Predicate<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.filter).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{like_matches, Filter, Predicate};
    use crate::mapping::schema::{EntityMapping, SchemaDescriptor};
    use crate::model::entity::DataItem;
    use crate::repo::error::RepoError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Cask {
        id: i64,
        name: String,
        litres: f64,
        sealed: bool,
        origin: Option<String>,
        memo: String,
    }

    impl DataItem for Cask {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn cask() -> Cask {
        Cask {
            id: 4,
            name: "Oloroso".to_string(),
            litres: 250.0,
            sealed: true,
            origin: None,
            memo: String::new(),
        }
    }

    #[test]
    fn comparisons_follow_value_types() {
        let item = cask();
        assert!(Predicate::<Cask>::eq("name", "Oloroso").matches(&item).unwrap());
        assert!(Predicate::<Cask>::gt("litres", 200).matches(&item).unwrap());
        assert!(Predicate::<Cask>::le("id", 4).matches(&item).unwrap());
        assert!(Predicate::<Cask>::eq("sealed", true).matches(&item).unwrap());
        assert!(!Predicate::<Cask>::ne("id", 4).matches(&item).unwrap());
    }

    #[test]
    fn null_never_satisfies_a_comparison() {
        let item = cask();
        assert!(!Predicate::<Cask>::eq("origin", "Jerez").matches(&item).unwrap());
        assert!(!Predicate::<Cask>::ne("origin", "Jerez").matches(&item).unwrap());
        assert!(Predicate::<Cask>::is_null("origin").matches(&item).unwrap());
        assert!(!Predicate::<Cask>::eq("origin", "Jerez")
            .negate()
            .matches(&item)
            .unwrap());
    }

    #[test]
    fn combinators_compose() {
        let item = cask();
        let predicate = Predicate::<Cask>::eq("name", "Fino")
            .or(Predicate::one_of("id", [3, 4]))
            .and(Predicate::not_null("name"));
        assert!(predicate.matches(&item).unwrap());
        assert!(!predicate.clone().negate().matches(&item).unwrap());
        assert!(!Predicate::<Cask>::one_of("id", Vec::<i64>::new())
            .matches(&item)
            .unwrap());
    }

    #[test]
    fn like_uses_sql_wildcards() {
        assert!(like_matches("olo%", "Oloroso"));
        assert!(like_matches("_loroso", "oloroso"));
        assert!(!like_matches("olo_", "Oloroso"));
        assert!(like_matches("50.0%", "50.0% abv"));
    }

    #[test]
    fn like_treats_other_characters_literally() {
        assert!(!like_matches("a.c", "abc"));
        assert!(like_matches("a.c", "A.C"));
        assert!(like_matches("(dry)%", "(Dry) stout"));
        assert!(like_matches("%[cask]%", "aged [CASK] 12y"));
        assert!(!like_matches("^ale$", "ale"));
        assert!(like_matches("%o%o%", "Oloroso"));
        assert!(!like_matches("%z%", "Oloroso"));
        assert!(like_matches("%", ""));
        assert!(!like_matches("_", ""));
        assert!(like_matches("caf_", "café"));
    }

    #[test]
    fn columns_are_resolved_through_the_schema() {
        let schema = SchemaDescriptor::build::<Cask>(
            &EntityMapping::table("casks")
                .key("id")
                .column("name", "cask_name")
                .ignore("memo"),
        )
        .unwrap();

        let resolved = Predicate::<Cask>::eq("name", "Fino")
            .and(Predicate::gt("id", 1))
            .filter()
            .to_columns(&schema)
            .unwrap();
        match resolved {
            Filter::And(filters) => {
                assert!(matches!(&filters[0], Filter::Compare { field, .. } if field == "cask_name"));
                assert!(matches!(&filters[1], Filter::Compare { field, .. } if field == "id"));
            }
            other => panic!("unexpected filter: {other:?}"),
        }

        let err = Predicate::<Cask>::eq("memo", "x")
            .filter()
            .to_columns(&schema)
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument(_)));
    }
}
