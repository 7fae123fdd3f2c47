use regex::Regex;
use serde_json::{Map, Value};

/// A parsed document filter.
///
/// Filters travel as JSON objects (`{"age": {"$lte": 5}}`) and are parsed
/// once into this tree so per-event evaluation never re-inspects JSON keys.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
  /// The empty filter `{}`; matches every document.
  All,
  And(Vec<FilterExpr>),
  Or(Vec<FilterExpr>),
  Nor(Vec<FilterExpr>),
  /// A condition on the value(s) found at a dotted path.
  Field { path: String, cond: Condition },
}

/// A condition applied to a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
  Eq(Value),
  Ne(Value),
  Gt(Value),
  Gte(Value),
  Lt(Value),
  Lte(Value),
  In(Vec<Value>),
  Nin(Vec<Value>),
  Exists(bool),
  Regex(Pattern),
  Size(usize),
  All(Vec<Value>),
  /// `$elemMatch` with a sub-document filter.
  ElemMatchDoc(Box<FilterExpr>),
  /// `$elemMatch` with operators applied to scalar elements.
  ElemMatchValue(Vec<Condition>),
  Not(Box<Condition>),
  /// Several operators in one field object, e.g. `{"$gte": 1, "$lte": 5}`.
  Every(Vec<Condition>),
}

/// A compiled `$regex` together with its source text and options.
#[derive(Debug, Clone)]
pub struct Pattern {
  pub source: String,
  pub options: String,
  pub regex: Regex,
}

impl PartialEq for Pattern {
  fn eq(&self, other: &Self) -> bool {
    self.source == other.source && self.options == other.options
  }
}

impl FilterExpr {
  /// `{path: value}` equality.
  pub fn field_eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
    FilterExpr::Field {
      path: path.into(),
      cond: Condition::Eq(value.into()),
    }
  }

  /// Flattened conjunction of `self` and `other`.
  ///
  /// Constraints on the same field are kept side by side, never replaced.
  pub fn and(self, other: FilterExpr) -> FilterExpr {
    let mut parts = Vec::new();
    for expr in [self, other] {
      match expr {
        FilterExpr::All => {}
        FilterExpr::And(xs) => parts.extend(xs),
        x => parts.push(x),
      }
    }
    match parts.len() {
      0 => FilterExpr::All,
      1 => parts.remove(0),
      _ => FilterExpr::And(parts),
    }
  }

  pub fn is_all(&self) -> bool {
    matches!(self, FilterExpr::All)
  }

  /// Serialize back to the JSON filter language.
  pub fn to_json(&self) -> Value {
    match self {
      FilterExpr::All => Value::Object(Map::new()),
      FilterExpr::And(xs) => logical("$and", xs),
      FilterExpr::Or(xs) => logical("$or", xs),
      FilterExpr::Nor(xs) => logical("$nor", xs),
      FilterExpr::Field { path, cond } => {
        let mut obj = Map::new();
        let rendered = match cond {
          Condition::Eq(v) if !v.is_object() => v.clone(),
          other => Value::Object(other.to_operators()),
        };
        obj.insert(path.clone(), rendered);
        Value::Object(obj)
      }
    }
  }
}

fn logical(op: &str, xs: &[FilterExpr]) -> Value {
  let mut obj = Map::new();
  obj.insert(
    op.to_string(),
    Value::Array(xs.iter().map(FilterExpr::to_json).collect()),
  );
  Value::Object(obj)
}

impl Condition {
  /// Render as an operator object (`{"$gt": 3}`).
  pub fn to_operators(&self) -> Map<String, Value> {
    let mut m = Map::new();
    match self {
      Condition::Eq(v) => put(&mut m, "$eq", v.clone()),
      Condition::Ne(v) => put(&mut m, "$ne", v.clone()),
      Condition::Gt(v) => put(&mut m, "$gt", v.clone()),
      Condition::Gte(v) => put(&mut m, "$gte", v.clone()),
      Condition::Lt(v) => put(&mut m, "$lt", v.clone()),
      Condition::Lte(v) => put(&mut m, "$lte", v.clone()),
      Condition::In(vs) => put(&mut m, "$in", Value::Array(vs.clone())),
      Condition::Nin(vs) => put(&mut m, "$nin", Value::Array(vs.clone())),
      Condition::Exists(b) => put(&mut m, "$exists", Value::Bool(*b)),
      Condition::Regex(p) => {
        put(&mut m, "$regex", Value::String(p.source.clone()));
        if !p.options.is_empty() {
          put(&mut m, "$options", Value::String(p.options.clone()));
        }
      }
      Condition::Size(n) => put(&mut m, "$size", Value::from(*n as u64)),
      Condition::All(vs) => put(&mut m, "$all", Value::Array(vs.clone())),
      Condition::ElemMatchDoc(expr) => put(&mut m, "$elemMatch", expr.to_json()),
      Condition::ElemMatchValue(conds) => {
        let mut inner = Map::new();
        for c in conds {
          inner.extend(c.to_operators());
        }
        put(&mut m, "$elemMatch", Value::Object(inner));
      }
      Condition::Not(c) => put(&mut m, "$not", Value::Object(c.to_operators())),
      Condition::Every(conds) => {
        for c in conds {
          m.extend(c.to_operators());
        }
      }
    }
    m
  }
}

fn put(m: &mut Map<String, Value>, k: &str, v: Value) {
  m.insert(k.to_string(), v);
}
