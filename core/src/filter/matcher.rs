use serde_json::Value;
use std::cmp::Ordering;

use super::compare::{compare_values, values_equal};
use super::expr::{Condition, FilterExpr};

/// Test one document against a filter.
pub fn test(doc: &Value, expr: &FilterExpr) -> bool {
  match expr {
    FilterExpr::All => true,
    FilterExpr::And(xs) => xs.iter().all(|x| test(doc, x)),
    FilterExpr::Or(xs) => xs.iter().any(|x| test(doc, x)),
    FilterExpr::Nor(xs) => !xs.iter().any(|x| test(doc, x)),
    FilterExpr::Field { path, cond } => {
      let mut found = Vec::new();
      let segments: Vec<&str> = path.split('.').collect();
      resolve(doc, &segments, &mut found);
      eval(&found, cond)
    }
  }
}

impl FilterExpr {
  pub fn matches(&self, doc: &Value) -> bool {
    test(doc, self)
  }
}

/// Collect every value reachable at `path`, descending into arrays of
/// sub-documents along the way.
fn resolve<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
  let Some((head, rest)) = path.split_first() else {
    out.push(value);
    return;
  };
  match value {
    Value::Object(map) => {
      if let Some(child) = map.get(*head) {
        resolve(child, rest, out);
      }
    }
    Value::Array(items) => {
      if let Some(child) = head.parse::<usize>().ok().and_then(|i| items.get(i)) {
        resolve(child, rest, out);
      }
      for item in items.iter().filter(|i| i.is_object()) {
        resolve(item, path, out);
      }
    }
    _ => {}
  }
}

/// Candidate values plus, for array candidates, their elements.
fn leaves<'a>(found: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
  found.iter().flat_map(|v| {
    let elems: &'a [Value] = match v {
      Value::Array(items) => items.as_slice(),
      _ => &[],
    };
    std::iter::once(*v).chain(elems.iter())
  })
}

fn eval(found: &[&Value], cond: &Condition) -> bool {
  match cond {
    Condition::Eq(v) => equals(found, v),
    Condition::Ne(v) => !equals(found, v),
    Condition::Gt(v) => ordered(found, v, |o| o == Ordering::Greater),
    Condition::Gte(v) => ordered(found, v, |o| o != Ordering::Less),
    Condition::Lt(v) => ordered(found, v, |o| o == Ordering::Less),
    Condition::Lte(v) => ordered(found, v, |o| o != Ordering::Greater),
    Condition::In(vs) => vs.iter().any(|v| equals(found, v)),
    Condition::Nin(vs) => !vs.iter().any(|v| equals(found, v)),
    Condition::Exists(want) => found.is_empty() != *want,
    Condition::Regex(p) => leaves(found).any(|v| v.as_str().map_or(false, |s| p.regex.is_match(s))),
    Condition::Size(n) => found
      .iter()
      .any(|v| v.as_array().map_or(false, |a| a.len() == *n)),
    Condition::All(vs) => !vs.is_empty() && vs.iter().all(|v| equals(found, v)),
    Condition::ElemMatchDoc(expr) => arrays(found).any(|e| e.is_object() && test(e, expr)),
    Condition::ElemMatchValue(conds) => {
      arrays(found).any(|e| conds.iter().all(|c| eval(&[e], c)))
    }
    Condition::Not(c) => !eval(found, c),
    Condition::Every(conds) => conds.iter().all(|c| eval(found, c)),
  }
}

fn arrays<'a>(found: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
  found
    .iter()
    .filter_map(|v| v.as_array())
    .flat_map(|a| a.iter())
}

/// `null` matches a missing field as well as an explicit null.
fn equals(found: &[&Value], expected: &Value) -> bool {
  if expected.is_null() && found.is_empty() {
    return true;
  }
  leaves(found).any(|v| values_equal(v, expected))
}

fn ordered(found: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
  leaves(found).any(|v| compare_values(v, bound).map_or(false, &accept))
}
