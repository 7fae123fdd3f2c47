use regex::RegexBuilder;
use serde_json::{Map, Value};
use shared::error::{Result, RivuletError};

use super::expr::{Condition, FilterExpr, Pattern};

/// Parse a JSON filter object into a [`FilterExpr`].
///
/// Unknown `$` operators, wrong operand shapes and invalid regular
/// expressions are rejected with [`RivuletError::InvalidFilter`].
pub fn parse_filter(value: &Value) -> Result<FilterExpr> {
  let obj = value
    .as_object()
    .ok_or_else(|| invalid(format!("filter must be an object, got {}", value)))?;
  parse_object(obj)
}

fn parse_object(obj: &Map<String, Value>) -> Result<FilterExpr> {
  let mut clauses = Vec::with_capacity(obj.len());
  for (key, value) in obj {
    let clause = match key.as_str() {
      "$and" => FilterExpr::And(parse_list(key, value)?),
      "$or" => FilterExpr::Or(parse_list(key, value)?),
      "$nor" => FilterExpr::Nor(parse_list(key, value)?),
      k if k.starts_with('$') => {
        return Err(invalid(format!("unknown top-level operator {}", k)));
      }
      path => FilterExpr::Field {
        path: path.to_string(),
        cond: parse_field(path, value)?,
      },
    };
    clauses.push(clause);
  }
  Ok(match clauses.len() {
    0 => FilterExpr::All,
    1 => clauses.remove(0),
    _ => FilterExpr::And(clauses),
  })
}

fn parse_list(op: &str, value: &Value) -> Result<Vec<FilterExpr>> {
  let items = value
    .as_array()
    .filter(|a| !a.is_empty())
    .ok_or_else(|| invalid(format!("{} expects a non-empty array", op)))?;
  items.iter().map(parse_filter).collect()
}

fn parse_field(path: &str, value: &Value) -> Result<Condition> {
  match value.as_object() {
    Some(obj) if is_operator_object(obj) => parse_operators(obj),
    Some(obj) if obj.keys().any(|k| k.starts_with('$')) => Err(invalid(format!(
      "field '{}' mixes operators and literal keys",
      path
    ))),
    _ => Ok(Condition::Eq(value.clone())),
  }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
  !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

/// Parse `{"$gte": 1, "$lte": 5}` into one condition.
fn parse_operators(obj: &Map<String, Value>) -> Result<Condition> {
  let options = match obj.get("$options") {
    None => None,
    Some(Value::String(s)) => Some(s.as_str()),
    Some(other) => return Err(invalid(format!("$options expects a string, got {}", other))),
  };
  if options.is_some() && !obj.contains_key("$regex") {
    return Err(invalid("$options without $regex"));
  }

  let mut conds = Vec::with_capacity(obj.len());
  for (op, operand) in obj {
    if op == "$options" {
      continue;
    }
    conds.push(parse_operator(op, operand, options)?);
  }
  Ok(match conds.len() {
    1 => conds.remove(0),
    _ => Condition::Every(conds),
  })
}

fn parse_operator(op: &str, operand: &Value, options: Option<&str>) -> Result<Condition> {
  let cond = match op {
    "$eq" => Condition::Eq(operand.clone()),
    "$ne" => Condition::Ne(operand.clone()),
    "$gt" => Condition::Gt(operand.clone()),
    "$gte" => Condition::Gte(operand.clone()),
    "$lt" => Condition::Lt(operand.clone()),
    "$lte" => Condition::Lte(operand.clone()),
    "$in" => Condition::In(array_operand(op, operand)?),
    "$nin" => Condition::Nin(array_operand(op, operand)?),
    "$all" => Condition::All(array_operand(op, operand)?),
    "$exists" => match operand {
      Value::Bool(b) => Condition::Exists(*b),
      Value::Number(n) => Condition::Exists(n.as_f64().map_or(false, |f| f != 0.0)),
      other => return Err(invalid(format!("$exists expects a boolean, got {}", other))),
    },
    "$regex" => {
      let source = operand
        .as_str()
        .ok_or_else(|| invalid(format!("$regex expects a string, got {}", operand)))?;
      Condition::Regex(compile_pattern(source, options.unwrap_or(""))?)
    }
    "$size" => {
      let n = operand
        .as_u64()
        .ok_or_else(|| invalid(format!("$size expects a non-negative integer, got {}", operand)))?;
      Condition::Size(n as usize)
    }
    "$elemMatch" => {
      let obj = operand
        .as_object()
        .ok_or_else(|| invalid(format!("$elemMatch expects an object, got {}", operand)))?;
      if is_operator_object(obj) && !obj.keys().any(|k| matches!(k.as_str(), "$and" | "$or" | "$nor")) {
        match parse_operators(obj)? {
          Condition::Every(conds) => Condition::ElemMatchValue(conds),
          single => Condition::ElemMatchValue(vec![single]),
        }
      } else {
        Condition::ElemMatchDoc(Box::new(parse_object(obj)?))
      }
    }
    "$not" => {
      let obj = operand
        .as_object()
        .filter(|o| is_operator_object(o))
        .ok_or_else(|| invalid(format!("$not expects an operator object, got {}", operand)))?;
      Condition::Not(Box::new(parse_operators(obj)?))
    }
    other => return Err(invalid(format!("unknown operator {}", other))),
  };
  Ok(cond)
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>> {
  operand
    .as_array()
    .cloned()
    .ok_or_else(|| invalid(format!("{} expects an array, got {}", op, operand)))
}

/// Compile a `$regex` with `$options` flags (`i`, `m`, `s`, `x`).
pub fn compile_pattern(source: &str, options: &str) -> Result<Pattern> {
  let mut builder = RegexBuilder::new(source);
  for flag in options.chars() {
    match flag {
      'i' => builder.case_insensitive(true),
      'm' => builder.multi_line(true),
      's' => builder.dot_matches_new_line(true),
      'x' => builder.ignore_whitespace(true),
      other => return Err(invalid(format!("unsupported $options flag '{}'", other))),
    };
  }
  let regex = builder
    .build()
    .map_err(|e| invalid(format!("invalid $regex '{}': {}", source, e)))?;
  Ok(Pattern {
    source: source.to_string(),
    options: options.to_string(),
    regex,
  })
}

fn invalid(msg: impl Into<String>) -> RivuletError {
  RivuletError::InvalidFilter(msg.into())
}
