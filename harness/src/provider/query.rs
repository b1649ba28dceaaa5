/*!

A small subset of `jq` used to pull single fields out of provider CLI JSON output.

Supported filters are `.`, `.field`, `.[]`, `.[N]` (negative `N` counts from the end), chains of
those such as `.[].Name`, the `length` builtin and `|` pipelines. Results are rendered the way
`jq -r` renders them: strings without quotes, everything else as compact JSON, one result per line.

!*/

use crate::error::{self, Result};
use serde_json::Value;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Step {
    Field(String),
    Iterate,
    Index(i64),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Stage {
    Path(Vec<Step>),
    Length,
}

/// A parsed filter expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    expression: String,
    stages: Vec<Stage>,
}

impl Query {
    /// Parses `expression`. Surrounding single quotes, as written for a shell, are ignored.
    pub fn parse<S: AsRef<str>>(expression: S) -> Result<Self> {
        let original = expression.as_ref().trim();
        let unquoted = original
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(original);
        let stages = unquoted
            .split('|')
            .map(|stage| parse_stage(original, stage.trim()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            expression: original.to_string(),
            stages,
        })
    }

    /// Applies the filter to `input`, producing zero or more values.
    pub fn evaluate(&self, input: &Value) -> Result<Vec<Value>> {
        let mut values = vec![input.clone()];
        for stage in &self.stages {
            let mut next = Vec::new();
            for value in &values {
                match stage {
                    Stage::Length => next.push(self.length(value)?),
                    Stage::Path(steps) => next.extend(self.walk(value, steps)?),
                }
            }
            values = next;
        }
        Ok(values)
    }

    /// Applies the filter and renders the results like `jq -r`, trimmed of trailing whitespace.
    pub fn evaluate_raw(&self, input: &Value) -> Result<String> {
        let lines: Vec<String> = self.evaluate(input)?.iter().map(render).collect();
        Ok(lines.join("\n").trim().to_string())
    }

    fn walk(&self, value: &Value, steps: &[Step]) -> Result<Vec<Value>> {
        let mut values = vec![value.clone()];
        for step in steps {
            let mut next = Vec::new();
            for value in values {
                match (step, value) {
                    (_, Value::Null) if *step != Step::Iterate => next.push(Value::Null),
                    (Step::Field(name), Value::Object(mut map)) => {
                        next.push(map.remove(name).unwrap_or(Value::Null))
                    }
                    (Step::Iterate, Value::Array(items)) => next.extend(items),
                    (Step::Iterate, Value::Object(map)) => next.extend(map.into_iter().map(|(_, v)| v)),
                    (Step::Index(index), Value::Array(items)) => {
                        let len = items.len() as i64;
                        let resolved = if *index < 0 { len + index } else { *index };
                        let item = usize::try_from(resolved)
                            .ok()
                            .and_then(|i| items.get(i).cloned())
                            .unwrap_or(Value::Null);
                        next.push(item)
                    }
                    (step, value) => {
                        return self.fail(format!(
                            "cannot apply {:?} to {}",
                            step,
                            type_name(&value)
                        ))
                    }
                }
            }
            values = next;
        }
        Ok(values)
    }

    fn length(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::Null => Value::from(0),
            Value::Array(items) => Value::from(items.len()),
            Value::Object(map) => Value::from(map.len()),
            Value::String(s) => Value::from(s.chars().count()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Value::from(i.abs()),
                None => Value::from(n.as_f64().map(f64::abs).unwrap_or_default()),
            },
            Value::Bool(_) => return self.fail("boolean has no length"),
        })
    }

    fn fail<T, S: Into<String>>(&self, reason: S) -> Result<T> {
        error::QuerySnafu {
            expression: &self.expression,
            reason,
        }
        .fail()
    }
}

fn parse_stage(expression: &str, stage: &str) -> Result<Stage> {
    if stage == "length" {
        return Ok(Stage::Length);
    }
    let invalid = |reason: String| {
        error::QuerySnafu {
            expression,
            reason,
        }
        .fail()
    };
    if !stage.starts_with('.') {
        return invalid(format!("unsupported filter '{}'", stage));
    }
    let chars: Vec<char> = stage.chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                if i < chars.len() && is_ident_char(chars[i]) {
                    let start = i;
                    while i < chars.len() && is_ident_char(chars[i]) {
                        i += 1;
                    }
                    steps.push(Step::Field(chars[start..i].iter().collect()));
                }
            }
            '[' => {
                let close = match chars[i..].iter().position(|c| *c == ']') {
                    Some(offset) => i + offset,
                    None => return invalid(format!("unclosed '[' in '{}'", stage)),
                };
                let inner: String = chars[i + 1..close].iter().collect();
                let inner = inner.trim();
                if inner.is_empty() {
                    steps.push(Step::Iterate);
                } else {
                    match inner.parse::<i64>() {
                        Ok(index) => steps.push(Step::Index(index)),
                        Err(_) => return invalid(format!("unsupported index '[{}]'", inner)),
                    }
                }
                i = close + 1;
            }
            c => return invalid(format!("unexpected character '{}' in '{}'", c, stage)),
        }
    }
    Ok(Stage::Path(steps))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses `expression` and applies it to `input` in one step.
pub fn extract<S: AsRef<str>>(expression: S, input: &Value) -> Result<String> {
    Query::parse(expression)?.evaluate_raw(input)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn eksctl_cluster() -> Value {
        json!([{
            "Name": "auto-hosted-abcde",
            "Version": "1.29",
            "Logging": {"ClusterLogging": [{"Types": ["api", "audit"], "Enabled": true}]}
        }])
    }

    fn eksctl_nodegroups() -> Value {
        json!([
            {"Name": "ranchernodes", "DesiredCapacity": 2, "ImageID": "AL2_x86_64"},
            {"Name": "gpuenabled", "DesiredCapacity": 1, "ImageID": "AL2_x86_64_GPU"}
        ])
    }

    #[test]
    fn iterate_then_field() {
        assert_eq!(extract(".[]|.Version", &eksctl_cluster()).unwrap(), "1.29");
        assert_eq!(
            extract(".[].Name", &eksctl_nodegroups()).unwrap(),
            "ranchernodes\ngpuenabled"
        );
    }

    #[test]
    fn length_of_root() {
        assert_eq!(extract(".|length", &eksctl_nodegroups()).unwrap(), "2");
        assert_eq!(extract("'.|length'", &eksctl_nodegroups()).unwrap(), "2");
    }

    #[test]
    fn nested_iteration_renders_compact_json() {
        assert_eq!(
            extract(".[]|.Logging|.[]|.[]|.Types", &eksctl_cluster()).unwrap(),
            r#"["api","audit"]"#
        );
    }

    #[test]
    fn indexes() {
        assert_eq!(extract(".[1].ImageID", &eksctl_nodegroups()).unwrap(), "AL2_x86_64_GPU");
        assert_eq!(extract(".[-1].Name", &eksctl_nodegroups()).unwrap(), "gpuenabled");
        assert_eq!(extract(".[5].Name", &eksctl_nodegroups()).unwrap(), "null");
    }

    #[test]
    fn missing_field_is_null() {
        assert_eq!(extract(".[0].Missing", &eksctl_nodegroups()).unwrap(), "null");
    }

    #[test]
    fn invalid_filters() {
        assert!(Query::parse("keys").is_err());
        assert!(Query::parse(".[").is_err());
        assert!(Query::parse(".[abc]").is_err());
        assert!(extract(".Name", &eksctl_nodegroups()).is_err());
    }
}
