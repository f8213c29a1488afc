use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::error::EngineError;
use crate::languages::LanguageProfile;

/// Monotonic counter folded into scratch directory names so that two
/// executions of the same (submission, case) pair can never collide.
static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A per-execution temporary directory, exclusively owned by one in-flight
/// test case. Removed on drop on every exit path, including timeout and
/// cancellation.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(root: &Path, submission_id: u64, case_index: usize) -> Result<Self, EngineError> {
        let unique = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "gradebox-{submission_id}-{case_index}-{}-{unique}",
            std::process::id()
        );
        let path = root.join(name);
        fs::create_dir_all(&path)
            .map_err(|e| EngineError::infrastructure("create scratch directory", e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            log::warn!(
                "failed to remove scratch directory {}: {e}",
                self.path.display()
            );
        }
    }
}

/// Writes the harness-wrapped source file for one execution into `dir` and
/// returns its path.
pub fn materialize(
    profile: &LanguageProfile,
    user_code: &str,
    input: &str,
    dir: &Path,
) -> Result<PathBuf, EngineError> {
    let args = parse_input_args(input)?;
    let source = (profile.harness)(user_code, &args);
    let path = dir.join(profile.source_file);
    fs::write(&path, source).map_err(|e| EngineError::infrastructure("write source file", e))?;
    Ok(path)
}

/// Parses a test case input string ("[2,7,11,15],9") into one JSON value
/// per top-level argument. The JSON value tree is the language-agnostic
/// form each harness renders into native literals.
pub fn parse_input_args(input: &str) -> Result<Vec<Value>, EngineError> {
    split_top_level(input)?
        .into_iter()
        .map(|arg| {
            serde_json::from_str(&arg)
                .map_err(|e| EngineError::InvalidInput(format!("argument `{arg}`: {e}")))
        })
        .collect()
}

/// Splits on commas at bracket depth zero, respecting `[]`/`{}` nesting and
/// string quoting. `"[1,2],9"` -> `["[1,2]", "9"]`.
pub fn split_top_level(input: &str) -> Result<Vec<String>, EngineError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for ch in trimmed.chars() {
        if in_string {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                current.push(ch);
            }
            '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(EngineError::InvalidInput(format!(
                        "unbalanced brackets in `{trimmed}`"
                    )));
                }
                current.push(ch);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if depth != 0 || in_string {
        return Err(EngineError::InvalidInput(format!(
            "unbalanced brackets or quotes in `{trimmed}`"
        )));
    }
    args.push(current.trim().to_string());
    Ok(args)
}

// ---------------------------------------------------------------------------
// Literal rendering
// ---------------------------------------------------------------------------

/// JSON string escaping doubles as a valid string literal in every target
/// language here.
fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Fallback for shapes a static language's literal grammar can't express
/// (objects, heterogeneous arrays): the raw JSON text as a string literal.
fn quoted_json(value: &Value) -> String {
    quoted(&value.to_string())
}

fn number_literal(n: &serde_json::Number) -> String {
    n.to_string()
}

fn js_literal(value: &Value) -> String {
    value.to_string()
}

fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(python_literal).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", quoted(k), python_literal(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

fn ruby_literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(ruby_literal).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}=>{}", quoted(k), ruby_literal(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

/// Element type of an array for statically typed targets, inferred from the
/// first element; an empty array defaults to int.
fn first_element(items: &[Value]) -> &Value {
    items.first().unwrap_or(&Value::Null)
}

fn java_base_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(n) => {
            if n.as_i64().is_some_and(|v| i32::try_from(v).is_err()) {
                "long"
            } else {
                "int"
            }
        }
        Value::String(_) => "String",
        _ => "int",
    }
}

fn java_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.as_i64().is_some_and(|v| i32::try_from(v).is_err()) {
                format!("{n}L")
            } else {
                number_literal(n)
            }
        }
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let mut depth = 1;
            let mut leaf = first_element(items);
            while let Value::Array(inner) = leaf {
                depth += 1;
                leaf = first_element(inner);
            }
            let ty = format!("{}{}", java_base_type(leaf), "[]".repeat(depth));
            format!("new {ty}{}", java_array_body(items))
        }
        Value::Object(_) => quoted_json(value),
    }
}

fn java_array_body(items: &[Value]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Array(inner) => java_array_body(inner),
            other => java_literal(other),
        })
        .collect();
    format!("{{{}}}", parts.join(","))
}

fn cpp_type(value: &Value) -> String {
    match value {
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "double".to_string(),
        Value::Number(_) => "int".to_string(),
        Value::String(_) => "std::string".to_string(),
        Value::Array(items) => format!("std::vector<{}>", cpp_type(first_element(items))),
        _ => "int".to_string(),
    }
}

fn cpp_literal(value: &Value) -> String {
    match value {
        Value::Null => "0".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => format!("std::string({})", quoted(s)),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    // Inner dimensions brace-initialize.
                    Value::Array(inner) => cpp_brace_body(inner),
                    other => cpp_literal(other),
                })
                .collect();
            format!(
                "std::vector<{}>{{{}}}",
                cpp_type(first_element(items)),
                parts.join(",")
            )
        }
        Value::Object(_) => format!("std::string({})", quoted_json(value)),
    }
}

fn cpp_brace_body(items: &[Value]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Array(inner) => cpp_brace_body(inner),
            other => cpp_literal(other),
        })
        .collect();
    format!("{{{}}}", parts.join(","))
}

fn csharp_type(value: &Value) -> String {
    match value {
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "double".to_string(),
        Value::Number(n) => {
            if n.as_i64().is_some_and(|v| i32::try_from(v).is_err()) {
                "long".to_string()
            } else {
                "int".to_string()
            }
        }
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("{}[]", csharp_type(first_element(items))),
        _ => "int".to_string(),
    }
}

fn csharp_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(csharp_literal).collect();
            format!(
                "new {}[]{{{}}}",
                csharp_type(first_element(items)),
                parts.join(",")
            )
        }
        Value::Object(_) => quoted_json(value),
    }
}

fn go_type(value: &Value) -> String {
    match value {
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "float64".to_string(),
        Value::Number(_) => "int".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("[]{}", go_type(first_element(items))),
        _ => "int".to_string(),
    }
}

fn go_literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(go_literal).collect();
            format!("[]{}{{{}}}", go_type(first_element(items)), parts.join(","))
        }
        Value::Object(_) => quoted_json(value),
    }
}

fn rust_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(n),
        Value::String(s) => format!("{}.to_string()", quoted(s)),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(rust_literal).collect();
            format!("vec![{}]", parts.join(","))
        }
        Value::Object(_) => format!("{}.to_string()", quoted_json(value)),
    }
}

fn join_args(args: &[Value], render: fn(&Value) -> String) -> String {
    args.iter().map(render).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Harness templates
// ---------------------------------------------------------------------------
//
// Each harness embeds the user's code verbatim; a missing or misnamed
// `solution` entry point surfaces as the language's own compile or runtime
// error, never as a materializer failure. The printed form is canonical
// across languages: JSON-shaped, no interior spaces, strings quoted.

pub fn javascript_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        "{user_code}\n\n\
         const __args = [{args}];\n\
         const __result = solution(...__args);\n\
         const __text = JSON.stringify(__result);\n\
         console.log(__text === undefined ? String(__result) : __text);\n",
        args = join_args(args, js_literal),
    )
}

pub fn python_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        "import json\n\n\
         {user_code}\n\n\
         if __name__ == \"__main__\":\n    \
             __result = solution({args})\n    \
             print(json.dumps(__result, separators=(\",\", \":\")))\n",
        args = join_args(args, python_literal),
    )
}

pub fn ruby_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        "require \"json\"\n\n\
         {user_code}\n\n\
         __result = solution({args})\n\
         puts __result.to_json\n",
        args = join_args(args, ruby_literal),
    )
}

pub fn java_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        r#"import java.util.*;

{user_code}

public class Main {{
    public static void main(String[] argv) {{
        Object result = Solution.solution({args});
        System.out.println(fmt(result));
    }}

    static String fmt(Object value) {{
        if (value == null) return "null";
        if (value instanceof String) return "\"" + value + "\"";
        if (value instanceof int[]) return Arrays.toString((int[]) value).replace(" ", "");
        if (value instanceof long[]) return Arrays.toString((long[]) value).replace(" ", "");
        if (value instanceof double[]) return Arrays.toString((double[]) value).replace(" ", "");
        if (value instanceof boolean[]) return Arrays.toString((boolean[]) value).replace(" ", "");
        if (value instanceof Object[]) return Arrays.deepToString((Object[]) value).replace(" ", "");
        if (value instanceof List) return value.toString().replace(" ", "");
        return String.valueOf(value);
    }}
}}
"#,
        args = join_args(args, java_literal),
    )
}

pub fn cpp_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        r#"#include <bits/stdc++.h>
using namespace std;

{user_code}

static void __print(bool v);
static void __print(const string &v);
template <typename T> void __print(const T &v);
template <typename T> void __print(const vector<T> &v);

static void __print(bool v) {{ cout << (v ? "true" : "false"); }}
static void __print(const string &v) {{ cout << '"' << v << '"'; }}
template <typename T> void __print(const T &v) {{ cout << v; }}
template <typename T> void __print(const vector<T> &v) {{
    cout << '[';
    for (size_t i = 0; i < v.size(); ++i) {{
        if (i) cout << ',';
        __print(v[i]);
    }}
    cout << ']';
}}

int main() {{
    auto __result = solution({args});
    __print(__result);
    cout << '\n';
    return 0;
}}
"#,
        args = join_args(args, cpp_literal),
    )
}

pub fn csharp_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        r#"using System;
using System.Collections.Generic;

{user_code}

static class Harness
{{
    static void Main()
    {{
        object result = Solution.solution({args});
        Console.WriteLine(Fmt(result));
    }}

    static string Fmt(object v)
    {{
        if (v == null) return "null";
        if (v is string s) return "\"" + s + "\"";
        if (v is bool b) return b ? "true" : "false";
        if (v is System.Collections.IEnumerable e)
        {{
            var parts = new List<string>();
            foreach (var item in e) parts.Add(Fmt(item));
            return "[" + string.Join(",", parts) + "]";
        }}
        return Convert.ToString(v, System.Globalization.CultureInfo.InvariantCulture);
    }}
}}
"#,
        args = join_args(args, csharp_literal),
    )
}

pub fn go_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        r#"package main

import (
	"encoding/json"
	"fmt"
)

{user_code}

func main() {{
	result := solution({args})
	text, err := json.Marshal(result)
	if err != nil {{
		fmt.Println(result)
		return
	}}
	fmt.Println(string(text))
}}
"#,
        args = join_args(args, go_literal),
    )
}

pub fn rust_harness(user_code: &str, args: &[Value]) -> String {
    format!(
        "{user_code}\n\n\
         fn main() {{\n    \
             let result = solution({args});\n    \
             println!(\"{{}}\", format!(\"{{:?}}\", result).replace(' ', \"\"));\n\
         }}\n",
        args = join_args(args, rust_literal),
    )
}
