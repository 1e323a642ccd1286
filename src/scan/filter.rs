use mlua::{Function, Lua, LuaOptions, LuaSerdeExt, StdLib, Value as LuaValue};
use tracing::debug;

use crate::message::{Expression, ScanRecord};
use crate::{AppError, AppResult};

/// Evaluates the request's boolean expressions against each record inside a
/// sandboxed Lua runtime. Expressions are compiled once per scan; a record
/// matches when any active expression returns true, and an empty expression
/// set matches everything.
///
/// The runtime is created with only the math/string/table libraries, so
/// predicate code has no access to the host filesystem, network or process
/// beyond the bound record fields.
pub struct FilterEngine {
    lua: Lua,
    predicates: Vec<Predicate>,
}

struct Predicate {
    name: String,
    func: Function,
}

impl FilterEngine {
    /// Compiles every active expression. A compile failure drops that one
    /// expression with a diagnostic; a broken filter never aborts the scan.
    pub fn compile(expressions: &[Expression]) -> AppResult<Self> {
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE,
            LuaOptions::default(),
        )
        .map_err(|e| AppError::IllegalStateError(format!("filter runtime: {e}")))?;

        let mut predicates = Vec::new();
        for expression in expressions.iter().filter(|e| e.active) {
            match Self::compile_one(&lua, expression) {
                Ok(func) => predicates.push(Predicate {
                    name: expression.name.clone(),
                    func,
                }),
                Err(e) => {
                    debug!(
                        expression = %expression.name,
                        error = %e,
                        "dropping expression that failed to compile"
                    );
                }
            }
        }
        Ok(Self { lua, predicates })
    }

    fn compile_one(lua: &Lua, expression: &Expression) -> mlua::Result<Function> {
        // Accept bare expressions first, full chunks second.
        let wrapped = format!("return {}", expression.code);
        lua.load(wrapped.as_str())
            .set_name(expression.name.as_str())
            .into_function()
            .or_else(|_| {
                lua.load(expression.code.as_str())
                    .set_name(expression.name.as_str())
                    .into_function()
            })
    }

    pub fn active_count(&self) -> usize {
        self.predicates.len()
    }

    /// OR across active predicates; per-record evaluation failures count as
    /// non-match for that predicate only.
    pub fn matches(&self, record: &ScanRecord) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        if let Err(e) = self.bind(record) {
            debug!(error = %e, "failed to bind record fields, treating as non-match");
            return false;
        }
        self.predicates.iter().any(|predicate| {
            match predicate.func.call::<bool>(()) {
                Ok(matched) => matched,
                Err(e) => {
                    debug!(
                        expression = %predicate.name,
                        error = %e,
                        "expression evaluation failed on record"
                    );
                    false
                }
            }
        })
    }

    fn bind(&self, record: &ScanRecord) -> mlua::Result<()> {
        let globals = self.lua.globals();
        globals.set("key", record.key.clone())?;
        globals.set("value", self.value_binding(record)?)?;
        let headers = self.lua.create_table()?;
        for header in &record.headers {
            if let Some(value) = &header.value {
                headers.set(header.key.as_str(), value.as_str())?;
            }
        }
        globals.set("headers", headers)?;
        globals.set("offset", record.offset)?;
        globals.set("partition", record.partition)?;
        globals.set("timestamp", record.timestamp)?;
        Ok(())
    }

    /// Structured payloads bind as tables so expressions can reach into
    /// fields; everything else binds as the display string.
    fn value_binding(&self, record: &ScanRecord) -> mlua::Result<LuaValue> {
        let Some(value) = &record.value else {
            return Ok(LuaValue::Nil);
        };
        let trimmed = value.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(value) {
                if json.is_object() || json.is_array() {
                    return self.lua.to_value(&json);
                }
            }
        }
        Ok(LuaValue::String(self.lua.create_string(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Header, TimestampKind};

    fn record(key: &str, value: &str) -> ScanRecord {
        ScanRecord {
            partition: 0,
            offset: 7,
            timestamp: 1000,
            timestamp_kind: TimestampKind::CreateTime,
            key_raw: None,
            value_raw: None,
            key: Some(key.to_string()),
            value: Some(value.to_string()),
            headers: vec![Header {
                key: "trace".to_string(),
                value: Some("abc".to_string()),
            }],
        }
    }

    fn engine(codes: &[&str]) -> FilterEngine {
        let expressions: Vec<Expression> = codes
            .iter()
            .enumerate()
            .map(|(i, code)| Expression::new(format!("expr-{i}"), *code))
            .collect();
        FilterEngine::compile(&expressions).unwrap()
    }

    #[test]
    fn test_no_active_expressions_matches_everything() {
        let engine = engine(&[]);
        assert!(engine.matches(&record("k", "v")));
    }

    #[test]
    fn test_inactive_expressions_are_not_compiled() {
        let mut expression = Expression::new("off", "key == \"k\"");
        expression.active = false;
        let engine = FilterEngine::compile(&[expression]).unwrap();
        assert_eq!(engine.active_count(), 0);
        assert!(engine.matches(&record("other", "v")));
    }

    #[test]
    fn test_any_expression_match_is_sufficient() {
        let hit = engine(&["key == \"nope\"", "offset == 7"]);
        assert!(hit.matches(&record("k", "v")));
        let miss = engine(&["key == \"nope\"", "offset == 8"]);
        assert!(!miss.matches(&record("k", "v")));
    }

    #[test]
    fn test_binds_record_fields() {
        assert!(engine(&["key == \"key1\""]).matches(&record("key1", "v")));
        assert!(engine(&["partition == 0"]).matches(&record("k", "v")));
        assert!(engine(&["timestamp >= 1000"]).matches(&record("k", "v")));
        assert!(engine(&["headers.trace == \"abc\""]).matches(&record("k", "v")));
        assert!(engine(&["value == \"v\""]).matches(&record("k", "v")));
    }

    #[test]
    fn test_json_value_binds_as_table() {
        let engine = engine(&["value.user.id == 42"]);
        assert!(engine.matches(&record("k", r#"{"user":{"id":42}}"#)));
        assert!(!engine.matches(&record("k", r#"{"user":{"id":1}}"#)));
    }

    #[test]
    fn test_compile_failure_drops_only_that_expression() {
        let engine = engine(&["this is not lua ((", "key == \"key1\""]);
        assert_eq!(engine.active_count(), 1);
        assert!(engine.matches(&record("key1", "v")));
    }

    #[test]
    fn test_evaluation_failure_is_a_non_match() {
        // Indexing a string like a table raises at eval time.
        let engine = engine(&["value.missing.field == 1"]);
        assert!(!engine.matches(&record("k", "plain")));
    }

    #[test]
    fn test_sandbox_has_no_host_access() {
        assert!(!engine(&["os.time() > 0"]).matches(&record("k", "v")));
        assert!(!engine(&["io.open(\"/etc/passwd\") ~= nil"]).matches(&record("k", "v")));
    }

    #[test]
    fn test_full_chunk_expressions_compile() {
        let engine = engine(&["local n = offset + 1\nreturn n == 8"]);
        assert_eq!(engine.active_count(), 1);
        assert!(engine.matches(&record("k", "v")));
    }
}
