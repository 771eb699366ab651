//! Logic blocks: `logic-if-else`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{BlockContext, BlockError, BlockHandler, BlockOutput};

/// `logic-if-else` — evaluate a condition and select the `true` or `false`
/// outgoing handle.  Downstream nodes wired to the unselected handle are
/// gated off by the engine.
///
/// The condition arrives either on the `condition` input handle or through
/// a `conditionPath` config entry.
pub struct LogicIfElse;

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[async_trait]
impl BlockHandler for LogicIfElse {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let condition = ctx
            .inputs
            .get("condition")
            .or_else(|| ctx.config.get("conditionPath"))
            .ok_or_else(|| {
                BlockError::config("logic-if-else requires a 'condition' input or 'conditionPath'")
            })?;

        // An optional `equals` comparison narrows truthiness to equality.
        let result = match ctx.config.get("equals") {
            Some(expected) => condition == expected,
            None => truthy(condition),
        };

        let branch = if result { "true" } else { "false" };
        Ok(
            BlockOutput::value(json!({ "branch": branch, "condition": condition }))
                .with_selected_handle(branch),
        )
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::collections::HashMap;

    #[tokio::test]
    async fn selects_true_handle_for_truthy_condition() {
        let config = json!({});
        let payload = json!({});
        let memory = Map::new();
        let mut inputs = HashMap::new();
        inputs.insert("condition".to_owned(), json!(true));

        let ctx = BlockContext {
            run_id: uuid::Uuid::new_v4(),
            node_id: "branch",
            config: &config,
            payload: &payload,
            memory: &memory,
            inputs: &inputs,
            connector: None,
        };

        let out = LogicIfElse.execute(&ctx).await.unwrap();
        assert_eq!(out.selected_handle.as_deref(), Some("true"));
        assert_eq!(out.value["branch"], "true");
    }

    #[tokio::test]
    async fn equals_comparison_overrides_truthiness() {
        let config = json!({ "conditionPath": "pending", "equals": "approved" });
        let payload = json!({});
        let memory = Map::new();
        let inputs = HashMap::new();

        let ctx = BlockContext {
            run_id: uuid::Uuid::new_v4(),
            node_id: "branch",
            config: &config,
            payload: &payload,
            memory: &memory,
            inputs: &inputs,
            connector: None,
        };

        let out = LogicIfElse.execute(&ctx).await.unwrap();
        assert_eq!(out.selected_handle.as_deref(), Some("false"));
    }

    #[test]
    fn truthiness_table() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("yes")));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!("false")));
        assert!(!truthy(&Value::Null));
    }
}
