//! LLM block: `nilai-llm`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use clients::LlmGateway;

use crate::{path, BlockContext, BlockError, BlockHandler, BlockOutput};

/// Substitute `{{alias}}` tokens with values from execution memory.
///
/// Tokens may be dotted paths (`{{rec.name}}`).  String values are inserted
/// as-is; everything else is inserted as compact JSON.  Unknown tokens are
/// left in place so broken templates are visible in the output.
pub fn render_template(template: &str, memory: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let token = after[..end].trim();
                match path::lookup(memory, token) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push_str("{{");
                        out.push_str(&after[..end]);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `nilai-llm` — render the prompt template against memory, call the
/// gateway, and return the reply with its verification material.
pub struct NilaiLlm {
    llm: Arc<dyn LlmGateway>,
}

impl NilaiLlm {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl BlockHandler for NilaiLlm {
    async fn execute(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockError> {
        let template = ctx.require_str("prompt")?;
        let prompt = render_template(template, ctx.memory);
        let model = ctx.config_str("model");

        let reply = self.llm.complete(model, &prompt).await?;

        let mut value = json!({ "text": reply.text });
        if let Some(signature) = reply.signature {
            value["signature"] = Value::String(signature);
        }
        if let Some(verifying_key) = reply.verifying_key {
            value["verifyingKey"] = Value::String(verifying_key);
        }

        Ok(BlockOutput::value(value).with_attestation(reply.attestation))
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Map<String, Value> {
        let mut memory = Map::new();
        memory.insert("payload".into(), json!({ "city": "Lisbon" }));
        memory.insert("rec".into(), json!({ "name": "Ada", "score": 7 }));
        memory
    }

    #[test]
    fn substitutes_aliases_and_dotted_paths() {
        let rendered = render_template("Hello {{rec.name}}, score {{rec.score}}.", &memory());
        assert_eq!(rendered, "Hello Ada, score 7.");
    }

    #[test]
    fn falls_back_to_payload_and_keeps_unknown_tokens() {
        let rendered = render_template("{{city}} / {{unknown}}", &memory());
        assert_eq!(rendered, "Lisbon / {{unknown}}");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let mut memory = memory();
        memory.insert("obj".into(), json!({ "k": 1 }));
        assert_eq!(render_template("v={{obj}}", &memory), "v={\"k\":1}");
    }
}
