//! list_models — render the aggregated catalog, grouped by provider.

use std::collections::BTreeMap;

use serde_json::json;

use crate::tools::{ToolContext, ToolSpec};
use crate::{Backend, Result};

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "list_models",
        description: "List every model currently available across all configured providers.",
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
    }
}

pub async fn run(ctx: &ToolContext, _args: serde_json::Value) -> Result<String> {
    let catalog = ctx.smart.list_models().await?;
    if catalog.is_empty() {
        return Ok("## No models available\n\nNo backend is currently serving models. Check \
provider configuration and connectivity.\n"
            .to_string());
    }

    let mut by_provider: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for model in catalog {
        by_provider
            .entry(model.provider.clone())
            .or_default()
            .push((model.id, model.display_name));
    }

    let mut out = String::from("# Available models\n");
    for (provider, mut models) in by_provider {
        models.sort();
        out.push_str(&format!("\n## {provider}\n\n"));
        for (id, display_name) in models {
            if display_name != id && !display_name.is_empty() {
                out.push_str(&format!("- `{id}` — {display_name}\n"));
            } else {
                out.push_str(&format!("- `{id}`\n"));
            }
        }
    }
    Ok(out)
}
