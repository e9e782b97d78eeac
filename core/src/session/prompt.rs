//! System prompt assembly

use crate::error::{Error, Result};
use crate::mcp::ToolCatalog;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{json, Map};

use super::ToolCallRequest;

const TEMPLATE_NAME: &str = "system";

const SYSTEM_TEMPLATE: &str = r#"You are a blockchain analytics assistant with access to Ethereum consensus layer data stored in ClickHouse.

{{briefing}}

AVAILABLE TOOLS:
{{#each tools}}
- {{signature}}{{#if description}}: {{description}}{{/if}}
{{/each}}

INSTRUCTIONS:
1. Work out which data the question needs before calling a tool.
2. Generate ClickHouse-compatible SQL with a LIMIT clause.
3. Request at most one tool call per reply.
4. Explain findings in clear, user-friendly language.

TOOL USAGE FORMAT:
When you need a tool, reply with the marker followed by a single JSON object on one line:
{{example}}

Only use parameters listed in the tool signatures above; parameters marked with ? are optional.
After receiving a tool result, answer the question from that data without requesting another tool."#;

/// Schema briefing for the goteth_mainnet database
pub const DEFAULT_BRIEFING: &str = "\
ETHEREUM BLOCKCHAIN DATABASE SCHEMA (goteth_mainnet)

You are analyzing Ethereum Proof-of-Stake consensus layer data. Key tables:

1. t_validator_last_status: current validator status
   - f_val_idx: validator index (unique identifier)
   - f_epoch: current epoch number
   - f_balance_eth: validator balance in ETH
   - f_effective_balance: effective balance for consensus (in wei)
   - f_status: status code (1 = active, 0 = inactive)
   - f_slashed: whether the validator was slashed

2. t_block_metrics: block production data
   - f_slot: slot number (12 second intervals)
   - f_epoch: epoch number (32 slots per epoch)
   - f_proposer_index: validator who proposed the block
   - f_proposed: whether the block was actually proposed
   - f_attestations: number of attestations in the block

3. t_pool_summary: staking pool performance
   - f_pool_name: name of the staking pool
   - f_epoch: epoch number
   - aggregated_rewards: total rewards for the pool in the epoch
   - aggregated_effective_balance: total effective balance

4. t_epoch_metrics_summary: network-wide metrics
   - f_epoch: epoch number
   - f_num_vals: number of active validators
   - f_total_balance_eth: total ETH staked
   - f_num_att: number of attestations

5. t_block_rewards: economic data
   - f_slot: slot number
   - f_reward_fees: transaction fees earned
   - f_burnt_fees: EIP-1559 burnt fees
   - f_cl_manual_reward: consensus layer rewards

QUERY GUIDELINES:
- Always use LIMIT clauses (at most 100 rows for display)
- Prefer aggregate functions (COUNT, SUM, AVG) on large tables
- Field names are prefixed with f_ (e.g. f_val_idx, f_epoch)
- Epochs last about 6.4 minutes, slots 12 seconds
- Balance fields may be in wei (divide by 1e18 for ETH) or in ETH";

#[derive(Serialize)]
struct ToolView<'a> {
    signature: String,
    description: &'a str,
}

#[derive(Serialize)]
struct PromptView<'a> {
    briefing: &'a str,
    tools: Vec<ToolView<'a>>,
    example: String,
}

/// Renders the system prompt from the tool catalog and a domain briefing
pub struct PromptBuilder {
    registry: Handlebars<'static>,
    marker: String,
}

impl PromptBuilder {
    pub fn new<S: Into<String>>(marker: S) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        registry
            .register_template_string(TEMPLATE_NAME, SYSTEM_TEMPLATE)
            .map_err(|e| Error::Template(e.to_string()))?;

        Ok(Self {
            registry,
            marker: marker.into(),
        })
    }

    /// Render the prompt; `briefing` falls back to [`DEFAULT_BRIEFING`]
    pub fn render(&self, catalog: &ToolCatalog, briefing: Option<&str>) -> Result<String> {
        let view = PromptView {
            briefing: briefing.unwrap_or(DEFAULT_BRIEFING).trim(),
            tools: catalog
                .iter()
                .map(|tool| ToolView {
                    signature: tool.signature(),
                    description: tool.description.as_str(),
                })
                .collect(),
            example: self.example_call(),
        };

        self.registry
            .render(TEMPLATE_NAME, &view)
            .map_err(|e| Error::Template(e.to_string()))
    }

    fn example_call(&self) -> String {
        let mut arguments = Map::new();
        arguments.insert("arg1".to_string(), json!("value1"));
        arguments.insert("arg2".to_string(), json!("value2"));
        ToolCallRequest::new("tool_name_here", arguments).to_marker_text(&self.marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::ToolDescriptor;

    fn catalog() -> ToolCatalog {
        ToolCatalog::new(vec![
            ToolDescriptor::new("run_select_query")
                .with_description("Run a SELECT query")
                .with_parameter("query", json!({"type": "string"}), true),
            ToolDescriptor::new("list_databases").with_description("List all databases"),
            ToolDescriptor::new("list_tables").with_parameter(
                "database",
                json!({"type": "string"}),
                true,
            ),
        ])
    }

    #[test]
    fn test_prompt_lists_tools_in_name_order() {
        let prompt = PromptBuilder::new("TOOL_CALL:")
            .unwrap()
            .render(&catalog(), None)
            .unwrap();

        let databases = prompt.find("- list_databases(): List all databases").unwrap();
        let tables = prompt.find("- list_tables(database: string)\n").unwrap();
        let query = prompt
            .find("- run_select_query(query: string): Run a SELECT query")
            .unwrap();
        assert!(databases < tables && tables < query);
        assert!(prompt.contains("t_validator_last_status"));
    }

    #[test]
    fn test_example_uses_marker_and_is_not_escaped() {
        let prompt = PromptBuilder::new("CALL>>")
            .unwrap()
            .render(&catalog(), Some("Custom briefing & <notes>"))
            .unwrap();

        assert!(prompt.contains("Custom briefing & <notes>"));
        assert!(!prompt.contains("goteth_mainnet"));
        assert!(prompt.contains(
            r#"CALL>> {"arguments":{"arg1":"value1","arg2":"value2"},"tool_name":"tool_name_here"}"#
        ) || prompt.contains(
            r#"CALL>> {"tool_name":"tool_name_here","arguments":{"arg1":"value1","arg2":"value2"}}"#
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let builder = PromptBuilder::new("TOOL_CALL:").unwrap();
        assert_eq!(
            builder.render(&catalog(), None).unwrap(),
            builder.render(&catalog(), None).unwrap()
        );
    }
}
