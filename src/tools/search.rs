//! Semantic food search over the embedding index.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::call::{ToolCall, SEARCH_FOODS};
use super::types::{Tool, ToolContext, ToolKind, ToolOutput};
use crate::error::{NutriError, Result};
use crate::intent::ToolGroup;
use crate::providers::EmbeddingProvider;

pub struct SearchFoodsTool {
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl SearchFoodsTool {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embeddings }
    }
}

#[async_trait]
impl Tool for SearchFoodsTool {
    fn name(&self) -> &str {
        SEARCH_FOODS
    }

    fn description(&self) -> &str {
        "Look up nutrition facts for foods similar to the query. Read-only; does not log anything."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 20, "default": 5}
            },
            "required": ["query"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn group(&self) -> ToolGroup {
        ToolGroup::Search
    }

    async fn execute(&self, call: ToolCall, _ctx: &ToolContext) -> Result<ToolOutput> {
        let ToolCall::SearchFoods(args) = call else {
            return Err(NutriError::invalid_args(SEARCH_FOODS, "mismatched call"));
        };
        let vector = self.embeddings.embed(args.query.trim()).await?;
        let mut hits = self
            .embeddings
            .search_similar(&vector, args.limit())
            .await?;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(args.limit());

        Ok(ToolOutput::json(&json!({
            "query": args.query,
            "results": hits,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SimilarRecord;
    use crate::tools::testing::{Harness, StaticEmbeddings};

    #[tokio::test]
    async fn test_search_returns_ranked_hits() {
        let h = Harness::new();
        let embeddings = StaticEmbeddings::new(vec![
            SimilarRecord {
                record: json!({"name": "plantain", "calories": 218}),
                score: 0.61,
            },
            SimilarRecord {
                record: json!({"name": "banana", "calories": 105}),
                score: 0.93,
            },
        ]);
        let tool = SearchFoodsTool::new(Arc::new(embeddings));
        let output = tool
            .execute(
                ToolCall::parse(SEARCH_FOODS, r#"{"query":"banana","limit":1}"#).unwrap(),
                &h.ctx("c1"),
            )
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&output.for_llm).unwrap();
        let results = parsed["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["record"]["name"], "banana");
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let h = Harness::new();
        let tool = SearchFoodsTool::new(Arc::new(StaticEmbeddings::failing()));
        let err = tool
            .execute(
                ToolCall::parse(SEARCH_FOODS, r#"{"query":"banana"}"#).unwrap(),
                &h.ctx("c1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NutriError::Embedding(_)));
    }
}
