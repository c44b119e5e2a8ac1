//! 检索增强生成管线

use crate::chunker::{chunk_text, Chunk, CHUNK_OVERLAP, CHUNK_SIZE};
use crate::model::{ChatModel, CompletionRequest};
use crate::retrieval::{rerank, ChunkIndex};
use clinic_core::Result;
use clinic_database::{Database, DatabaseQueries};
use std::sync::Arc;
use tracing::debug;

/// 语料为空时的固定回复
pub const NO_TEMPLATES_MESSAGE: &str = "No templates available. Please upload templates first.";

/// 召回片段数
const RETRIEVE_TOP_K: usize = 15;
/// 重排后保留片段数
const RERANK_KEEP: usize = 5;
/// 生成温度
const TEMPERATURE: f32 = 0.3;
/// 生成长度上限
const MAX_TOKENS: u32 = 1500;

/// 检索增强管线：切分 → 召回 → 重排 → 生成
#[derive(Clone)]
pub struct AssistantPipeline {
    model: Arc<dyn ChatModel>,
}

impl AssistantPipeline {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// 对查询执行完整管线，模板语料取自数据库
    pub async fn run(&self, query: &str, db: &Database) -> Result<String> {
        let documents = DatabaseQueries::new(db).list_documents().await?;

        let mut chunks = Vec::new();
        for document in &documents {
            chunks.extend(chunk_text(
                &document.content,
                &document.filename,
                CHUNK_SIZE,
                CHUNK_OVERLAP,
            ));
        }

        if chunks.is_empty() {
            return Ok(NO_TEMPLATES_MESSAGE.to_string());
        }

        let index = ChunkIndex::build(chunks);
        let retrieved = index.search(query, RETRIEVE_TOP_K);
        let context = rerank(query, &retrieved, RERANK_KEEP);

        debug!(
            "Assistant pipeline: {} documents, {} indexed chunks, {} in context",
            documents.len(),
            index.len(),
            context.len()
        );

        let prompt = render_prompt(query, &context);
        self.model
            .complete(CompletionRequest {
                prompt,
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
            })
            .await
    }
}

/// 渲染出院小结生成提示词
pub fn render_prompt(query: &str, context: &[Chunk]) -> String {
    let mut context_block = String::new();
    for chunk in context {
        context_block.push_str(&format!("--- TEMPLATE: {} ---\n{}\n\n", chunk.source, chunk.text));
    }

    format!(
        r#"You are a senior clinical documentation specialist at a hospital.

TASK: Generate a professional, complete discharge summary based on the patient information and reference templates below.

PATIENT INFORMATION:
{query}

REFERENCE TEMPLATES:
{context}

DISCHARGE SUMMARY FORMAT:

PATIENT OVERVIEW:
[Patient name, age, admission date, brief reason for admission]

DIAGNOSIS:
• Primary diagnosis:
• Secondary diagnoses (if any):

HOSPITAL COURSE & TREATMENT:
[Summary of treatment provided, procedures performed, medications administered, and patient's response]

DISCHARGE MEDICATIONS:
• Medication name | Dosage | Frequency | Duration
• [Continue list]

DISCHARGE INSTRUCTIONS:
• Activity restrictions:
• Wound care (if applicable):
• Diet recommendations:
• Symptoms to watch for:

FOLLOW-UP APPOINTMENTS:
• Provider: [Specialty] - [Timeframe]
• Additional tests needed:

CONDITION AT DISCHARGE:
[Patient's status - stable, improved, etc.]

RULES:
1. ONLY use information from the provided context
2. Do NOT invent medications, diagnoses, or treatments
3. If information is missing, write "Not specified in records"
4. Use professional medical terminology
5. Be concise but comprehensive
6. Format as plain text without markdown
7. Include specific dosages and frequencies when available

Generate the discharge summary now:"#,
        query = query,
        context = context_block
    )
}
