//! 词法检索与重排
//!
//! 将文本映射为哈希词袋向量，L2归一化后按余弦相似度召回，
//! 再按查询词的逆文档频率加权重排。

use crate::chunker::Chunk;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// 哈希向量维度
const VECTOR_DIM: usize = 256;

/// 切词：小写化后按非字母数字边界拆分
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn bucket(token: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % VECTOR_DIM
}

/// 词频向量，L2归一化后点积即余弦相似度
fn embed(tokens: &[String]) -> Vec<f32> {
    let mut vector = vec![0f32; VECTOR_DIM];
    for token in tokens {
        vector[bucket(token)] += 1.0;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// 片段检索索引
pub struct ChunkIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl ChunkIndex {
    /// 对全部片段建立索引
    pub fn build(chunks: Vec<Chunk>) -> Self {
        let vectors = chunks
            .iter()
            .map(|chunk| embed(&tokenize(&chunk.text)))
            .collect();

        Self { chunks, vectors }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// 按余弦相似度返回最相近的 top_k 个片段
    pub fn search(&self, query: &str, top_k: usize) -> Vec<Chunk> {
        let query_vector = embed(&tokenize(query));

        let mut scored: Vec<(f32, &Chunk)> = self
            .vectors
            .iter()
            .zip(&self.chunks)
            .map(|(vector, chunk)| (dot(vector, &query_vector), chunk))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, chunk)| chunk.clone()).collect()
    }
}

/// 按查询词覆盖度重排，罕见词权重更高，保留前 keep 个
pub fn rerank(query: &str, chunks: &[Chunk], keep: usize) -> Vec<Chunk> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let documents: Vec<HashSet<String>> = chunks
        .iter()
        .map(|chunk| tokenize(&chunk.text).into_iter().collect())
        .collect();
    let total = chunks.len() as f32;
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();

    let mut scored: Vec<(f32, &Chunk)> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let score = query_terms
                .iter()
                .filter(|term| documents[i].contains(*term))
                .map(|term| {
                    let frequency = documents.iter().filter(|d| d.contains(term)).count() as f32;
                    (1.0 + total / (1.0 + frequency)).ln()
                })
                .sum();
            (score, chunk)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(keep).map(|(_, chunk)| chunk.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: "test.txt".to_string(),
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Metformin 500mg, twice daily."),
            vec!["metformin", "500mg", "twice", "daily"]
        );
    }

    #[test]
    fn test_search_ranks_relevant_chunk_first() {
        let index = ChunkIndex::build(vec![
            chunk("post-operative wound care and dressing instructions"),
            chunk("insulin dosing schedule for diabetes management"),
            chunk("cardiac rehabilitation exercise plan"),
        ]);

        let results = index.search("diabetes insulin dosing", 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].text.contains("insulin"));
    }

    #[test]
    fn test_search_caps_at_top_k() {
        let index = ChunkIndex::build(vec![chunk("a b c"), chunk("a b"), chunk("a")]);
        assert_eq!(index.search("a", 2).len(), 2);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_rerank_prefers_rare_terms() {
        let chunks = vec![
            chunk("patient discharge patient discharge patient"),
            chunk("patient discharge with warfarin anticoagulation plan"),
        ];

        // 两个片段都含常见词，含罕见词 warfarin 的应排在前面
        let reranked = rerank("warfarin discharge plan", &chunks, 1);
        assert_eq!(reranked.len(), 1);
        assert!(reranked[0].text.contains("warfarin"));
    }

    #[test]
    fn test_rerank_empty_input() {
        assert!(rerank("anything", &[], 5).is_empty());
    }
}
