//! 模板文档切分
//!
//! 固定窗口切分：窗口200字符，相邻窗口重叠50字符。

/// 切分窗口大小（字符数）
pub const CHUNK_SIZE: usize = 200;
/// 相邻窗口重叠（字符数）
pub const CHUNK_OVERLAP: usize = 50;

/// 带来源标记的文本片段
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
}

/// 按字符窗口切分文本，窗口边界落在字符而非字节上
pub fn chunk_text(text: &str, source: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();

    if chars.is_empty() || chunk_size == 0 {
        return chunks;
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(Chunk {
            text: chars[start..end].iter().collect(),
            source: source.to_string(),
        });

        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
