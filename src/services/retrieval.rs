//! Keyword retrieval over in-memory document chunks.
//!
//! A chunk's score is the number of query words it contains as a
//! case-insensitive substring. Frequency inside the chunk is ignored.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoredChunk {
    /// Position of the chunk in the input slice.
    pub index: usize,
    pub score: usize,
}

/// Scores every chunk and orders them by descending score. The sort is
/// stable, so equal scores keep their input order.
pub fn rank_scored<S: AsRef<str>>(query: &str, chunks: &[S]) -> Vec<ScoredChunk> {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();

    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let haystack = chunk.as_ref().to_lowercase();
            let score = words.iter().filter(|w| haystack.contains(w.as_str())).count();
            ScoredChunk { index, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Returns at most `k` chunks, most relevant first.
pub fn rank<'a, S: AsRef<str>>(query: &str, chunks: &'a [S], k: usize) -> Vec<&'a str> {
    rank_scored(query, chunks)
        .into_iter()
        .take(k)
        .map(|s| chunks[s.index].as_ref())
        .collect()
}
