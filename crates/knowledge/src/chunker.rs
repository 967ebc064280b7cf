use crate::config::KnowledgeBaseConfig;
use ragchat_common::{Chunk, Metadata, RagError, Result};

/// Fixed-window character splitter.
///
/// Windows are `chunk_size` chars long and consecutive windows of the same
/// text share `overlap` chars. Lengths are counted in chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration("chunk_size must be greater than zero".to_string()));
        }
        if overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_config(config: &KnowledgeBaseConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split one text into ordered windows. Empty text yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        // Byte offset of every char boundary, including the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;
        if char_count == 0 {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = usize::min(start + self.chunk_size, char_count);
            chunks.push(text[boundaries[start]..boundaries[end]].to_string());
            if end == char_count {
                break;
            }
            start += step;
        }
        chunks
    }

    /// Split several texts, pairing each with its metadata record.
    ///
    /// A single metadata record is applied to every text. Otherwise the
    /// number of records must equal the number of texts.
    pub fn split(&self, texts: &[String], metadatas: Option<&[Metadata]>) -> Result<Vec<Chunk>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let per_text: Vec<Metadata> = match metadatas {
            None => vec![Metadata::new(); texts.len()],
            Some([single]) => vec![single.clone(); texts.len()],
            Some(records) if records.len() == texts.len() => records.to_vec(),
            Some(records) => {
                return Err(RagError::Validation(format!(
                    "got {} metadata records for {} texts; expected 1 or {}",
                    records.len(),
                    texts.len(),
                    texts.len()
                )));
            }
        };

        Ok(texts
            .iter()
            .zip(per_text)
            .flat_map(|(text, metadata)| {
                self.split_text(text).into_iter().map(move |piece| Chunk {
                    text: piece,
                    metadata: metadata.clone(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ragchat_common::filename_metadata;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks = chunker.split_text("The sky is blue. Grass is green.");
        assert_eq!(chunks, vec!["The sky is blue. Grass is green.".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert!(chunker.split_text("").is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let chunker = Chunker::new(4, 1).unwrap();
        let chunks = chunker.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_final_chunk_may_be_short() {
        let chunker = Chunker::new(4, 1).unwrap();
        let chunks = chunker.split_text("abcdefgh");
        assert_eq!(chunks, vec!["abcd", "defg", "gh"]);
    }

    #[test]
    fn test_multibyte_text_splits_on_chars() {
        let chunker = Chunker::new(3, 1).unwrap();
        let chunks = chunker.split_text("知识库文件列表");
        assert_eq!(chunks, vec!["知识库", "库文件", "件列表"]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(10, 11).is_err());
    }

    #[test]
    fn test_single_metadata_is_replicated_per_text() {
        let chunker = Chunker::new(500, 50).unwrap();
        let texts = vec!["t1".to_string(), "t2".to_string()];
        let metadatas = vec![filename_metadata("x")];

        let chunks = chunker.split(&texts, Some(&metadatas)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.filename() == Some("x")));
        assert_eq!(chunks[0].text, "t1");
        assert_eq!(chunks[1].text, "t2");
    }

    #[test]
    fn test_metadata_pairs_with_texts() {
        let chunker = Chunker::new(500, 50).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let metadatas = vec![filename_metadata("a.txt"), filename_metadata("b.txt")];

        let chunks = chunker.split(&texts, Some(&metadatas)).unwrap();
        assert_eq!(chunks[0].filename(), Some("a.txt"));
        assert_eq!(chunks[1].filename(), Some("b.txt"));
    }

    #[test]
    fn test_metadata_count_mismatch_is_rejected() {
        let chunker = Chunker::new(500, 50).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let metadatas = vec![filename_metadata("a.txt"), filename_metadata("b.txt")];

        let err = chunker.split(&texts, Some(&metadatas)).unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn test_every_chunk_of_a_text_carries_its_metadata() {
        let chunker = Chunker::new(4, 1).unwrap();
        let texts = vec!["abcdefghij".to_string()];
        let metadatas = vec![filename_metadata("long.txt")];

        let chunks = chunker.split(&texts, Some(&metadatas)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.filename() == Some("long.txt")));
    }

    fn sizes() -> impl Strategy<Value = (usize, usize)> {
        (1usize..64).prop_flat_map(|size| (Just(size), 0..size))
    }

    proptest! {
        #[test]
        fn prop_chunk_count_size_and_overlap(text in "[a-z \n]{0,400}", (size, overlap) in sizes()) {
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.split_text(&text);
            let len = text.chars().count();

            let expected = if len == 0 {
                0
            } else if len <= size {
                1
            } else {
                (len - overlap + (size - overlap) - 1) / (size - overlap)
            };
            prop_assert_eq!(chunks.len(), expected);

            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
            }

            for pair in chunks.windows(2) {
                let head: Vec<char> = pair[0].chars().collect();
                let tail: String = head[head.len() - overlap..].iter().collect();
                let next_head: String = pair[1].chars().take(overlap).collect();
                prop_assert_eq!(tail, next_head);
            }

            // Dropping the overlap from each follow-up chunk restores the text.
            let mut rebuilt = chunks.first().cloned().unwrap_or_default();
            for chunk in chunks.iter().skip(1) {
                rebuilt.extend(chunk.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
