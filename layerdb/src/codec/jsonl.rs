//! Line-delimited JSON: one document object per line, without schema or IDs.

use crate::error::{LayerDbError, Result};
use crate::store::Corpus;
use std::io::{BufRead, Write};

/// Write every document in corpus order, one compact JSON object per line.
pub fn to_writer<W: Write>(corpus: &Corpus, mut writer: W) -> Result<()> {
    for doc in corpus.docs() {
        serde_json::to_writer(&mut writer, &doc.document().to_json())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Add each line of `reader` to `corpus` as a new document, returning the
/// assigned IDs in order. Blank lines are skipped.
///
/// Either every line is added or, on the first failure, the documents added
/// so far are removed again and the corpus is left as it was.
pub fn read_into<R: BufRead>(corpus: &mut Corpus, reader: R) -> Result<Vec<String>> {
    let mut added = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        match read_line(corpus, line) {
            Ok(Some(id)) => added.push(id),
            Ok(None) => {}
            Err(e) => {
                for id in added.iter().rev() {
                    corpus.remove_document(id)?;
                }
                return Err(LayerDbError::Codec(format!("Line {}: {e}", number + 1)));
            }
        }
    }
    log::info!("Read {} documents from JSONL", added.len());
    Ok(added)
}

fn read_line(corpus: &mut Corpus, line: std::io::Result<String>) -> Result<Option<String>> {
    let line = line?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(&line)?;
    corpus.add_json(&value).map(Some)
}
