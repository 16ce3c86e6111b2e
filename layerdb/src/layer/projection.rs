//! Index projection between layers connected through their `base` chain.
//!
//! Nothing here is stored: every range is recomputed from the layer contents,
//! so the `text` of any layer is always consistent with its base.

use super::{DataValue, LayerData};
use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::schema::SchemaStore;

/// Element count of a layer's index space
pub fn base_len(data: &LayerData) -> usize {
    data.len()
}

/// Project every element of `layer` into the index space of `target`.
///
/// `target` must be `layer` itself or a layer further down its base chain.
pub fn indexes(
    doc: &Document,
    schema: &SchemaStore,
    layer: &str,
    target: &str,
) -> Result<Vec<(usize, usize)>> {
    let data = doc
        .layer(layer)
        .ok_or_else(|| LayerDbError::layer_not_found(layer))?;
    if layer == target {
        return Ok((0..data.len()).map(|i| (i, i + 1)).collect());
    }

    let base = schema.layer(layer)?.base().ok_or_else(|| LayerDbError::NotFound {
        kind: "projection",
        name: format!("{layer} -> {target}"),
    })?;

    match data {
        LayerData::Characters(_) => Err(LayerDbError::Schema(format!(
            "Layer '{layer}' holds text but is declared over '{base}'"
        ))),
        // A seq is aligned 1:1 with its base
        LayerData::Seq(_) => indexes(doc, schema, base, target),
        LayerData::Span(spans) => {
            let ranges = spans.iter().map(|s| (s.start, s.end));
            if base == target {
                Ok(ranges.collect())
            } else {
                let sub = indexes(doc, schema, base, target)?;
                ranges.map(|(s, e)| project_range(&sub, s, e, layer)).collect()
            }
        }
        LayerData::Element(elements) => {
            if base == target {
                Ok(elements.iter().map(|e| (e.index, e.index + 1)).collect())
            } else {
                let sub = indexes(doc, schema, base, target)?;
                elements
                    .iter()
                    .map(|e| {
                        sub.get(e.index)
                            .copied()
                            .ok_or_else(|| out_of_bounds(layer, e.index, sub.len()))
                    })
                    .collect()
            }
        }
        LayerData::Div(starts) => {
            let base_size = doc
                .layer(base)
                .map(LayerData::len)
                .ok_or_else(|| LayerDbError::layer_not_found(base))?;
            let ranges = div_ranges(starts.iter().map(|e| e.index), base_size);
            if base == target {
                Ok(ranges)
            } else {
                let sub = indexes(doc, schema, base, target)?;
                ranges
                    .into_iter()
                    .map(|(s, e)| project_range(&sub, s, e, layer))
                    .collect()
            }
        }
    }
}

/// Surface text of each element of `layer`, taken from its `characters` root.
pub fn text<'a>(doc: &'a Document, schema: &SchemaStore, layer: &str) -> Result<Vec<&'a str>> {
    let root = schema.root_of(layer)?;
    let source = doc
        .layer(root)
        .and_then(LayerData::as_text)
        .ok_or_else(|| LayerDbError::layer_not_found(root))?;
    let ranges = indexes(doc, schema, layer, root)?;

    // Char offsets to byte offsets, with one extra entry for the end of the string
    let boundaries: Vec<usize> = source
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(source.len()))
        .collect();
    ranges
        .into_iter()
        .map(|(s, e)| match (boundaries.get(s), boundaries.get(e)) {
            (Some(&from), Some(&to)) if from <= to => Ok(&source[from..to]),
            _ => Err(out_of_bounds(layer, e, boundaries.len() - 1)),
        })
        .collect()
}

/// Stored values of `layer`, in element order
pub fn values<'a>(doc: &'a Document, layer: &str) -> Result<Vec<&'a DataValue>> {
    doc.layer(layer)
        .map(LayerData::values)
        .ok_or_else(|| LayerDbError::layer_not_found(layer))
}

/// Pair consecutive division starts; the last division runs to `len`.
fn div_ranges<I: Iterator<Item = usize>>(starts: I, len: usize) -> Vec<(usize, usize)> {
    let starts: Vec<usize> = starts.collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &s)| (s, starts.get(i + 1).copied().unwrap_or(len)))
        .collect()
}

fn project_range(sub: &[(usize, usize)], start: usize, end: usize, layer: &str) -> Result<(usize, usize)> {
    if start < end {
        let first = sub.get(start).ok_or_else(|| out_of_bounds(layer, start, sub.len()))?;
        let last = sub.get(end - 1).ok_or_else(|| out_of_bounds(layer, end, sub.len()))?;
        Ok((first.0, last.1))
    } else {
        // Empty range: zero width at the projected position
        let at = match sub.get(start) {
            Some(r) => r.0,
            None if start == sub.len() => sub.last().map(|r| r.1).unwrap_or(0),
            None => return Err(out_of_bounds(layer, start, sub.len())),
        };
        Ok((at, at))
    }
}

fn out_of_bounds(layer: &str, index: usize, len: usize) -> LayerDbError {
    LayerDbError::Validation(format!(
        "Layer '{layer}' refers to index {index} outside its base (length {len})"
    ))
}
