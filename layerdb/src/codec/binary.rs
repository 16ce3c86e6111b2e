//! Compact binary corpus format (`.cuac`).
//!
//! Layout:
//! - Magic `CUAC` (4 bytes)
//! - Format version (u16 LE)
//! - Schema length (u32 LE) followed by the schema as JSON
//! - Document count (varint)
//! - Per document: ID, one record per declared layer in declaration order,
//!   then metadata
//! - CRC32 of everything above (u32 LE)
//!
//! Integers inside records are LEB128 varints. Span starts and element
//! indexes are stored as deltas, and spans store their length instead of the
//! end offset. Enum values are stored as their position in the enum. Other
//! strings are interned: `0` introduces a new literal, `k` refers to the
//! k-th literal seen so far.

use crate::document::Document;
use crate::error::{LayerDbError, Result};
use crate::layer::{DataValue, Element, LayerData, Span};
use crate::schema::{DataType, LayerDesc, LayerType, SchemaStore};
use crate::store::Corpus;
use crc32fast::Hasher;
use indexmap::IndexMap;
use std::collections::HashMap;

pub const MAGIC: &[u8; 4] = b"CUAC";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;
const CHECKSUM_LEN: usize = 4;

/// Record tag written before each declared layer of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum LayerTag {
    Characters = 0,
    Span = 1,
    Seq = 2,
    Element = 3,
    Div = 4,
    /// The document does not hold this layer
    Absent = 0xFF,
}

impl LayerTag {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LayerTag::Characters),
            1 => Some(LayerTag::Span),
            2 => Some(LayerTag::Seq),
            3 => Some(LayerTag::Element),
            4 => Some(LayerTag::Div),
            0xFF => Some(LayerTag::Absent),
            _ => None,
        }
    }

    fn of(layer_type: LayerType) -> Self {
        match layer_type {
            LayerType::Characters => LayerTag::Characters,
            LayerType::Span => LayerTag::Span,
            LayerType::Seq => LayerTag::Seq,
            LayerType::Element => LayerTag::Element,
            LayerType::Div => LayerTag::Div,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn codec_err(msg: impl Into<String>) -> LayerDbError {
    LayerDbError::Codec(msg.into())
}

fn in_context(e: LayerDbError, context: &str) -> LayerDbError {
    match e {
        LayerDbError::Codec(msg) => LayerDbError::Codec(format!("{context}: {msg}")),
        other => LayerDbError::Codec(format!("{context}: {other}")),
    }
}

/// Serialize a corpus to `.cuac` bytes.
pub fn encode(corpus: &Corpus) -> Result<Vec<u8>> {
    let mut enc = Encoder::default();
    enc.buf.extend_from_slice(MAGIC);
    enc.buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

    let schema = serde_json::to_vec(corpus.get_schema())?;
    let schema_len =
        u32::try_from(schema.len()).map_err(|_| codec_err("Schema block too large"))?;
    enc.buf.extend_from_slice(&schema_len.to_le_bytes());
    enc.buf.extend_from_slice(&schema);

    enc.put_varint(corpus.len() as u64);
    for doc in corpus.docs() {
        if let Some((name, _)) = doc
            .document()
            .layers()
            .find(|(name, _)| !corpus.schema().contains(name))
        {
            return Err(codec_err(format!(
                "Document '{}' holds undeclared layer '{name}'",
                doc.id()
            )));
        }
        enc.put_literal(doc.id());
        for (name, desc) in corpus.schema().iter() {
            match doc.layer(name) {
                Some(data) => enc
                    .put_layer(desc, data)
                    .map_err(|e| in_context(e, &format!("Document '{}' layer '{name}'", doc.id())))?,
                None => enc.buf.push(LayerTag::Absent.as_u8()),
            }
        }
        let meta = doc.document().meta();
        enc.put_varint(meta.len() as u64);
        for (key, value) in meta {
            enc.put_literal(key);
            enc.put_literal(&value.to_string());
        }
    }

    let checksum = compute_checksum(&enc.buf);
    enc.buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(enc.buf)
}

/// Deserialize `.cuac` bytes, rebuilding and validating every document.
pub fn decode(bytes: &[u8]) -> Result<Corpus> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(codec_err("Truncated .cuac data"));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(codec_err("Not a .cuac file (bad magic)"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(codec_err(format!(
            "Unsupported .cuac version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if compute_checksum(body) != expected {
        return Err(codec_err("Checksum mismatch: .cuac data is corrupted"));
    }

    let mut dec = Decoder::new(&body[HEADER_LEN..]);
    let corpus = dec.corpus().map_err(LayerDbError::into_codec)?;
    if !dec.is_at_end() {
        return Err(codec_err("Trailing bytes after last document"));
    }
    Ok(corpus)
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
    strings: HashMap<String, u64>,
}

impl Encoder {
    fn put_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn put_literal(&mut self, s: &str) {
        self.put_varint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn put_interned(&mut self, s: &str) {
        if let Some(&k) = self.strings.get(s) {
            self.put_varint(k);
        } else {
            self.put_varint(0);
            self.put_literal(s);
            let k = self.strings.len() as u64 + 1;
            self.strings.insert(s.to_string(), k);
        }
    }

    fn put_layer(&mut self, desc: &LayerDesc, data: &LayerData) -> Result<()> {
        if data.layer_type() != desc.layer_type() {
            return Err(codec_err(format!(
                "declared as {} but holds {} data",
                desc.layer_type(),
                data.layer_type()
            )));
        }
        self.buf.push(LayerTag::of(data.layer_type()).as_u8());
        match data {
            LayerData::Characters(text) => self.put_literal(text),
            LayerData::Span(spans) => {
                self.put_varint(spans.len() as u64);
                let mut prev = 0;
                for span in spans {
                    let delta = span
                        .start
                        .checked_sub(prev)
                        .ok_or_else(|| codec_err("spans are not ordered by start"))?;
                    let len = span
                        .end
                        .checked_sub(span.start)
                        .ok_or_else(|| codec_err("span ends before it starts"))?;
                    self.put_varint(delta as u64);
                    self.put_varint(len as u64);
                    self.put_value(desc, span.value.as_ref())?;
                    prev = span.start;
                }
            }
            LayerData::Seq(values) => {
                self.put_varint(values.len() as u64);
                for value in values {
                    self.put_value(desc, Some(value))?;
                }
            }
            LayerData::Element(elements) | LayerData::Div(elements) => {
                self.put_varint(elements.len() as u64);
                let mut prev = 0;
                for element in elements {
                    let delta = element
                        .index
                        .checked_sub(prev)
                        .ok_or_else(|| codec_err("indexes are not ascending"))?;
                    self.put_varint(delta as u64);
                    self.put_value(desc, element.value.as_ref())?;
                    prev = element.index;
                }
            }
        }
        Ok(())
    }

    fn put_value(&mut self, desc: &LayerDesc, value: Option<&DataValue>) -> Result<()> {
        let Some(data) = desc.data() else {
            return match value {
                None => Ok(()),
                Some(_) => Err(codec_err("value stored on a layer without data")),
            };
        };
        let value = value.ok_or_else(|| codec_err("missing value"))?;
        match (data, value) {
            (DataType::String, DataValue::String(s)) => self.put_interned(s),
            (DataType::Enum(allowed), DataValue::String(s)) => {
                let index = allowed
                    .iter()
                    .position(|v| v == s)
                    .ok_or_else(|| codec_err(format!("value '{s}' is not in enum")))?;
                self.put_varint(index as u64);
            }
            (DataType::Link, DataValue::Link(n)) if desc.link_types().is_none() => {
                self.put_varint(u64::from(*n));
            }
            (DataType::Link, DataValue::TypedLink(n, t)) => {
                let types = desc
                    .link_types()
                    .ok_or_else(|| codec_err("typed link on a layer without link_types"))?;
                let index = types
                    .iter()
                    .position(|v| v == t)
                    .ok_or_else(|| codec_err(format!("link type '{t}' is not declared")))?;
                self.put_varint(u64::from(*n));
                self.put_varint(index as u64);
            }
            (_, other) => {
                return Err(codec_err(format!("value '{other}' does not fit the declared data")))
            }
        }
        Ok(())
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    strings: Vec<String>,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0, strings: Vec::new() }
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| codec_err("Unexpected end of .cuac data"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn get_u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.get_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(codec_err("Varint overflow"))
    }

    fn get_usize(&mut self) -> Result<usize> {
        let value = self.get_varint()?;
        usize::try_from(value).map_err(|_| codec_err(format!("Integer {value} out of range")))
    }

    fn get_literal(&mut self) -> Result<String> {
        let len = self.get_usize()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| codec_err("Invalid UTF-8 in string"))
    }

    fn get_interned(&mut self) -> Result<String> {
        match self.get_usize()? {
            0 => {
                let s = self.get_literal()?;
                self.strings.push(s.clone());
                Ok(s)
            }
            k => self
                .strings
                .get(k - 1)
                .cloned()
                .ok_or_else(|| codec_err(format!("String reference {k} is undefined"))),
        }
    }

    fn corpus(&mut self) -> Result<Corpus> {
        let schema_len = self.get_u32_le()? as usize;
        let layers: IndexMap<String, LayerDesc> = serde_json::from_slice(self.take(schema_len)?)
            .map_err(|e| codec_err(format!("Invalid schema block: {e}")))?;
        let schema = SchemaStore::from_layers(layers)?;
        let declared: Vec<(String, LayerDesc)> = schema
            .iter()
            .map(|(name, desc)| (name.to_string(), desc.clone()))
            .collect();
        let mut corpus = Corpus::with_schema(schema);

        let count = self.get_usize()?;
        for _ in 0..count {
            let id = self.get_literal()?;
            let mut doc = Document::new();
            for (name, desc) in &declared {
                let data = self
                    .layer(desc)
                    .map_err(|e| in_context(e, &format!("Document '{id}' layer '{name}'")))?;
                if let Some(data) = data {
                    doc.insert_layer(name.as_str(), data);
                }
            }
            let meta_count = self.get_usize()?;
            for _ in 0..meta_count {
                let key = self.get_literal()?;
                let value: serde_json::Value = serde_json::from_str(&self.get_literal()?)
                    .map_err(|e| codec_err(format!("Invalid metadata '{key}': {e}")))?;
                doc.insert_meta(key, value)?;
            }
            corpus
                .insert_decoded(&id, doc)
                .map_err(|e| in_context(e, &format!("Document '{id}'")))?;
        }
        Ok(corpus)
    }

    fn layer(&mut self, desc: &LayerDesc) -> Result<Option<LayerData>> {
        let tag_byte = self.get_u8()?;
        let tag = LayerTag::from_u8(tag_byte)
            .ok_or_else(|| codec_err(format!("Unknown layer tag {tag_byte:#04x}")))?;
        if tag == LayerTag::Absent {
            return Ok(None);
        }
        if tag != LayerTag::of(desc.layer_type()) {
            return Err(codec_err(format!(
                "record tag {tag:?} does not match declared type {}",
                desc.layer_type()
            )));
        }
        let data = match tag {
            LayerTag::Characters => LayerData::Characters(self.get_literal()?),
            LayerTag::Span => {
                let count = self.get_usize()?;
                let mut spans = Vec::with_capacity(count.min(self.buf.len()));
                let mut start = 0usize;
                for _ in 0..count {
                    start = start
                        .checked_add(self.get_usize()?)
                        .ok_or_else(|| codec_err("Span offset overflow"))?;
                    let end = start
                        .checked_add(self.get_usize()?)
                        .ok_or_else(|| codec_err("Span offset overflow"))?;
                    let value = self.value(desc)?;
                    spans.push(Span { start, end, value });
                }
                LayerData::Span(spans)
            }
            LayerTag::Seq => {
                let count = self.get_usize()?;
                let mut values = Vec::with_capacity(count.min(self.buf.len()));
                for _ in 0..count {
                    values.push(self.value(desc)?.ok_or_else(|| codec_err("Seq layer without data"))?);
                }
                LayerData::Seq(values)
            }
            LayerTag::Element | LayerTag::Div => {
                let count = self.get_usize()?;
                let mut elements = Vec::with_capacity(count.min(self.buf.len()));
                let mut index = 0usize;
                for _ in 0..count {
                    index = index
                        .checked_add(self.get_usize()?)
                        .ok_or_else(|| codec_err("Index overflow"))?;
                    let value = self.value(desc)?;
                    elements.push(Element { index, value });
                }
                if tag == LayerTag::Div {
                    LayerData::Div(elements)
                } else {
                    LayerData::Element(elements)
                }
            }
            LayerTag::Absent => return Ok(None),
        };
        Ok(Some(data))
    }

    fn value(&mut self, desc: &LayerDesc) -> Result<Option<DataValue>> {
        let value = match desc.data() {
            None => return Ok(None),
            Some(DataType::String) => DataValue::String(self.get_interned()?),
            Some(DataType::Enum(allowed)) => {
                let index = self.get_usize()?;
                let s = allowed
                    .get(index)
                    .ok_or_else(|| codec_err(format!("Enum index {index} out of range")))?;
                DataValue::String(s.clone())
            }
            Some(DataType::Link) => {
                let target = self.get_varint()?;
                let target = u32::try_from(target)
                    .map_err(|_| codec_err(format!("Link {target} out of range")))?;
                match desc.link_types() {
                    None => DataValue::Link(target),
                    Some(types) => {
                        let index = self.get_usize()?;
                        let t = types
                            .get(index)
                            .ok_or_else(|| codec_err(format!("Link type index {index} out of range")))?;
                        DataValue::TypedLink(target, t.clone())
                    }
                }
            }
        };
        Ok(Some(value))
    }
}
