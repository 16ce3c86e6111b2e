//! Corpus serialization: JSON, YAML, the compact `.cuac` binary format and
//! line-delimited JSON.
//!
//! Decoding always goes through schema validation and ID checks, and either
//! yields a complete corpus or an error.

pub mod binary;
pub mod json;
pub mod jsonl;
pub mod yaml;

use crate::error::{LayerDbError, Result};
use crate::store::Corpus;
use std::io::{Read, Write};
use std::path::Path;

/// A corpus file format, usually chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Cuac,
    Jsonl,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Format> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "cuac" => Ok(Format::Cuac),
            "jsonl" => Ok(Format::Jsonl),
            _ => Err(LayerDbError::Codec(format!(
                "Cannot infer corpus format from '{}'",
                path.display()
            ))),
        }
    }
}

/// Read a corpus file, picking the format from its extension.
///
/// A `.jsonl` file carries no schema, so it cannot be read on its own; use
/// [`jsonl::read_into`] with a corpus that already has one.
pub fn read_path(path: &Path) -> Result<Corpus> {
    read_path_as(path, Format::from_path(path)?)
}

pub fn read_path_as(path: &Path, format: Format) -> Result<Corpus> {
    let file = std::fs::File::open(path)?;
    read_from(std::io::BufReader::new(file), format)
}

pub fn read_from<R: Read>(mut reader: R, format: Format) -> Result<Corpus> {
    match format {
        Format::Json => json::from_reader(reader),
        Format::Yaml => yaml::from_reader(reader),
        Format::Cuac => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            binary::decode(&bytes)
        }
        Format::Jsonl => Err(LayerDbError::Codec(
            "JSONL holds no schema; read it into an existing corpus".into(),
        )),
    }
}

/// Write a corpus file, picking the format from its extension.
pub fn write_path(corpus: &Corpus, path: &Path) -> Result<()> {
    let format = Format::from_path(path)?;
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_to(corpus, format, &mut file)?;
    file.flush()?;
    Ok(())
}

pub fn write_to<W: Write>(corpus: &Corpus, format: Format, mut writer: W) -> Result<()> {
    match format {
        Format::Json => json::to_writer(corpus, &mut writer)?,
        Format::Yaml => writer.write_all(yaml::to_string(corpus)?.as_bytes())?,
        Format::Cuac => writer.write_all(&binary::encode(corpus)?)?,
        Format::Jsonl => jsonl::to_writer(corpus, &mut writer)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, LayerDesc};
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a.json")).unwrap(), Format::Json);
        assert_eq!(Format::from_path(Path::new("a.YML")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("dir/a.cuac")).unwrap(), Format::Cuac);
        assert_eq!(Format::from_path(Path::new("a.jsonl")).unwrap(), Format::Jsonl);
        assert!(Format::from_path(Path::new("a")).is_err());
    }

    #[test]
    fn test_write_and_read_every_path_format() {
        let tmp = TempDir::new().unwrap();
        let mut corpus = Corpus::new();
        corpus.declare_layer("text", LayerDesc::characters()).unwrap();
        corpus.declare_layer("words", LayerDesc::span("text")).unwrap();
        corpus
            .declare_layer("pos", LayerDesc::seq("words", DataType::String))
            .unwrap();
        corpus
            .build_doc()
            .layer("text", "Dogs bark")
            .layer("words", vec![(0, 4), (5, 9)])
            .layer("pos", vec!["NOUN", "VERB"])
            .add()
            .unwrap();

        for name in ["c.json", "c.yaml", "c.yml", "c.cuac"] {
            let path = tmp.path().join(name);
            write_path(&corpus, &path).unwrap();
            assert_eq!(read_path(&path).unwrap(), corpus, "{name}");
        }
    }

    #[test]
    fn test_jsonl_needs_a_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.jsonl");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(read_path(&path).unwrap_err(), LayerDbError::Codec(_)));
    }
}
