use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Free-form key/value annotations attached to a layer declaration
pub type LayerMeta = IndexMap<String, serde_json::Value>;

/// The kind of a layer, as written in the `type` field of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    #[serde(alias = "Characters")]
    Characters,
    #[serde(alias = "Span")]
    Span,
    #[serde(alias = "Seq")]
    Seq,
    #[serde(alias = "Element")]
    Element,
    #[serde(alias = "Div")]
    Div,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Characters => "characters",
            LayerType::Span => "span",
            LayerType::Seq => "seq",
            LayerType::Element => "element",
            LayerType::Div => "div",
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value-type constraint on the data carried by a layer.
///
/// Written as `string`, `link` or a list of permitted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDataType", into = "RawDataType")]
pub enum DataType {
    String,
    Enum(Vec<String>),
    Link,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawDataType {
    Name(String),
    Values(Vec<String>),
}

impl TryFrom<RawDataType> for DataType {
    type Error = String;

    fn try_from(raw: RawDataType) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawDataType::Name(name) => match name.as_str() {
                "string" | "String" => Ok(DataType::String),
                "link" | "Link" => Ok(DataType::Link),
                other => Err(format!("Unknown data type '{other}'")),
            },
            RawDataType::Values(values) => Ok(DataType::Enum(values)),
        }
    }
}

impl From<DataType> for RawDataType {
    fn from(data: DataType) -> Self {
        match data {
            DataType::String => RawDataType::Name("string".into()),
            DataType::Link => RawDataType::Name("link".into()),
            DataType::Enum(values) => RawDataType::Values(values),
        }
    }
}

/// Declaration of a `characters` layer: the root of every base chain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharactersDesc {
    pub meta: LayerMeta,
}

/// Declaration of a layer defined over the index space of a base layer
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDesc {
    pub base: String,
    pub data: Option<DataType>,
    pub link_types: Option<Vec<String>>,
    pub target: Option<String>,
    pub default: Option<serde_json::Value>,
    pub meta: LayerMeta,
}

impl DerivedDesc {
    pub fn new(base: impl Into<String>) -> Self {
        DerivedDesc {
            base: base.into(),
            data: None,
            link_types: None,
            target: None,
            default: None,
            meta: LayerMeta::new(),
        }
    }
}

/// Declaration of one named layer within a corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLayerDesc", into = "RawLayerDesc")]
pub enum LayerDesc {
    Characters(CharactersDesc),
    Span(DerivedDesc),
    Seq(DerivedDesc),
    Element(DerivedDesc),
    Div(DerivedDesc),
}

impl LayerDesc {
    pub fn characters() -> Self {
        LayerDesc::Characters(CharactersDesc::default())
    }

    pub fn span(base: impl Into<String>) -> Self {
        LayerDesc::Span(DerivedDesc::new(base))
    }

    pub fn seq(base: impl Into<String>, data: DataType) -> Self {
        let mut desc = DerivedDesc::new(base);
        desc.data = Some(data);
        LayerDesc::Seq(desc)
    }

    pub fn element(base: impl Into<String>) -> Self {
        LayerDesc::Element(DerivedDesc::new(base))
    }

    pub fn div(base: impl Into<String>) -> Self {
        LayerDesc::Div(DerivedDesc::new(base))
    }

    /// Set the data constraint. Has no effect on a `characters` layer.
    pub fn with_data(mut self, data: DataType) -> Self {
        if let Some(derived) = self.derived_mut() {
            derived.data = Some(data);
        }
        self
    }

    /// Set the layer that link values point into. Has no effect on a `characters` layer.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        if let Some(derived) = self.derived_mut() {
            derived.target = Some(target.into());
        }
        self
    }

    /// Has no effect on a `characters` layer.
    pub fn with_link_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(derived) = self.derived_mut() {
            derived.link_types = Some(types.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Has no effect on a `characters` layer.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        if let Some(derived) = self.derived_mut() {
            derived.default = Some(default);
        }
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta_mut().insert(key.into(), value);
        self
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            LayerDesc::Characters(_) => LayerType::Characters,
            LayerDesc::Span(_) => LayerType::Span,
            LayerDesc::Seq(_) => LayerType::Seq,
            LayerDesc::Element(_) => LayerType::Element,
            LayerDesc::Div(_) => LayerType::Div,
        }
    }

    pub fn derived(&self) -> Option<&DerivedDesc> {
        match self {
            LayerDesc::Characters(_) => None,
            LayerDesc::Span(d) | LayerDesc::Seq(d) | LayerDesc::Element(d) | LayerDesc::Div(d) => {
                Some(d)
            }
        }
    }

    fn derived_mut(&mut self) -> Option<&mut DerivedDesc> {
        match self {
            LayerDesc::Characters(_) => None,
            LayerDesc::Span(d) | LayerDesc::Seq(d) | LayerDesc::Element(d) | LayerDesc::Div(d) => {
                Some(d)
            }
        }
    }

    pub fn base(&self) -> Option<&str> {
        self.derived().map(|d| d.base.as_str())
    }

    pub fn data(&self) -> Option<&DataType> {
        self.derived().and_then(|d| d.data.as_ref())
    }

    pub fn target(&self) -> Option<&str> {
        self.derived().and_then(|d| d.target.as_deref())
    }

    /// The layer whose elements link values index: `target` if set, otherwise `base`.
    pub fn link_target(&self) -> Option<&str> {
        self.target().or_else(|| self.base())
    }

    pub fn link_types(&self) -> Option<&[String]> {
        self.derived().and_then(|d| d.link_types.as_deref())
    }

    pub fn default_value(&self) -> Option<&serde_json::Value> {
        self.derived().and_then(|d| d.default.as_ref())
    }

    pub fn meta(&self) -> &LayerMeta {
        match self {
            LayerDesc::Characters(c) => &c.meta,
            LayerDesc::Span(d) | LayerDesc::Seq(d) | LayerDesc::Element(d) | LayerDesc::Div(d) => {
                &d.meta
            }
        }
    }

    fn meta_mut(&mut self) -> &mut LayerMeta {
        match self {
            LayerDesc::Characters(c) => &mut c.meta,
            LayerDesc::Span(d) | LayerDesc::Seq(d) | LayerDesc::Element(d) | LayerDesc::Div(d) => {
                &mut d.meta
            }
        }
    }

    /// Check the rules that hold for a single declaration in isolation.
    pub fn check(&self) -> std::result::Result<(), String> {
        let derived = match self.derived() {
            Some(d) => d,
            None => return Ok(()),
        };
        if derived.base.is_empty() {
            return Err(format!("A {} layer must declare a base", self.layer_type()));
        }
        if self.layer_type() == LayerType::Seq && derived.data.is_none() {
            return Err("A seq layer must declare data".into());
        }
        let is_link = derived.data == Some(DataType::Link);
        if derived.link_types.is_some() && !is_link {
            return Err("link_types requires data: link".into());
        }
        if derived.target.is_some() && !is_link {
            return Err("target requires data: link".into());
        }
        if let Some(DataType::Enum(values)) = &derived.data {
            if values.is_empty() {
                return Err("An enumerated data type must list at least one value".into());
            }
        }
        Ok(())
    }
}

/// Flat on-disk form of a layer declaration
#[derive(Serialize, Deserialize)]
struct RawLayerDesc {
    #[serde(rename = "type")]
    layer_type: LayerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    meta: LayerMeta,
}

impl TryFrom<RawLayerDesc> for LayerDesc {
    type Error = String;

    fn try_from(raw: RawLayerDesc) -> std::result::Result<Self, Self::Error> {
        if raw.layer_type == LayerType::Characters {
            let stray = [
                ("base", raw.base.is_some()),
                ("data", raw.data.is_some()),
                ("link_types", raw.link_types.is_some()),
                ("target", raw.target.is_some()),
                ("default", raw.default.is_some()),
            ];
            if let Some((field, _)) = stray.iter().find(|(_, present)| *present) {
                return Err(format!("A characters layer cannot declare '{field}'"));
            }
            return Ok(LayerDesc::Characters(CharactersDesc { meta: raw.meta }));
        }

        let base = raw
            .base
            .ok_or_else(|| format!("A {} layer must declare a base", raw.layer_type))?;
        let derived = DerivedDesc {
            base,
            data: raw.data,
            link_types: raw.link_types,
            target: raw.target,
            default: raw.default,
            meta: raw.meta,
        };
        let desc = match raw.layer_type {
            LayerType::Span => LayerDesc::Span(derived),
            LayerType::Seq => LayerDesc::Seq(derived),
            LayerType::Element => LayerDesc::Element(derived),
            LayerType::Div => LayerDesc::Div(derived),
            LayerType::Characters => return Err("Unexpected characters layer".into()),
        };
        desc.check()?;
        Ok(desc)
    }
}

impl From<LayerDesc> for RawLayerDesc {
    fn from(desc: LayerDesc) -> Self {
        let layer_type = desc.layer_type();
        match desc {
            LayerDesc::Characters(c) => RawLayerDesc {
                layer_type,
                base: None,
                data: None,
                link_types: None,
                target: None,
                default: None,
                meta: c.meta,
            },
            LayerDesc::Span(d) | LayerDesc::Seq(d) | LayerDesc::Element(d) | LayerDesc::Div(d) => {
                RawLayerDesc {
                    layer_type,
                    base: Some(d.base),
                    data: d.data,
                    link_types: d.link_types,
                    target: d.target,
                    default: d.default,
                    meta: d.meta,
                }
            }
        }
    }
}
