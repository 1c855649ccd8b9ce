//! Typed parameter values and their self-describing blob form.
//!
//! A blob never carries its own type: the tag (`name@version`) travels next to
//! it in the mapping, and the tag alone fixes the byte layout. All fields are
//! little-endian. Decoding is strict (boolean bytes must be 0/1, padding must be
//! zero), so any blob that decodes re-encodes to the same bytes.
use std::fmt::{self, Write as _};
use std::str::FromStr;

use crate::error::{DecodeError, SchemaError, SyncError};
use crate::schema::{BlobValue, Value};

/// Current layout version for every tag.
pub const BLOB_VERSION: u32 = 1;

const fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// 4×f64 + i32 + bool byte, before alignment.
pub const CUSTOM_PACKED_LEN: usize = 4 * 8 + 4 + 1;
pub const CUSTOM_STRIDE: usize = align_up(CUSTOM_PACKED_LEN, 8);
pub const SHAPE_HEADER_LEN: usize = 8;
pub const SHAPE_VERTEX_LEN: usize = 6 * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Text,
    Scalar,
    Vec2,
    Vec3,
    Color,
    Custom,
    Shape,
    Raw,
}

impl TypeTag {
    pub const ALL: [TypeTag; 9] = [
        TypeTag::Bool,
        TypeTag::Text,
        TypeTag::Scalar,
        TypeTag::Vec2,
        TypeTag::Vec3,
        TypeTag::Color,
        TypeTag::Custom,
        TypeTag::Shape,
        TypeTag::Raw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Text => "text",
            TypeTag::Scalar => "scalar",
            TypeTag::Vec2 => "vec2",
            TypeTag::Vec3 => "vec3",
            TypeTag::Color => "color",
            TypeTag::Custom => "custom",
            TypeTag::Shape => "shape",
            TypeTag::Raw => "raw",
        }
    }

    /// Encoded size for fixed layouts; `None` for text, shape and raw payloads.
    pub fn stride(self) -> Option<usize> {
        match self {
            TypeTag::Bool => Some(1),
            TypeTag::Scalar => Some(8),
            TypeTag::Vec2 => Some(16),
            TypeTag::Vec3 => Some(24),
            TypeTag::Color => Some(32),
            TypeTag::Custom => Some(CUSTOM_STRIDE),
            TypeTag::Text | TypeTag::Shape | TypeTag::Raw => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), BLOB_VERSION)
    }
}

impl FromStr for TypeTag {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .split_once('@')
            .ok_or_else(|| DecodeError::UnknownTag(s.to_string()))?;
        let tag = TypeTag::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| DecodeError::UnknownTag(s.to_string()))?;
        let version: u32 = version
            .parse()
            .map_err(|_| DecodeError::UnknownTag(s.to_string()))?;
        if version != BLOB_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                tag: name.to_string(),
                version,
            });
        }
        Ok(tag)
    }
}

/// Custom effect data: the fixed 37-byte record, padded to its stride.
#[derive(Debug, Clone, Copy)]
pub struct CustomData {
    pub channels: [f64; 4],
    pub selector: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ShapeVertex {
    pub point: [f64; 2],
    pub in_tangent: [f64; 2],
    pub out_tangent: [f64; 2],
}

#[derive(Debug, Clone, Default)]
pub struct ShapePath {
    pub closed: bool,
    pub vertices: Vec<ShapeVertex>,
}

/// Semantic value of a property or effect param.
#[derive(Debug, Clone)]
pub enum PropValue {
    Bool(bool),
    Scalar(f64),
    Text(String),
    Vec2([f64; 2]),
    Vec3([f64; 3]),
    Color([f64; 4]),
    Shape(ShapePath),
    Custom(CustomData),
    Raw(Vec<u8>),
}

fn bits_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

// Floats compare by bit pattern so NaN payloads and -0.0 survive diffing.
impl PartialEq for CustomData {
    fn eq(&self, other: &Self) -> bool {
        bits_eq(&self.channels, &other.channels)
            && self.selector == other.selector
            && self.enabled == other.enabled
    }
}

impl PartialEq for ShapeVertex {
    fn eq(&self, other: &Self) -> bool {
        bits_eq(&self.point, &other.point)
            && bits_eq(&self.in_tangent, &other.in_tangent)
            && bits_eq(&self.out_tangent, &other.out_tangent)
    }
}

impl PartialEq for ShapePath {
    fn eq(&self, other: &Self) -> bool {
        self.closed == other.closed && self.vertices == other.vertices
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        use PropValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Scalar(a), Scalar(b)) => a.to_bits() == b.to_bits(),
            (Text(a), Text(b)) => a == b,
            (Vec2(a), Vec2(b)) => bits_eq(a, b),
            (Vec3(a), Vec3(b)) => bits_eq(a, b),
            (Color(a), Color(b)) => bits_eq(a, b),
            (Shape(a), Shape(b)) => a == b,
            (Custom(a), Custom(b)) => a == b,
            (Raw(a), Raw(b)) => a == b,
            _ => false,
        }
    }
}

impl PropValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            PropValue::Bool(_) => TypeTag::Bool,
            PropValue::Text(_) => TypeTag::Text,
            PropValue::Scalar(_) => TypeTag::Scalar,
            PropValue::Vec2(_) => TypeTag::Vec2,
            PropValue::Vec3(_) => TypeTag::Vec3,
            PropValue::Color(_) => TypeTag::Color,
            PropValue::Shape(_) => TypeTag::Shape,
            PropValue::Custom(_) => TypeTag::Custom,
            PropValue::Raw(_) => TypeTag::Raw,
        }
    }

    /// True for values with no plain literal form at all.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            PropValue::Shape(_) | PropValue::Custom(_) | PropValue::Raw(_)
        )
    }
}

/// Encoded payload plus the tag needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub tag: TypeTag,
    pub bytes: Vec<u8>,
}

struct Writer {
    out: Vec<u8>,
}

impl Writer {
    fn with_capacity(n: usize) -> Self {
        Self {
            out: Vec::with_capacity(n),
        }
    }
    fn push(&mut self, b: u8) {
        self.out.push(b);
    }
    fn write_i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }
    fn write_u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }
    fn write_f64(&mut self, v: f64) {
        self.out.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    fn write_f64s(&mut self, vs: &[f64]) {
        for v in vs {
            self.write_f64(*v);
        }
    }
    fn write_bool(&mut self, b: bool) {
        self.push(u8::from(b));
    }
    fn pad_to(&mut self, len: usize) {
        self.out.resize(len.max(self.out.len()), 0);
    }
}

pub fn encode(value: &PropValue) -> Blob {
    let tag = value.type_tag();
    let mut w = Writer::with_capacity(tag.stride().unwrap_or(64));
    match value {
        PropValue::Bool(b) => w.write_bool(*b),
        PropValue::Text(s) => w.out.extend_from_slice(s.as_bytes()),
        PropValue::Scalar(x) => w.write_f64(*x),
        PropValue::Vec2(v) => w.write_f64s(v),
        PropValue::Vec3(v) => w.write_f64s(v),
        PropValue::Color(v) => w.write_f64s(v),
        PropValue::Custom(c) => {
            w.write_f64s(&c.channels);
            w.write_i32(c.selector);
            w.write_bool(c.enabled);
            w.pad_to(CUSTOM_STRIDE);
        }
        PropValue::Shape(s) => {
            w.write_u32(s.vertices.len() as u32);
            w.write_bool(s.closed);
            w.pad_to(SHAPE_HEADER_LEN);
            for v in &s.vertices {
                w.write_f64s(&v.point);
                w.write_f64s(&v.in_tangent);
                w.write_f64s(&v.out_tangent);
            }
        }
        PropValue::Raw(bytes) => w.out.extend_from_slice(bytes),
    }
    Blob { tag, bytes: w.out }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    tag: &'static str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], tag: TypeTag) -> Self {
        Self {
            data,
            pos: 0,
            tag: tag.name(),
        }
    }
    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let slice = self.data.get(self.pos..end).ok_or(DecodeError::Truncated {
            tag: self.tag,
            offset: self.pos,
        })?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        self.pos = end;
        Ok(buf)
    }
    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }
    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }
    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }
    fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(u64::from_le_bytes(self.take()?)))
    }
    fn read_f64s<const N: usize>(&mut self) -> Result<[f64; N], DecodeError> {
        let mut out = [0f64; N];
        for slot in out.iter_mut() {
            *slot = self.read_f64()?;
        }
        Ok(out)
    }
    fn read_bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidByte {
                tag: self.tag,
                field,
                value,
                offset,
            }),
        }
    }
    fn expect_padding(&mut self, until: usize) -> Result<(), DecodeError> {
        while self.pos < until {
            let offset = self.pos;
            let value = self.read_u8()?;
            if value != 0 {
                return Err(DecodeError::InvalidByte {
                    tag: self.tag,
                    field: "padding",
                    value,
                    offset,
                });
            }
        }
        Ok(())
    }
}

fn check_len(tag: TypeTag, expected: usize, found: usize) -> Result<(), DecodeError> {
    if expected != found {
        return Err(DecodeError::LengthMismatch {
            tag: tag.name(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Decode a blob whose layout is fixed by `tag`.
pub fn decode(bytes: &[u8], tag: TypeTag) -> Result<PropValue, DecodeError> {
    if let Some(stride) = tag.stride() {
        check_len(tag, stride, bytes.len())?;
    }
    let mut r = Reader::new(bytes, tag);
    let value = match tag {
        TypeTag::Bool => PropValue::Bool(r.read_bool("value")?),
        TypeTag::Text => PropValue::Text(
            String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::InvalidUtf8 {
                offset: e.utf8_error().valid_up_to(),
            })?,
        ),
        TypeTag::Scalar => PropValue::Scalar(r.read_f64()?),
        TypeTag::Vec2 => PropValue::Vec2(r.read_f64s()?),
        TypeTag::Vec3 => PropValue::Vec3(r.read_f64s()?),
        TypeTag::Color => PropValue::Color(r.read_f64s()?),
        TypeTag::Custom => {
            let channels = r.read_f64s()?;
            let selector = r.read_i32()?;
            let enabled = r.read_bool("enabled")?;
            r.expect_padding(CUSTOM_STRIDE)?;
            PropValue::Custom(CustomData {
                channels,
                selector,
                enabled,
            })
        }
        TypeTag::Shape => PropValue::Shape(decode_shape(&mut r, bytes.len())?),
        TypeTag::Raw => PropValue::Raw(bytes.to_vec()),
    };
    Ok(value)
}

fn decode_shape(r: &mut Reader<'_>, len: usize) -> Result<ShapePath, DecodeError> {
    let count = r.read_u32()?;
    let closed = r.read_bool("closed")?;
    r.expect_padding(SHAPE_HEADER_LEN)?;
    let expected = (count as usize)
        .checked_mul(SHAPE_VERTEX_LEN)
        .and_then(|n| n.checked_add(SHAPE_HEADER_LEN))
        .ok_or(DecodeError::BadVertexCount {
            tag: r.tag,
            count,
            len,
        })?;
    if expected != len {
        return Err(DecodeError::BadVertexCount {
            tag: r.tag,
            count,
            len,
        });
    }
    let mut vertices = Vec::with_capacity(count as usize);
    for _ in 0..count {
        vertices.push(ShapeVertex {
            point: r.read_f64s()?,
            in_tangent: r.read_f64s()?,
            out_tangent: r.read_f64s()?,
        });
    }
    Ok(ShapePath { closed, vertices })
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).ok();
    }
    out
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(DecodeError::OddHex(s.len()));
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for (i, pair) in bytes.chunks(2).enumerate() {
        let mut b = 0u8;
        for (j, c) in pair.iter().enumerate() {
            let nibble = (*c as char)
                .to_digit(16)
                .ok_or(DecodeError::InvalidHex(i * 2 + j))?;
            b = (b << 4) | nibble as u8;
        }
        out.push(b);
    }
    Ok(out)
}

// -------- mapping bridge --------

fn all_finite(vs: &[f64]) -> bool {
    vs.iter().all(|v| v.is_finite())
}

fn blob_value(value: &PropValue) -> Value {
    let blob = encode(value);
    Value::Blob(BlobValue {
        type_tag: blob.tag.to_string(),
        blob_hex: to_hex(&blob.bytes),
    })
}

/// Mapping form of a value: a plain literal where JSON can carry it exactly,
/// otherwise the encoded blob with its tag.
pub fn encode_value(value: &PropValue) -> Value {
    match value {
        PropValue::Bool(b) => Value::Bool(*b),
        PropValue::Text(s) => Value::Text(s.clone()),
        PropValue::Scalar(x) if x.is_finite() => Value::Number(*x),
        PropValue::Vec2(v) if all_finite(v) => Value::Vector(v.to_vec()),
        PropValue::Vec3(v) if all_finite(v) => Value::Vector(v.to_vec()),
        PropValue::Color(v) if all_finite(v) => Value::Vector(v.to_vec()),
        _ => blob_value(value),
    }
}

pub fn decode_blob(blob: &BlobValue) -> Result<PropValue, DecodeError> {
    let tag: TypeTag = blob.type_tag.parse()?;
    let bytes = from_hex(&blob.blob_hex)?;
    decode(&bytes, tag)
}

/// Typed value for a mapping value.
pub fn decode_value(value: &Value) -> Result<PropValue, SyncError> {
    Ok(match value {
        Value::Bool(b) => PropValue::Bool(*b),
        Value::Number(x) => PropValue::Scalar(*x),
        Value::Text(s) => PropValue::Text(s.clone()),
        Value::Vector(v) => match v.as_slice() {
            [x, y] => PropValue::Vec2([*x, *y]),
            [x, y, z] => PropValue::Vec3([*x, *y, *z]),
            [r, g, b, a] => PropValue::Color([*r, *g, *b, *a]),
            other => return Err(SchemaError::VectorArity(other.len()).into()),
        },
        Value::Blob(blob) => decode_blob(blob)?,
    })
}
