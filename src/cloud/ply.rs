//! PLY point cloud ingestion.
//!
//! Parses the PLY header and vertex stream into a [`PointCloud`]. Both
//! ASCII and binary little-endian payloads are supported.
//!
//! # Supported Properties
//!
//! - Vertex positions `x`, `y`, `z` (any numeric type) - required
//! - Vertex colors under either naming: `r`/`g`/`b`/`a` or
//!   `red`/`green`/`blue`/`alpha` - optional, alpha optional
//! - `property list ...` declarations are tolerated and skipped
//! - Elements other than `vertex` (faces, edges, ...) are skipped
//!
//! Unknown scalar types are read as float32 little-endian; this is a
//! documented fallback, not an error.
//!
//! # Color Normalization
//!
//! A channel value in `[0, 1]` is treated as normalized and scaled by 255;
//! anything else is clamped to `[0, 255]`. Both are rounded to the nearest
//! integer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{Point, PointCloud, Rgba};

/// Errors produced while parsing a PLY file.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("header is missing the end_header marker")]
    MissingEndHeader,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("missing or empty vertex element")]
    MissingVertexElement,

    #[error("vertex element does not declare coordinate '{0}'")]
    MissingCoordinate(&'static str),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid vertex data: {0}")]
    InvalidData(String),
}

/// Scalar property types defined by the PLY specification.
///
/// Unknown type names map to `F32` (read as float32 little-endian).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScalarType {
    F32,
    F64,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl ScalarType {
    fn from_name(name: &str) -> ScalarType {
        match name {
            "float" | "float32" => ScalarType::F32,
            "double" | "float64" => ScalarType::F64,
            "uchar" | "uint8" => ScalarType::U8,
            "char" | "int8" => ScalarType::I8,
            "ushort" | "uint16" => ScalarType::U16,
            "short" | "int16" => ScalarType::I16,
            "uint" | "uint32" => ScalarType::U32,
            "int" | "int32" => ScalarType::I32,
            // Documented fallback for unrecognized type names.
            _ => ScalarType::F32,
        }
    }

    fn size(self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::F32 | ScalarType::U32 | ScalarType::I32 => 4,
            ScalarType::F64 => 8,
        }
    }

    fn read_le<R: Read>(self, reader: &mut R) -> io::Result<f64> {
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..self.size()];
        reader.read_exact(bytes)?;
        Ok(match self {
            ScalarType::F32 => f32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            ScalarType::F64 => f64::from_le_bytes(bytes.try_into().unwrap()),
            ScalarType::U8 => bytes[0] as f64,
            ScalarType::I8 => bytes[0] as i8 as f64,
            ScalarType::U16 => u16::from_le_bytes(bytes.try_into().unwrap()) as f64,
            ScalarType::I16 => i16::from_le_bytes(bytes.try_into().unwrap()) as f64,
            ScalarType::U32 => u32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            ScalarType::I32 => i32::from_le_bytes(bytes.try_into().unwrap()) as f64,
        })
    }
}

/// What a vertex property contributes to a [`Point`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    X,
    Y,
    Z,
    Red,
    Green,
    Blue,
    Alpha,
    Other,
}

impl Role {
    fn from_name(name: &str) -> Role {
        match name {
            "x" => Role::X,
            "y" => Role::Y,
            "z" => Role::Z,
            "r" | "red" => Role::Red,
            "g" | "green" => Role::Green,
            "b" | "blue" => Role::Blue,
            "a" | "alpha" => Role::Alpha,
            _ => Role::Other,
        }
    }
}

#[derive(Clone, Debug)]
enum PropertyKind {
    Scalar(ScalarType),
    List { count: ScalarType, item: ScalarType },
}

#[derive(Clone, Debug)]
struct PropertyDef {
    role: Role,
    kind: PropertyKind,
}

#[derive(Clone, Debug)]
struct ElementDef {
    name: String,
    count: usize,
    properties: Vec<PropertyDef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Ascii,
    BinaryLittleEndian,
}

struct Header {
    format: Format,
    elements: Vec<ElementDef>,
}

/// Load a point cloud from a PLY file.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud, PlyError> {
    let file = File::open(path)?;
    read_ply(&mut BufReader::new(file))
}

/// Read a point cloud from any buffered PLY source.
pub fn read_ply<R: BufRead>(reader: &mut R) -> Result<PointCloud, PlyError> {
    let header = read_header(reader)?;

    let vertex = header
        .elements
        .iter()
        .find(|e| e.name == "vertex")
        .filter(|e| e.count > 0)
        .ok_or(PlyError::MissingVertexElement)?;
    for coord in ["x", "y", "z"] {
        let role = Role::from_name(coord);
        if !vertex.properties.iter().any(|p| p.role == role) {
            return Err(PlyError::MissingCoordinate(match role {
                Role::X => "x",
                Role::Y => "y",
                _ => "z",
            }));
        }
    }

    let mut points = Vec::new();
    for element in &header.elements {
        if element.name == "vertex" {
            points = match header.format {
                Format::Ascii => read_vertices_ascii(reader, element)?,
                Format::BinaryLittleEndian => read_vertices_binary(reader, element)?,
            };
            // Everything after the vertex stream is irrelevant here.
            break;
        }
        match header.format {
            Format::Ascii => skip_element_ascii(reader, element)?,
            Format::BinaryLittleEndian => skip_element_binary(reader, element)?,
        }
    }

    Ok(PointCloud::new(points))
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<Header, PlyError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 || line.trim_end() != "ply" {
        return Err(PlyError::UnsupportedFormat(
            "missing 'ply' magic line".into(),
        ));
    }

    let mut format = None;
    let mut elements: Vec<ElementDef> = Vec::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::MissingEndHeader);
        }
        let trimmed = line.trim_end();
        let mut tokens = trimmed.split_whitespace();
        match tokens.next() {
            Some("end_header") => break,
            Some("comment") | Some("obj_info") | None => {}
            Some("format") => {
                format = Some(match tokens.next() {
                    Some("ascii") => Format::Ascii,
                    Some("binary_little_endian") => Format::BinaryLittleEndian,
                    Some(other) => {
                        return Err(PlyError::UnsupportedFormat(other.to_string()));
                    }
                    None => {
                        return Err(PlyError::MalformedHeader(trimmed.to_string()));
                    }
                });
            }
            Some("element") => {
                let name = tokens
                    .next()
                    .ok_or_else(|| PlyError::MalformedHeader(trimmed.to_string()))?;
                let count = tokens
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or_else(|| PlyError::MalformedHeader(trimmed.to_string()))?;
                elements.push(ElementDef {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| PlyError::MalformedHeader(trimmed.to_string()))?;
                match tokens.next() {
                    Some("list") => {
                        let count = tokens
                            .next()
                            .ok_or_else(|| PlyError::MalformedHeader(trimmed.to_string()))?;
                        let item = tokens
                            .next()
                            .ok_or_else(|| PlyError::MalformedHeader(trimmed.to_string()))?;
                        // Name is irrelevant: list properties are skipped.
                        element.properties.push(PropertyDef {
                            role: Role::Other,
                            kind: PropertyKind::List {
                                count: ScalarType::from_name(count),
                                item: ScalarType::from_name(item),
                            },
                        });
                    }
                    Some(type_name) => {
                        let name = tokens
                            .next()
                            .ok_or_else(|| PlyError::MalformedHeader(trimmed.to_string()))?;
                        element.properties.push(PropertyDef {
                            role: Role::from_name(name),
                            kind: PropertyKind::Scalar(ScalarType::from_name(type_name)),
                        });
                    }
                    None => {
                        return Err(PlyError::MalformedHeader(trimmed.to_string()));
                    }
                }
            }
            // Unrecognized header keywords are ignored.
            Some(_) => {}
        }
    }

    let format = format.ok_or_else(|| PlyError::UnsupportedFormat("no format declared".into()))?;
    Ok(Header { format, elements })
}

/// Per-vertex accumulator for the role-tagged scalar values.
#[derive(Default)]
struct VertexValues {
    x: f64,
    y: f64,
    z: f64,
    red: Option<f64>,
    green: Option<f64>,
    blue: Option<f64>,
    alpha: Option<f64>,
}

impl VertexValues {
    fn set(&mut self, role: Role, value: f64) {
        match role {
            Role::X => self.x = value,
            Role::Y => self.y = value,
            Role::Z => self.z = value,
            Role::Red => self.red = Some(value),
            Role::Green => self.green = Some(value),
            Role::Blue => self.blue = Some(value),
            Role::Alpha => self.alpha = Some(value),
            Role::Other => {}
        }
    }

    fn into_point(self) -> Point {
        let color = match (self.red, self.green, self.blue) {
            (Some(r), Some(g), Some(b)) => Some(Rgba::new(
                normalize_channel(r),
                normalize_channel(g),
                normalize_channel(b),
                self.alpha.map(normalize_channel).unwrap_or(255),
            )),
            _ => None,
        };
        Point {
            x: self.x,
            y: self.y,
            z: self.z,
            color,
        }
    }
}

/// Normalize a color channel: `[0, 1]` scales by 255, everything else
/// clamps to `[0, 255]`.
fn normalize_channel(v: f64) -> u8 {
    if (0.0..=1.0).contains(&v) {
        (v * 255.0).round() as u8
    } else {
        v.clamp(0.0, 255.0).round() as u8
    }
}

fn read_vertices_ascii<R: BufRead>(
    reader: &mut R,
    element: &ElementDef,
) -> Result<Vec<Point>, PlyError> {
    let mut points = Vec::with_capacity(element.count);
    let mut line = String::new();
    while points.len() < element.count {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::InvalidData(format!(
                "expected {} vertices, got {}",
                element.count,
                points.len()
            )));
        }
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let mut values = VertexValues::default();
        for property in &element.properties {
            match &property.kind {
                PropertyKind::Scalar(_) => {
                    let token = tokens.next().ok_or_else(|| {
                        PlyError::InvalidData(format!("short vertex line: {}", line.trim_end()))
                    })?;
                    let value = token.parse::<f64>().map_err(|_| {
                        PlyError::InvalidData(format!("non-numeric value '{token}'"))
                    })?;
                    values.set(property.role, value);
                }
                PropertyKind::List { .. } => {
                    let count = tokens
                        .next()
                        .and_then(|t| t.parse::<usize>().ok())
                        .ok_or_else(|| {
                            PlyError::InvalidData("malformed list property".to_string())
                        })?;
                    for _ in 0..count {
                        tokens.next().ok_or_else(|| {
                            PlyError::InvalidData("truncated list property".to_string())
                        })?;
                    }
                }
            }
        }
        points.push(values.into_point());
    }
    Ok(points)
}

fn read_vertices_binary<R: Read>(
    reader: &mut R,
    element: &ElementDef,
) -> Result<Vec<Point>, PlyError> {
    let mut points = Vec::with_capacity(element.count);
    for _ in 0..element.count {
        let mut values = VertexValues::default();
        for property in &element.properties {
            match &property.kind {
                PropertyKind::Scalar(ty) => {
                    values.set(property.role, ty.read_le(reader)?);
                }
                PropertyKind::List { count, item } => {
                    let n = count.read_le(reader)? as usize;
                    skip_bytes(reader, n * item.size())?;
                }
            }
        }
        points.push(values.into_point());
    }
    Ok(points)
}

fn skip_element_ascii<R: BufRead>(reader: &mut R, element: &ElementDef) -> Result<(), PlyError> {
    let mut line = String::new();
    for _ in 0..element.count {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::InvalidData(format!(
                "truncated '{}' element",
                element.name
            )));
        }
    }
    Ok(())
}

fn skip_element_binary<R: Read>(reader: &mut R, element: &ElementDef) -> Result<(), PlyError> {
    let fixed_stride: Option<usize> = element
        .properties
        .iter()
        .map(|p| match &p.kind {
            PropertyKind::Scalar(ty) => Some(ty.size()),
            PropertyKind::List { .. } => None,
        })
        .sum();
    if let Some(stride) = fixed_stride {
        skip_bytes(reader, element.count * stride)?;
        return Ok(());
    }
    // List properties force a row-by-row walk.
    for _ in 0..element.count {
        for property in &element.properties {
            match &property.kind {
                PropertyKind::Scalar(ty) => skip_bytes(reader, ty.size())?,
                PropertyKind::List { count, item } => {
                    let n = count.read_le(reader)? as usize;
                    skip_bytes(reader, n * item.size())?;
                }
            }
        }
    }
    Ok(())
}

fn skip_bytes<R: Read>(reader: &mut R, n: usize) -> io::Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(n as u64), &mut io::sink())?;
    if copied < n as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated binary payload",
        ));
    }
    Ok(())
}

/// Write a point cloud as ASCII PLY with `x y z` and, when any point is
/// colored, `red green blue alpha` byte channels.
pub fn write_ply_ascii<P: AsRef<Path>>(path: P, cloud: &PointCloud) -> Result<(), PlyError> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    let with_color = cloud.points().iter().any(|p| p.color.is_some());

    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", cloud.len())?;
    writeln!(w, "property double x")?;
    writeln!(w, "property double y")?;
    writeln!(w, "property double z")?;
    if with_color {
        writeln!(w, "property uchar red")?;
        writeln!(w, "property uchar green")?;
        writeln!(w, "property uchar blue")?;
        writeln!(w, "property uchar alpha")?;
    }
    writeln!(w, "end_header")?;

    for p in cloud.points() {
        write!(w, "{} {} {}", p.x, p.y, p.z)?;
        if with_color {
            let c = p.color.unwrap_or(Rgba::WHITE);
            write!(w, " {} {} {} {}", c.r, c.g, c.b, c.a)?;
        }
        writeln!(w)?;
    }
    Ok(())
}
