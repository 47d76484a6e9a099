//! Tolerant OBJ parser.
//!
//! Reads the subset of OBJ that mesh previews need:
//!
//! - `v x y z [w]` positions
//! - `vn x y z` normals
//! - `vt u v [w]` texture coordinates
//! - `usemtl name` material groups
//! - `f` faces in `p`, `p/t`, `p/t/n` or `p//n` form (one form per file)
//!
//! Comments, groups, smoothing groups and unknown directives are skipped.
//! Malformed vertex records are replaced with safe defaults and counted as
//! warnings; malformed faces are counted and dropped. Only failing to read the
//! file is an error.

use std::path::Path;

use prism_math::{Vec2, Vec3};
use thiserror::Error;

/// Material group used for faces that precede any `usemtl`.
pub const DEFAULT_GROUP: &str = "default";

/// Bytes of source text dumped to the debug log per malformed record.
const DUMP_BYTES: usize = 128;

/// Errors that can occur during OBJ parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Outcome of a parse that produced a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStatus {
    Ok,
    /// At least one record was replaced or dropped.
    OkWithFixups,
}

/// Triangle winding of emitted faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Winding {
    /// Keep the file's vertex order.
    #[default]
    Preserve,
    /// Reverse every emitted triangle.
    Reverse,
}

/// Face vertex layout, detected from the first face of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceFormat {
    /// `p`
    Position,
    /// `p/t`
    PositionTexcoord,
    /// `p/t/n`
    PositionTexcoordNormal,
    /// `p//n`
    PositionNormal,
}

impl FaceFormat {
    fn detect(token: &str) -> Option<Self> {
        let parts: Vec<&str> = token.split('/').collect();
        match parts.as_slice() {
            [_] => Some(FaceFormat::Position),
            [_, t] if !t.is_empty() => Some(FaceFormat::PositionTexcoord),
            [_, t, _] if t.is_empty() => Some(FaceFormat::PositionNormal),
            [_, _, _] => Some(FaceFormat::PositionTexcoordNormal),
            _ => None,
        }
    }

    pub fn has_texcoords(self) -> bool {
        matches!(
            self,
            FaceFormat::PositionTexcoord | FaceFormat::PositionTexcoordNormal
        )
    }

    pub fn has_normals(self) -> bool {
        matches!(
            self,
            FaceFormat::PositionNormal | FaceFormat::PositionTexcoordNormal
        )
    }
}

/// Faces sharing one material, as zero-based index lists with three entries
/// per triangle. Lists for attributes the file's faces don't reference are
/// empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjFragment {
    pub material: String,
    pub positions: Vec<u32>,
    pub texcoords: Vec<u32>,
    pub normals: Vec<u32>,
}

impl ObjFragment {
    fn new(material: &str) -> Self {
        Self {
            material: material.to_string(),
            ..Default::default()
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Loose arrays produced by the parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjData {
    pub positions: Vec<Vec3>,
    /// Fourth position component, kept only when some `v` record supplied one
    pub position_w: Option<Vec<f32>>,
    pub normals: Vec<Vec3>,
    /// Texture coordinates with V already flipped to `1 - v`
    pub texcoords: Vec<Vec2>,
    /// Third texture coordinate component, kept only when some `vt` record supplied one
    pub texcoord_w: Option<Vec<f32>>,
    /// Material groups in first-seen order
    pub fragments: Vec<ObjFragment>,
    pub warnings: u32,
}

impl ObjData {
    pub fn status(&self) -> ParseStatus {
        if self.warnings > 0 {
            ParseStatus::OkWithFixups
        } else {
            ParseStatus::Ok
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.fragments.iter().map(ObjFragment::triangle_count).sum()
    }
}

/// What the parser does with the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    ReadDirective,
    ReadVertexData(VertexRecord),
    ReadFace,
    SkipLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexRecord {
    Position,
    Normal,
    Texcoord,
}

/// Line-oriented OBJ parser.
pub struct ObjParser<'a> {
    content: &'a str,
    winding: Winding,
    data: ObjData,
    current: Option<usize>,
    face_format: Option<FaceFormat>,
    has_position_w: bool,
    has_texcoord_w: bool,
}

impl<'a> ObjParser<'a> {
    /// Create a new parser over file contents.
    pub fn new(content: &'a str, winding: Winding) -> Self {
        Self {
            content,
            winding,
            data: ObjData::default(),
            current: None,
            face_format: None,
            has_position_w: false,
            has_texcoord_w: false,
        }
    }

    /// Parse every line and post-process the arrays.
    pub fn parse(mut self) -> ObjData {
        let content = self.content;
        let mut offset = 0;
        for (index, raw) in content.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += raw.len();
            self.parse_line(index + 1, line_start, raw.trim());
        }

        self.finish()
    }

    fn parse_line(&mut self, line_num: usize, line_start: usize, line: &str) {
        let mut tokens = line.split_whitespace();
        let mut state = ParseState::ReadDirective;

        loop {
            state = match state {
                ParseState::ReadDirective => match tokens.next() {
                    Some("v") => ParseState::ReadVertexData(VertexRecord::Position),
                    Some("vn") => ParseState::ReadVertexData(VertexRecord::Normal),
                    Some("vt") => ParseState::ReadVertexData(VertexRecord::Texcoord),
                    Some("usemtl") => {
                        self.use_material(tokens.next(), line_num, line_start);
                        return;
                    }
                    Some("f") => ParseState::ReadFace,
                    // Comments, groups, smoothing, and anything unknown
                    _ => ParseState::SkipLine,
                },
                ParseState::ReadVertexData(record) => {
                    let values: Vec<f32> = tokens.map_while(|t| t.parse().ok()).take(4).collect();
                    self.read_vertex(record, &values, line_num, line_start);
                    return;
                }
                ParseState::ReadFace => {
                    let vertices: Vec<&str> = tokens.collect();
                    self.read_face(&vertices, line_num, line_start);
                    return;
                }
                ParseState::SkipLine => return,
            }
        }
    }

    fn read_vertex(
        &mut self,
        record: VertexRecord,
        values: &[f32],
        line_num: usize,
        line_start: usize,
    ) {
        match record {
            VertexRecord::Position => {
                if values.len() >= 3 {
                    self.data
                        .positions
                        .push(Vec3::new(values[0], values[1], values[2]));
                    self.has_position_w |= values.len() == 4;
                    push_w(&mut self.data.position_w, values.get(3).copied().unwrap_or(1.0));
                } else {
                    self.data.positions.push(Vec3::ZERO);
                    push_w(&mut self.data.position_w, 0.0);
                    self.fixup(line_num, line_start, "invalid position, setting to origin");
                }
            }
            VertexRecord::Normal => {
                if values.len() >= 3 {
                    self.data
                        .normals
                        .push(Vec3::new(values[0], values[1], values[2]));
                } else {
                    self.data.normals.push(Vec3::Z);
                    self.fixup(line_num, line_start, "invalid normal, setting to 0,0,1");
                }
            }
            VertexRecord::Texcoord => {
                if values.len() >= 2 {
                    self.data.texcoords.push(Vec2::new(values[0], values[1]));
                    self.has_texcoord_w |= values.len() >= 3;
                    push_w(&mut self.data.texcoord_w, values.get(2).copied().unwrap_or(0.0));
                } else {
                    self.data.texcoords.push(Vec2::ZERO);
                    push_w(&mut self.data.texcoord_w, 0.0);
                    self.fixup(
                        line_num,
                        line_start,
                        "invalid texture coordinate, setting to u=0, v=0",
                    );
                }
            }
        }
    }

    fn use_material(&mut self, name: Option<&str>, line_num: usize, line_start: usize) {
        let name = match name {
            Some(name) => name,
            None => {
                self.fixup(line_num, line_start, "usemtl without a name");
                DEFAULT_GROUP
            }
        };
        self.current = Some(self.fragment_index(name));
    }

    /// Linear scan: meshes carry a handful of materials.
    fn fragment_index(&mut self, name: &str) -> usize {
        match self.data.fragments.iter().position(|f| f.material == name) {
            Some(index) => index,
            None => {
                self.data.fragments.push(ObjFragment::new(name));
                self.data.fragments.len() - 1
            }
        }
    }

    fn read_face(&mut self, tokens: &[&str], line_num: usize, line_start: usize) {
        let format = match self.face_format {
            Some(format) => format,
            None => match tokens.first().and_then(|t| FaceFormat::detect(t)) {
                Some(format) => {
                    self.face_format = Some(format);
                    format
                }
                None => {
                    self.fixup(line_num, line_start, "unrecognized face format, skipping");
                    return;
                }
            },
        };

        let corners: Option<Vec<FaceCorner>> = tokens
            .iter()
            .map(|token| self.resolve_corner(token, format))
            .collect();

        let corners = match corners {
            Some(corners) if corners.len() >= 3 => corners,
            _ => {
                self.fixup(line_num, line_start, "malformed face, skipping");
                return;
            }
        };

        let fragment = match self.current {
            Some(index) => index,
            None => {
                let index = self.fragment_index(DEFAULT_GROUP);
                self.current = Some(index);
                index
            }
        };
        let fragment = &mut self.data.fragments[fragment];

        // Fan around the first corner
        for i in 1..corners.len() - 1 {
            let mut triangle = [corners[0], corners[i], corners[i + 1]];
            if self.winding == Winding::Reverse {
                triangle.reverse();
            }

            for corner in triangle {
                fragment.positions.push(corner.position);
                if let Some(t) = corner.texcoord {
                    fragment.texcoords.push(t);
                }
                if let Some(n) = corner.normal {
                    fragment.normals.push(n);
                }
            }
        }
    }

    fn resolve_corner(&self, token: &str, format: FaceFormat) -> Option<FaceCorner> {
        let parts: Vec<&str> = token.split('/').collect();
        let (p, t, n) = match (format, parts.as_slice()) {
            (FaceFormat::Position, [p]) => (*p, None, None),
            (FaceFormat::PositionTexcoord, [p, t]) => (*p, Some(*t), None),
            (FaceFormat::PositionTexcoordNormal, [p, t, n]) => (*p, Some(*t), Some(*n)),
            (FaceFormat::PositionNormal, [p, "", n]) => (*p, None, Some(*n)),
            _ => return None,
        };

        let position = resolve_index(p, self.data.positions.len())?;
        let texcoord = match t {
            Some(t) => Some(resolve_index(t, self.data.texcoords.len())?),
            None => None,
        };
        let normal = match n {
            Some(n) => Some(resolve_index(n, self.data.normals.len())?),
            None => None,
        };

        Some(FaceCorner {
            position,
            texcoord,
            normal,
        })
    }

    fn fixup(&mut self, line_num: usize, line_start: usize, message: &str) {
        self.data.warnings += 1;
        log::warn!("OBJ line {}: {}", line_num, message);

        let bytes = self.content.as_bytes();
        let end = (line_start + DUMP_BYTES).min(bytes.len());
        log::debug!(
            "OBJ bytes at offset {}:\n{}",
            line_start,
            String::from_utf8_lossy(&bytes[line_start..end])
        );
    }

    fn finish(mut self) -> ObjData {
        let format = self.face_format;

        // Drop attributes the faces never referenced
        if !format.is_some_and(FaceFormat::has_normals) {
            self.data.normals.clear();
        }
        if !format.is_some_and(FaceFormat::has_texcoords) {
            self.data.texcoords.clear();
            self.data.texcoord_w = None;
        }

        if !self.has_position_w {
            self.data.position_w = None;
        }
        // Authoring tools put v=0 at the bottom of the image. Three-component
        // texcoords are kept as authored.
        if !self.has_texcoord_w {
            self.data.texcoord_w = None;
            for uv in &mut self.data.texcoords {
                uv.y = 1.0 - uv.y;
            }
        }

        self.data
    }
}

#[derive(Debug, Clone, Copy)]
struct FaceCorner {
    position: u32,
    texcoord: Option<u32>,
    normal: Option<u32>,
}

fn push_w(channel: &mut Option<Vec<f32>>, value: f32) {
    channel.get_or_insert_with(Vec::new).push(value);
}

/// Resolve a one-based OBJ index against the current element count.
/// Negative indices count back from the end. Zero and out-of-range
/// indices are rejected.
fn resolve_index(token: &str, count: usize) -> Option<u32> {
    let raw: i64 = token.parse().ok()?;
    let count = count as i64;
    let index = match raw {
        0 => return None,
        i if i > 0 => i - 1,
        i => count + i,
    };

    if (0..count).contains(&index) {
        u32::try_from(index).ok()
    } else {
        None
    }
}

/// Parse OBJ text.
pub fn parse_obj_str(content: &str, winding: Winding) -> ObjData {
    ObjParser::new(content, winding).parse()
}

/// Read and parse an OBJ file. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_obj_file(path: &Path, winding: Winding) -> ParseResult<ObjData> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);

    let data = parse_obj_str(&content, winding);
    log::debug!(
        "Parsed {}: {} positions, {} triangles, {} fragments, {} warnings",
        path.display(),
        data.positions.len(),
        data.triangle_count(),
        data.fragments.len(),
        data.warnings
    );
    Ok(data)
}
