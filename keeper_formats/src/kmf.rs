//! KMF model containers (`KMSH`).
//!
//! A file holds one of three documents, selected by the type in its `HEAD`
//! section: static meshes, a vertex animation, or a group that places other
//! models. All strings are NUL terminated and every section tag is followed
//! by a u32 size that the decoder skips.

use std::fs;
use std::path::Path;

use anyhow::Context;
use bitflags::bitflags;
use serde::Serialize;

use crate::chunk::{Tag, expect_section};
use crate::error::{FormatError, Result};
use crate::reader::ByteCursor;

const TAG_KMSH: Tag = Tag::new(b"KMSH");
const TAG_HEAD: Tag = Tag::new(b"HEAD");
const TAG_MATL: Tag = Tag::new(b"MATL");
const TAG_MAT2: Tag = Tag::new(b"MAT2");
const TAG_MESH: Tag = Tag::new(b"MESH");
const TAG_CTRL: Tag = Tag::new(b"CTRL");
const TAG_SPRS: Tag = Tag::new(b"SPRS");
const TAG_SPHD: Tag = Tag::new(b"SPHD");
const TAG_GEOM: Tag = Tag::new(b"GEOM");
const TAG_ANIM: Tag = Tag::new(b"ANIM");
const TAG_POLY: Tag = Tag::new(b"POLY");
const TAG_VERT: Tag = Tag::new(b"VERT");
const TAG_ITAB: Tag = Tag::new(b"ITAB");
const TAG_VGEO: Tag = Tag::new(b"VGEO");
const TAG_GROP: Tag = Tag::new(b"GROP");
const TAG_ELEM: Tag = Tag::new(b"ELEM");

/// Frames covered by one row of the animation index table.
pub const FRAMES_PER_ITAB_CHUNK: usize = 128;

/// UV components are fixed point with this many units per 1.0.
pub const UV_SCALE: f32 = 32768.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelType {
    Mesh,
    Animation,
    Group,
}

impl ModelType {
    fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(ModelType::Mesh),
            2 => Ok(ModelType::Animation),
            3 => Ok(ModelType::Group),
            other => Err(FormatError::unsupported("KMF model type", other)),
        }
    }
}

/// Decoded KMF file.
#[derive(Debug, Clone, Serialize)]
pub struct KmfFile {
    pub version: u32,
    /// Empty for group documents, which carry no `MATL` section.
    pub materials: Vec<Material>,
    pub document: ModelDocument,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ModelDocument {
    Mesh(Vec<Mesh>),
    Animation(Anim),
    Group(Vec<GroupElement>),
}

impl ModelDocument {
    pub fn model_type(&self) -> ModelType {
        match self {
            ModelDocument::Mesh(_) => ModelType::Mesh,
            ModelDocument::Animation(_) => ModelType::Animation,
            ModelDocument::Group(_) => ModelType::Group,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    #[serde(transparent)]
    pub struct MaterialFlags: u32 {
        const HAS_ALPHA = 0x0001;
        const DOUBLE_SIDED = 0x0002;
        const ALPHA_ADDITIVE = 0x0004;
        // Remaining bits are kept verbatim.
        const _ = !0;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub name: String,
    /// Candidate textures; the first is the default, the rest alternates.
    pub textures: Vec<String>,
    pub flags: MaterialFlags,
    pub brightness: f32,
    pub gamma: f32,
    pub environment_map: Option<String>,
}

impl Material {
    pub fn default_texture(&self) -> Option<&str> {
        self.textures.first().map(String::as_str)
    }

    pub fn alternate_textures(&self) -> &[String] {
        self.textures.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Triangle(pub [u8; 3]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Uv {
    pub u: u16,
    pub v: u16,
}

impl Uv {
    pub fn to_f32(self) -> [f32; 2] {
        [f32::from(self.u) / UV_SCALE, f32::from(self.v) / UV_SCALE]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeshControl {
    pub unknown1: u32,
    pub unknown2: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mesh {
    pub name: String,
    pub position: [f32; 3],
    pub scale: f32,
    pub controls: Vec<MeshControl>,
    pub sprites: Vec<MeshSprite>,
    pub geometries: Vec<[f32; 3]>,
}

impl Mesh {
    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        expect_section(cursor, TAG_HEAD)?;
        let name = cursor.read_c_string()?;
        let sprite_count = cursor.read_count()?;
        let geom_count = cursor.read_count()?;
        let position = cursor.read_vec3()?;
        let scale = cursor.read_f32()?;
        let lod_count = cursor.read_count()?;

        expect_section(cursor, TAG_CTRL)?;
        let control_count = cursor.read_count()?;
        let mut controls = Vec::with_capacity(capacity(control_count, cursor));
        for _ in 0..control_count {
            controls.push(MeshControl {
                unknown1: cursor.read_u32()?,
                unknown2: cursor.read_u32()?,
            });
        }

        expect_section(cursor, TAG_SPRS)?;
        let headers = read_sprite_headers(cursor, sprite_count, lod_count)?;
        let mut sprites = Vec::with_capacity(headers.len());
        for header in headers {
            expect_section(cursor, TAG_SPRS)?;
            let material_index = cursor.read_u32()?;
            let lods = read_lods(cursor, &header)?;
            let mut vertices = Vec::with_capacity(capacity(header.vertex_count, cursor));
            for _ in 0..header.vertex_count {
                vertices.push(MeshVertex {
                    geom_index: cursor.read_u16()?,
                    uv: read_uv(cursor)?,
                    normal: cursor.read_vec3()?,
                });
            }
            sprites.push(MeshSprite {
                material_index,
                mm_factor: header.mm_factor,
                lods,
                vertices,
            });
        }

        expect_section(cursor, TAG_GEOM)?;
        let mut geometries = Vec::with_capacity(capacity(geom_count, cursor));
        for _ in 0..geom_count {
            geometries.push(cursor.read_vec3()?);
        }

        Ok(Mesh {
            name,
            position,
            scale,
            controls,
            sprites,
            geometries,
        })
    }

    /// Position of a sprite vertex, `None` when the vertex points past the
    /// geometry list.
    pub fn vertex_position(&self, vertex: &MeshVertex) -> Option<[f32; 3]> {
        self.geometries.get(usize::from(vertex.geom_index)).copied()
    }
}

/// Submesh sharing one material.
///
/// `lods[0]` is the only level of detail known to be consistent; the other
/// levels are kept exactly as stored but should not be relied upon.
#[derive(Debug, Clone, Serialize)]
pub struct MeshSprite {
    pub material_index: u32,
    pub mm_factor: f32,
    pub lods: Vec<Vec<Triangle>>,
    pub vertices: Vec<MeshVertex>,
}

impl MeshSprite {
    pub fn primary_triangles(&self) -> &[Triangle] {
        self.lods.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeshVertex {
    pub geom_index: u16,
    pub uv: Uv,
    pub normal: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameFactorFunction {
    None,
    Clamp,
    Wrap,
}

impl FrameFactorFunction {
    fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(FrameFactorFunction::None),
            1 => Ok(FrameFactorFunction::Clamp),
            2 => Ok(FrameFactorFunction::Wrap),
            other => Err(FormatError::unsupported("frame factor function", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnimControl {
    pub unknown1: u16,
    pub unknown2: u16,
    pub unknown3: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimGeom {
    pub position: [f32; 3],
    /// Frame (within its 128 frame chunk) at which this key position applies.
    pub frame_base: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimVertex {
    pub uv: Uv,
    pub normal: [f32; 3],
    pub itab_index: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnimSprite {
    pub material_index: u32,
    pub mm_factor: f32,
    pub lods: Vec<Vec<Triangle>>,
    pub vertices: Vec<AnimVertex>,
}

impl AnimSprite {
    pub fn primary_triangles(&self) -> &[Triangle] {
        self.lods.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Anim {
    pub name: String,
    pub frame_count: usize,
    pub index_count: usize,
    pub frame_factor_function: FrameFactorFunction,
    pub position: [f32; 3],
    pub cube_scale: f32,
    pub scale: f32,
    pub controls: Vec<AnimControl>,
    pub sprites: Vec<AnimSprite>,
    /// `itab[frame >> 7][itab_index]` is the first geometry of a vertex track
    /// within that chunk of frames.
    pub itab: Vec<Vec<u32>>,
    /// Key positions; the last stored entry is repeated once so that
    /// `geom_index + 1` is always valid.
    pub geometries: Vec<AnimGeom>,
    /// `offsets[itab_index][frame]` is added to the `itab` base.
    pub offsets: Vec<Vec<u8>>,
}

impl Anim {
    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        expect_section(cursor, TAG_HEAD)?;
        let name = cursor.read_c_string()?;
        let sprite_count = cursor.read_count()?;
        let frame_count_offset = cursor.position();
        let frame_count = cursor.read_count()?;
        let index_count = cursor.read_count()?;
        let geom_count = cursor.read_count()?;
        let frame_factor_function = FrameFactorFunction::from_raw(cursor.read_u32()?)?;
        let position = cursor.read_vec3()?;
        let cube_scale = cursor.read_f32()?;
        let scale = cursor.read_f32()?;
        let lod_count = cursor.read_count()?;

        if frame_count == 0 {
            return Err(FormatError::InvalidLength {
                offset: frame_count_offset,
                length: 0,
            });
        }

        expect_section(cursor, TAG_CTRL)?;
        let control_count = cursor.read_count()?;
        let mut controls = Vec::with_capacity(capacity(control_count, cursor));
        for _ in 0..control_count {
            controls.push(AnimControl {
                unknown1: cursor.read_u16()?,
                unknown2: cursor.read_u16()?,
                unknown3: cursor.read_u32()?,
            });
        }

        expect_section(cursor, TAG_SPRS)?;
        let headers = read_sprite_headers(cursor, sprite_count, lod_count)?;
        let mut sprites = Vec::with_capacity(headers.len());
        for header in headers {
            expect_section(cursor, TAG_SPRS)?;
            let material_index = cursor.read_u32()?;

            expect_section(cursor, TAG_POLY)?;
            let lods = read_lods(cursor, &header)?;

            expect_section(cursor, TAG_VERT)?;
            let mut vertices = Vec::with_capacity(capacity(header.vertex_count, cursor));
            for _ in 0..header.vertex_count {
                vertices.push(AnimVertex {
                    uv: read_uv(cursor)?,
                    normal: cursor.read_vec3()?,
                    itab_index: cursor.read_u16()?,
                });
            }
            sprites.push(AnimSprite {
                material_index,
                mm_factor: header.mm_factor,
                lods,
                vertices,
            });
        }

        expect_section(cursor, TAG_ITAB)?;
        let chunks = (frame_count - 1) / FRAMES_PER_ITAB_CHUNK + 1;
        let mut itab = Vec::with_capacity(capacity(chunks, cursor));
        for _ in 0..chunks {
            let mut row = Vec::with_capacity(capacity(index_count, cursor));
            for _ in 0..index_count {
                row.push(cursor.read_u32()?);
            }
            itab.push(row);
        }

        expect_section(cursor, TAG_GEOM)?;
        let mut geometries = Vec::with_capacity(capacity(geom_count, cursor) + 1);
        for _ in 0..geom_count {
            let packed = cursor.read_u32()?;
            let frame_base = cursor.read_u8()?;
            geometries.push(AnimGeom {
                position: unpack_coordinates(packed, scale),
                frame_base,
            });
        }
        if let Some(&last) = geometries.last() {
            geometries.push(last);
        }

        expect_section(cursor, TAG_VGEO)?;
        let mut offsets = Vec::with_capacity(capacity(index_count, cursor));
        for _ in 0..index_count {
            offsets.push(cursor.read_bytes(frame_count)?.to_vec());
        }

        Ok(Anim {
            name,
            frame_count,
            index_count,
            frame_factor_function,
            position,
            cube_scale,
            scale,
            controls,
            sprites,
            itab,
            geometries,
            offsets,
        })
    }

    /// Interpolated position of `vertex` at absolute `frame`.
    ///
    /// Single-frame animations return the stored key position as is.
    pub fn vertex_position(&self, vertex: &AnimVertex, frame: usize) -> Result<[f32; 3]> {
        if frame >= self.frame_count {
            return Err(FormatError::IndexOutOfRange {
                what: "frame",
                index: frame,
                limit: self.frame_count,
            });
        }

        let itab_index = usize::from(vertex.itab_index);
        let base = self
            .itab
            .get(frame / FRAMES_PER_ITAB_CHUNK)
            .and_then(|row| row.get(itab_index))
            .copied()
            .ok_or(FormatError::IndexOutOfRange {
                what: "itab",
                index: itab_index,
                limit: self.index_count,
            })?;
        let offset = self
            .offsets
            .get(itab_index)
            .and_then(|row| row.get(frame))
            .copied()
            .ok_or(FormatError::IndexOutOfRange {
                what: "vertex offset",
                index: itab_index,
                limit: self.index_count,
            })?;

        let geom_index = base as usize + usize::from(offset);
        let current = self.geometry(geom_index)?;
        if self.frame_count == 1 {
            return Ok(current.position);
        }
        let next = self.geometry(geom_index + 1)?;

        let span = i32::from(next.frame_base) - i32::from(current.frame_base);
        let factor = if span == 0 {
            0.0
        } else {
            let local = (frame % FRAMES_PER_ITAB_CHUNK) as i32;
            (local - i32::from(current.frame_base)) as f32 / span as f32
        };

        let mut position = current.position;
        for (axis, value) in position.iter_mut().enumerate() {
            *value += (next.position[axis] - *value) * factor;
        }
        Ok(position)
    }

    /// Positions of every vertex of one sprite at `frame`.
    pub fn sprite_frame(&self, sprite: &AnimSprite, frame: usize) -> Result<Vec<[f32; 3]>> {
        sprite
            .vertices
            .iter()
            .map(|vertex| self.vertex_position(vertex, frame))
            .collect()
    }

    fn geometry(&self, index: usize) -> Result<&AnimGeom> {
        self.geometries
            .get(index)
            .ok_or(FormatError::IndexOutOfRange {
                what: "animation geometry",
                index,
                limit: self.geometries.len(),
            })
    }
}

/// Child model placed by a group document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupElement {
    pub name: String,
    pub position: [f32; 3],
}

impl KmfFile {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("reading KMF {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("parsing KMF {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);

        expect_section(&mut cursor, TAG_KMSH)?;
        let version = cursor.read_u32()?;

        expect_section(&mut cursor, TAG_HEAD)?;
        let model_type = ModelType::from_raw(cursor.read_u32()?)?;
        let _unknown = cursor.read_u32()?;

        let materials = if model_type == ModelType::Group {
            Vec::new()
        } else {
            expect_section(&mut cursor, TAG_MATL)?;
            read_materials(&mut cursor)?
        };

        let mut meshes = Vec::new();
        let mut trailing = None;
        loop {
            // Only mesh documents may legitimately end after their meshes.
            if model_type == ModelType::Mesh && !cursor.has_remaining() {
                break;
            }
            let tag = Tag(cursor.read_tag()?);
            if tag != TAG_MESH {
                trailing = Some(tag);
                break;
            }
            cursor.skip(4)?;
            meshes.push(Mesh::read(&mut cursor)?);
        }

        let document = match model_type {
            ModelType::Mesh => {
                if let Some(tag) = trailing {
                    log::debug!("ignoring trailing {tag} section after KMF meshes");
                }
                ModelDocument::Mesh(meshes)
            }
            ModelType::Animation => {
                expect_trailing(trailing, TAG_ANIM)?;
                drop_meshes(&meshes, model_type);
                cursor.skip(4)?;
                ModelDocument::Animation(Anim::read(&mut cursor)?)
            }
            ModelType::Group => {
                expect_trailing(trailing, TAG_GROP)?;
                drop_meshes(&meshes, model_type);
                cursor.skip(4)?;
                ModelDocument::Group(read_group(&mut cursor)?)
            }
        };

        Ok(KmfFile {
            version,
            materials,
            document,
        })
    }

    pub fn model_type(&self) -> ModelType {
        self.document.model_type()
    }
}

fn expect_trailing(found: Option<Tag>, expected: Tag) -> Result<()> {
    match found {
        Some(tag) if tag == expected => Ok(()),
        Some(tag) => Err(FormatError::malformed(
            expected.to_string(),
            tag.to_string(),
        )),
        None => Err(FormatError::malformed(expected.to_string(), "end of file")),
    }
}

fn drop_meshes(meshes: &[Mesh], model_type: ModelType) {
    if !meshes.is_empty() {
        log::warn!(
            "dropping {} MESH sections from a {model_type:?} KMF document",
            meshes.len()
        );
    }
}

fn read_materials(cursor: &mut ByteCursor<'_>) -> Result<Vec<Material>> {
    let count = cursor.read_count()?;
    let mut materials = Vec::with_capacity(capacity(count, cursor));
    for _ in 0..count {
        expect_section(cursor, TAG_MAT2)?;
        let name = cursor.read_c_string()?;
        let texture_count = cursor.read_count()?;
        let mut textures = Vec::with_capacity(capacity(texture_count, cursor));
        for _ in 0..texture_count {
            textures.push(cursor.read_c_string()?);
        }
        let flags = MaterialFlags::from_bits_retain(cursor.read_u32()?);
        let brightness = cursor.read_f32()?;
        let gamma = cursor.read_f32()?;
        let environment_map = cursor.read_c_string()?;

        materials.push(Material {
            name,
            textures,
            flags,
            brightness,
            gamma,
            environment_map: if environment_map.is_empty() {
                None
            } else {
                Some(environment_map)
            },
        });
    }
    Ok(materials)
}

fn read_group(cursor: &mut ByteCursor<'_>) -> Result<Vec<GroupElement>> {
    expect_section(cursor, TAG_HEAD)?;
    let count = cursor.read_count()?;
    let mut elements = Vec::with_capacity(capacity(count, cursor));
    for _ in 0..count {
        expect_section(cursor, TAG_ELEM)?;
        elements.push(GroupElement {
            name: cursor.read_c_string()?,
            position: cursor.read_vec3()?,
        });
    }
    Ok(elements)
}

struct SpriteHeader {
    triangle_counts: Vec<usize>,
    vertex_count: usize,
    mm_factor: f32,
}

fn read_sprite_headers(
    cursor: &mut ByteCursor<'_>,
    count: usize,
    lod_count: usize,
) -> Result<Vec<SpriteHeader>> {
    let mut headers = Vec::with_capacity(capacity(count, cursor));
    for _ in 0..count {
        expect_section(cursor, TAG_SPHD)?;
        let mut triangle_counts = Vec::with_capacity(capacity(lod_count, cursor));
        for _ in 0..lod_count {
            triangle_counts.push(cursor.read_count()?);
        }
        headers.push(SpriteHeader {
            triangle_counts,
            vertex_count: cursor.read_count()?,
            mm_factor: cursor.read_f32()?,
        });
    }
    Ok(headers)
}

fn read_lods(cursor: &mut ByteCursor<'_>, header: &SpriteHeader) -> Result<Vec<Vec<Triangle>>> {
    let mut lods = Vec::with_capacity(header.triangle_counts.len());
    for &count in &header.triangle_counts {
        let mut triangles = Vec::with_capacity(capacity(count, cursor));
        for _ in 0..count {
            let bytes = cursor.read_bytes(3)?;
            let triangle = Triangle([bytes[0], bytes[1], bytes[2]]);
            for &index in &triangle.0 {
                if usize::from(index) >= header.vertex_count {
                    return Err(FormatError::IndexOutOfRange {
                        what: "triangle vertex",
                        index: usize::from(index),
                        limit: header.vertex_count,
                    });
                }
            }
            triangles.push(triangle);
        }
        lods.push(triangles);
    }
    Ok(lods)
}

fn read_uv(cursor: &mut ByteCursor<'_>) -> Result<Uv> {
    Ok(Uv {
        u: cursor.read_u16()?,
        v: cursor.read_u16()?,
    })
}

/// X, Y and Z are 10-bit fields (bits 20..30, 10..20, 0..10) biased by 512.
fn unpack_coordinates(packed: u32, scale: f32) -> [f32; 3] {
    let axis = |shift: u32| (((packed >> shift) & 0x3ff) as f32 - 512.0) / 511.0 * scale;
    [axis(20), axis(10), axis(0)]
}

// Counts come straight from the file; never pre-allocate more than the
// remaining bytes could describe.
fn capacity(count: usize, cursor: &ByteCursor<'_>) -> usize {
    count.min(cursor.remaining())
}
