//! Flattened, engine-agnostic view of a decoded KMF file.
//!
//! Only the primary level of detail is exported. Vertex positions are
//! resolved through the geometry tables so each submesh is self-contained.

use serde::Serialize;

use crate::error::{FormatError, Result};
use crate::kmf::{
    Anim, FrameFactorFunction, GroupElement, KmfFile, Material, Mesh, ModelDocument, ModelType,
    Triangle,
};

#[derive(Debug, Serialize)]
pub struct ModelExport {
    pub version: u32,
    pub model_type: ModelType,
    pub materials: Vec<Material>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub meshes: Vec<ExportMesh>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<ExportAnimation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<GroupElement>,
}

#[derive(Debug, Serialize)]
pub struct ExportMesh {
    pub name: String,
    pub position: [f32; 3],
    pub scale: f32,
    pub submeshes: Vec<ExportSubmesh>,
}

#[derive(Debug, Serialize)]
pub struct ExportSubmesh {
    pub material_index: u32,
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<Triangle>,
}

#[derive(Debug, Serialize)]
pub struct ExportAnimation {
    pub name: String,
    pub frame_count: usize,
    pub frame_factor_function: FrameFactorFunction,
    pub position: [f32; 3],
    pub cube_scale: f32,
    pub submeshes: Vec<ExportAnimatedSubmesh>,
}

#[derive(Debug, Serialize)]
pub struct ExportAnimatedSubmesh {
    pub material_index: u32,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<Triangle>,
    /// `frames[frame][vertex]`
    pub frames: Vec<Vec<[f32; 3]>>,
}

impl ModelExport {
    pub fn from_kmf(kmf: &KmfFile) -> Result<Self> {
        let mut export = ModelExport {
            version: kmf.version,
            model_type: kmf.model_type(),
            materials: kmf.materials.clone(),
            meshes: Vec::new(),
            animation: None,
            group: Vec::new(),
        };
        match &kmf.document {
            ModelDocument::Mesh(meshes) => {
                export.meshes = meshes.iter().map(export_mesh).collect::<Result<_>>()?;
            }
            ModelDocument::Animation(anim) => export.animation = Some(export_animation(anim)?),
            ModelDocument::Group(elements) => export.group = elements.clone(),
        }
        Ok(export)
    }
}

fn export_mesh(mesh: &Mesh) -> Result<ExportMesh> {
    let mut submeshes = Vec::with_capacity(mesh.sprites.len());
    for sprite in &mesh.sprites {
        let positions = sprite
            .vertices
            .iter()
            .map(|vertex| {
                mesh.vertex_position(vertex)
                    .ok_or(FormatError::IndexOutOfRange {
                        what: "mesh geometry",
                        index: usize::from(vertex.geom_index),
                        limit: mesh.geometries.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        submeshes.push(ExportSubmesh {
            material_index: sprite.material_index,
            positions,
            uvs: sprite.vertices.iter().map(|v| v.uv.to_f32()).collect(),
            normals: sprite.vertices.iter().map(|v| v.normal).collect(),
            triangles: sprite.primary_triangles().to_vec(),
        });
    }
    Ok(ExportMesh {
        name: mesh.name.clone(),
        position: mesh.position,
        scale: mesh.scale,
        submeshes,
    })
}

fn export_animation(anim: &Anim) -> Result<ExportAnimation> {
    let mut submeshes = Vec::with_capacity(anim.sprites.len());
    for sprite in &anim.sprites {
        let frames = (0..anim.frame_count)
            .map(|frame| anim.sprite_frame(sprite, frame))
            .collect::<Result<Vec<_>>>()?;
        submeshes.push(ExportAnimatedSubmesh {
            material_index: sprite.material_index,
            uvs: sprite.vertices.iter().map(|v| v.uv.to_f32()).collect(),
            normals: sprite.vertices.iter().map(|v| v.normal).collect(),
            triangles: sprite.primary_triangles().to_vec(),
            frames,
        });
    }
    Ok(ExportAnimation {
        name: anim.name.clone(),
        frame_count: anim.frame_count,
        frame_factor_function: anim.frame_factor_function,
        position: anim.position,
        cube_scale: anim.cube_scale,
        submeshes,
    })
}
