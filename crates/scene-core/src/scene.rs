use glam::{Mat4, Vec2};
use serde::{Serialize, Deserialize};

/// Classification reported by the scene source for each object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneObjectKind {
    Background,
    Wall,
    Floor,
    Ceiling,
    Platform,
    World,
    CompletelyInferred,
    Unknown,
}

impl SceneObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            SceneObjectKind::Background => "background",
            SceneObjectKind::Wall => "wall",
            SceneObjectKind::Floor => "floor",
            SceneObjectKind::Ceiling => "ceiling",
            SceneObjectKind::Platform => "platform",
            SceneObjectKind::World => "world",
            SceneObjectKind::CompletelyInferred => "inferred",
            SceneObjectKind::Unknown => "unknown",
        }
    }
}

/// Rectangular surface region on a scene object
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneQuad {
    pub id: u64,
    /// Width and height in meters
    pub extents: Vec2,
}

impl SceneQuad {
    pub fn new(id: u64, width: f32, height: f32) -> Self {
        Self { id, extents: Vec2::new(width, height) }
    }

    pub fn area(&self) -> f32 {
        self.extents.x * self.extents.y
    }
}

/// A single object in a decoded scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: u64,
    pub kind: SceneObjectKind,
    /// Placement of the object in scene-local space
    pub placement: Mat4,
    #[serde(default)]
    pub quads: Vec<SceneQuad>,
}

impl SceneObject {
    pub fn new(id: u64, kind: SceneObjectKind, placement: Mat4) -> Self {
        Self { id, kind, placement, quads: Vec::new() }
    }

    pub fn with_quad(mut self, quad: SceneQuad) -> Self {
        self.quads.push(quad);
        self
    }
}

/// Structured form of a scene payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self { objects }
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn quad_count(&self) -> usize {
        self.objects.iter().map(|o| o.quads.len()).sum()
    }

    /// First object of the given kind, in payload order
    pub fn first_of_kind(&self, kind: SceneObjectKind) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.kind == kind)
    }

    pub fn floor(&self) -> Option<&SceneObject> {
        self.first_of_kind(SceneObjectKind::Floor)
    }
}
