//! Landmark JSON files consumed by the CLI.
//!
//! Three layouts are accepted, all in normalized `[x, y]` coordinates:
//! a face-mesh point list (`{"points": [...]}`), explicit rings
//! (`{"face": [...], "left_eye": [...], "right_eye": [...], "mouth": [...]}`),
//! or several faces wrapped as `{"faces": [...]}`.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use retouch_core::{LandmarkSet, NormalizedPoint};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LandmarkFile {
    Many { faces: Vec<FaceEntry> },
    Single(FaceEntry),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FaceEntry {
    Mesh {
        points: Vec<[f32; 2]>,
    },
    Rings {
        face: Vec<[f32; 2]>,
        left_eye: Vec<[f32; 2]>,
        right_eye: Vec<[f32; 2]>,
        mouth: Vec<[f32; 2]>,
    },
}

impl From<FaceEntry> for LandmarkSet {
    fn from(entry: FaceEntry) -> Self {
        let convert = |points: Vec<[f32; 2]>| -> Vec<NormalizedPoint> {
            points.into_iter().map(NormalizedPoint::from).collect()
        };
        match entry {
            FaceEntry::Mesh { points } => LandmarkSet::face_mesh(convert(points)),
            FaceEntry::Rings {
                face,
                left_eye,
                right_eye,
                mouth,
            } => LandmarkSet::from_rings(
                convert(face),
                convert(left_eye),
                convert(right_eye),
                convert(mouth),
            ),
        }
    }
}

/// Parse every face described by `json`.
pub fn parse_landmarks(json: &str) -> Result<Vec<LandmarkSet>> {
    let file: LandmarkFile = serde_json::from_str(json).context(
        "unrecognized landmark JSON (expected `points`, per-ring arrays, or `faces`)",
    )?;
    let faces = match file {
        LandmarkFile::Many { faces } => faces.into_iter().map(LandmarkSet::from).collect(),
        LandmarkFile::Single(face) => vec![face.into()],
    };
    Ok(faces)
}

/// Read and parse a landmark file from disk.
pub fn load_landmarks(path: &Path) -> Result<Vec<LandmarkSet>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read landmark file {}", path.display()))?;
    parse_landmarks(&contents).with_context(|| format!("invalid landmark file {}", path.display()))
}
