use std::path::Path;

use super::landmarks::*;
use crate::{
    error::{CaptureError, Result},
    pipeline::color,
    types::OverlayKind,
};

/// Landmark anchors that size, tilt and place one ornament.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrnamentRecipe {
    pub scale_anchors: (usize, usize),
    pub factor: f32,
    pub tilt_anchors: (usize, usize),
    pub placement_anchors: (usize, usize),
}

pub fn recipe_for(kind: OverlayKind) -> Option<OrnamentRecipe> {
    match kind {
        OverlayKind::Glasses => Some(OrnamentRecipe {
            scale_anchors: (RIGHT_EYE_OUTER, LEFT_EYE_OUTER),
            factor: 1.5,
            tilt_anchors: (RIGHT_EYE_OUTER, LEFT_EYE_OUTER),
            placement_anchors: (RIGHT_EYE_OUTER, LEFT_EYE_OUTER),
        }),
        OverlayKind::Mustache => Some(OrnamentRecipe {
            scale_anchors: (MOUTH_RIGHT, MOUTH_LEFT),
            factor: 1.5,
            tilt_anchors: (MOUTH_RIGHT, MOUTH_LEFT),
            placement_anchors: (NOSE_BASE, UPPER_LIP_TOP),
        }),
        OverlayKind::MouseNose => Some(OrnamentRecipe {
            scale_anchors: (JAW_RIGHT_CHEEK, JAW_LEFT_CHEEK),
            factor: 1.0,
            tilt_anchors: (JAW_RIGHT_END, JAW_LEFT_END),
            placement_anchors: (NOSE_TIP, NOSE_TIP),
        }),
        OverlayKind::FaceBox | OverlayKind::Landmarks => None,
    }
}

pub fn asset_file(kind: OverlayKind) -> Option<&'static str> {
    match kind {
        OverlayKind::Glasses => Some("glasses.jpg"),
        OverlayKind::Mustache => Some("mustache.jpg"),
        OverlayKind::MouseNose => Some("mouse-nose.jpg"),
        OverlayKind::FaceBox | OverlayKind::Landmarks => None,
    }
}

/// Immutable BGR ornament image and the recipe that places it.
#[derive(Clone, Debug)]
pub struct OrnamentAsset {
    pub kind: OverlayKind,
    pub recipe: OrnamentRecipe,
    pub bgr: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl OrnamentAsset {
    pub fn from_bgr(kind: OverlayKind, bgr: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let recipe = recipe_for(kind).ok_or_else(|| {
            CaptureError::Model(format!("{} overlay has no ornament", kind.label()))
        })?;
        if width == 0 || height == 0 || bgr.len() != width as usize * height as usize * 3 {
            return Err(CaptureError::Model(format!(
                "{} ornament buffer does not match {width}x{height}",
                kind.label()
            )));
        }
        Ok(Self {
            kind,
            recipe,
            bgr,
            width,
            height,
        })
    }

    pub fn load(kind: OverlayKind, dir: &Path) -> Result<Self> {
        let file = asset_file(kind).ok_or_else(|| {
            CaptureError::Model(format!("{} overlay has no ornament", kind.label()))
        })?;
        let path = dir.join(file);
        if !path.is_file() {
            return Err(CaptureError::MissingResource(path));
        }
        let rgb = image::open(&path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        log::debug!("loaded {} ({width}x{height})", path.display());
        Self::from_bgr(kind, color::swap_rb(rgb.as_raw()), width, height)
    }
}

/// Load every ornament; any missing file is fatal.
pub fn load_all(dir: &Path) -> Result<Vec<OrnamentAsset>> {
    OverlayKind::ALL
        .iter()
        .filter(|kind| recipe_for(**kind).is_some())
        .map(|kind| OrnamentAsset::load(*kind, dir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::{ArtifactStore, DiskArtifacts, StillFormat, tests::scratch_dir},
        types::Frame,
    };

    #[test]
    fn every_ornament_kind_has_a_recipe_and_asset() {
        for kind in OverlayKind::ALL {
            assert_eq!(recipe_for(kind).is_some(), asset_file(kind).is_some());
            assert_eq!(recipe_for(kind).is_some(), kind.needs_landmarks() && kind != OverlayKind::Landmarks);
        }
        let nose = recipe_for(OverlayKind::MouseNose).unwrap();
        assert_eq!(nose.scale_anchors, (3, 13));
        assert_eq!(nose.tilt_anchors, (0, 16));
        assert_eq!(nose.placement_anchors, (30, 30));
    }

    #[test]
    fn missing_asset_is_reported_with_its_path() {
        let dir = scratch_dir("no-assets");
        match load_all(&dir) {
            Err(CaptureError::MissingResource(path)) => {
                assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("glasses.jpg"));
            }
            other => panic!("expected MissingResource, got {other:?}"),
        }
    }

    #[test]
    fn loads_all_three_ornaments_from_a_directory() {
        let dir = scratch_dir("assets");
        let mut store = DiskArtifacts::new(&dir, StillFormat::Jpeg).unwrap();
        for name in ["glasses", "mustache", "mouse-nose"] {
            store.save_photo(name, &Frame::filled(12, 6, [255, 255, 255])).unwrap();
        }

        let ornaments = load_all(&dir).unwrap();
        let kinds: Vec<_> = ornaments.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![OverlayKind::Glasses, OverlayKind::Mustache, OverlayKind::MouseNose]
        );
        assert!(ornaments.iter().all(|o| (o.width, o.height) == (12, 6)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
