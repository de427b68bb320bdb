use std::{cmp::Ordering, path::Path};

use anyhow::{Context, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{FaceAnalyzer, FaceLandmarks, FaceRegion, landmarks::FACE_LANDMARK_COUNT};
use crate::{
    error::{CaptureError, Result},
    types::{Frame, Rect},
};

pub const DETECTOR_INPUT_WIDTH: u32 = 320;
pub const DETECTOR_INPUT_HEIGHT: u32 = 240;
pub const LANDMARK_INPUT_SIZE: u32 = 112;

#[derive(Clone, Debug)]
pub struct FaceDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
    /// Landmark crop side relative to the longer face box side.
    pub crop_scale: f32,
}

impl Default for FaceDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.7,
            nms_threshold: 0.3,
            top_k: 16,
            crop_scale: 1.2,
        }
    }
}

/// UltraFace-style detector followed by a 68-point regressor, both on ONNX Runtime.
pub struct OrtFaceAnalyzer {
    detector: Session,
    landmarker: Session,
    cfg: FaceDetectorConfig,
}

fn load_session(path: &Path, what: &str) -> anyhow::Result<Session> {
    if !path.is_file() {
        return Err(CaptureError::MissingResource(path.to_path_buf()).into());
    }
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load {what} from {}", path.display()))
}

impl OrtFaceAnalyzer {
    pub fn new(
        detector_path: &Path,
        landmark_path: &Path,
        cfg: FaceDetectorConfig,
    ) -> anyhow::Result<Self> {
        let detector = load_session(detector_path, "face detector")?;
        let landmarker = load_session(landmark_path, "landmark model")?;
        log::info!(
            "face ORT backend ready using {} and landmarks {}",
            detector_path.display(),
            landmark_path.display()
        );
        Ok(Self {
            detector,
            landmarker,
            cfg,
        })
    }

    fn run_detector(&mut self, frame: &Frame) -> anyhow::Result<Vec<FaceRegion>> {
        let resized = resize_bgr(
            &frame.bgr,
            frame.width,
            frame.height,
            DETECTOR_INPUT_WIDTH,
            DETECTOR_INPUT_HEIGHT,
        )?;
        let input = planar_rgb_tensor(
            &resized,
            DETECTOR_INPUT_WIDTH,
            DETECTOR_INPUT_HEIGHT,
            |v| (v - 127.0) / 128.0,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .detector
            .run(ort::inputs![tensor])
            .context("failed to run face detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "face detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        let boxes = outputs[1].try_extract_array::<f32>()?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        let boxes: Vec<f32> = boxes.iter().copied().collect();

        decode_detections(&scores, &boxes, frame.width, frame.height, &self.cfg)
    }

    fn run_landmarker(&mut self, frame: &Frame, face: &FaceRegion) -> anyhow::Result<FaceLandmarks> {
        let crop = landmark_crop(face.bounds, self.cfg.crop_scale, frame.width, frame.height)
            .ok_or_else(|| anyhow!("face {:?} has no area inside the frame", face.bounds))?;
        let pixels = copy_region(frame, crop);
        let resized = resize_bgr(
            &pixels,
            crop.width as u32,
            crop.height as u32,
            LANDMARK_INPUT_SIZE,
            LANDMARK_INPUT_SIZE,
        )?;
        let input = planar_rgb_tensor(&resized, LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE, |v| {
            v / 255.0
        })?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .landmarker
            .run(ort::inputs![tensor])
            .context("failed to run landmark session")?;
        if outputs.len() == 0 {
            return Err(anyhow!("landmark model returned no outputs"));
        }
        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        Ok(project_landmarks(&flat, crop)?)
    }
}

impl FaceAnalyzer for OrtFaceAnalyzer {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        self.run_detector(frame)
            .map_err(|err| CaptureError::Model(format!("{err:#}")))
    }

    fn fit_landmarks(&mut self, frame: &Frame, face: &FaceRegion) -> Result<FaceLandmarks> {
        self.run_landmarker(frame, face)
            .map_err(|err| CaptureError::Model(format!("{err:#}")))
    }
}

fn resize_bgr(
    bgr: &[u8],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
) -> anyhow::Result<Vec<u8>> {
    let src = fir::images::Image::from_vec_u8(width, height, bgr.to_vec(), fir::PixelType::U8x3)?;
    let mut dst = fir::images::Image::new(new_width, new_height, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    Ok(dst.into_vec())
}

/// NCHW float tensor in RGB plane order from packed BGR bytes.
fn planar_rgb_tensor(
    bgr: &[u8],
    width: u32,
    height: u32,
    normalize: impl Fn(f32) -> f32,
) -> anyhow::Result<Array4<f32>> {
    let plane = width as usize * height as usize;
    if bgr.len() != plane * 3 {
        return Err(anyhow!(
            "input buffer size mismatch: got {}, expected {}",
            bgr.len(),
            plane * 3
        ));
    }
    let mut data = vec![0f32; plane * 3];
    for (i, px) in bgr.chunks_exact(3).enumerate() {
        data[i] = normalize(px[2] as f32);
        data[plane + i] = normalize(px[1] as f32);
        data[2 * plane + i] = normalize(px[0] as f32);
    }
    Array4::<f32>::from_shape_vec((1, 3, height as usize, width as usize), data)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))
}

/// Scores are `[.., N, 2]` (background, face); boxes are `[.., N, 4]`
/// normalised corners.
fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    width: u32,
    height: u32,
    cfg: &FaceDetectorConfig,
) -> anyhow::Result<Vec<FaceRegion>> {
    let anchors = scores.len() / 2;
    if boxes.len() / 4 != anchors {
        return Err(anyhow!(
            "anchor count mismatch between scores ({anchors}) and boxes ({})",
            boxes.len() / 4
        ));
    }

    let (fw, fh) = (width as f32, height as f32);
    let mut candidates = Vec::new();
    for idx in 0..anchors {
        let score = scores[idx * 2 + 1];
        if score < cfg.score_threshold {
            continue;
        }
        let b = &boxes[idx * 4..idx * 4 + 4];
        let bbox = [
            (b[0] * fw).clamp(0.0, fw),
            (b[1] * fh).clamp(0.0, fh),
            (b[2] * fw).clamp(0.0, fw),
            (b[3] * fh).clamp(0.0, fh),
        ];
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }
        candidates.push(Candidate { bbox, score });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept
        .into_iter()
        .filter_map(|idx| candidates.get(idx))
        .map(|c| FaceRegion {
            bounds: Rect::new(
                c.bbox[0] as i32,
                c.bbox[1] as i32,
                (c.bbox[2] - c.bbox[0]).round() as i32,
                (c.bbox[3] - c.bbox[1]).round() as i32,
            ),
            score: c.score,
        })
        .collect())
}

/// Square crop around the face, clamped to the frame.
fn landmark_crop(face: Rect, scale: f32, width: u32, height: u32) -> Option<Rect> {
    let side = (face.width.max(face.height) as f32 * scale).round() as i32;
    let cx = face.x + face.width / 2;
    let cy = face.y + face.height / 2;
    let x0 = (cx - side / 2).max(0);
    let y0 = (cy - side / 2).max(0);
    let x1 = (cx - side / 2 + side).min(width as i32);
    let y1 = (cy - side / 2 + side).min(height as i32);
    (x1 > x0 && y1 > y0).then(|| Rect::new(x0, y0, x1 - x0, y1 - y0))
}

fn copy_region(frame: &Frame, rect: Rect) -> Vec<u8> {
    let stride = frame.width as usize * 3;
    let row_len = rect.width as usize * 3;
    let mut out = Vec::with_capacity(row_len * rect.height as usize);
    for y in rect.y..rect.bottom() {
        let start = y as usize * stride + rect.x as usize * 3;
        out.extend_from_slice(&frame.bgr[start..start + row_len]);
    }
    out
}

/// Map normalised `(x, y)` pairs from crop space back to the frame.
fn project_landmarks(flat: &[f32], crop: Rect) -> Result<FaceLandmarks> {
    if flat.len() < FACE_LANDMARK_COUNT * 2 {
        return Err(CaptureError::Model(format!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            FACE_LANDMARK_COUNT * 2
        )));
    }
    let points = flat
        .chunks_exact(2)
        .take(FACE_LANDMARK_COUNT)
        .map(|p| {
            (
                crop.x as f32 + p[0] * crop.width as f32,
                crop.y as f32 + p[1] * crop.height as f32,
            )
        })
        .collect();
    FaceLandmarks::new(points)
}

#[derive(Clone, Debug)]
struct Candidate {
    bbox: [f32; 4],
    score: f32,
}

fn nms(candidates: &[Candidate], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        for &k in &keep {
            if iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold {
                continue 'outer;
            }
        }
        keep.push(idx);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}
