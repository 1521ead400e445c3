//! Serializable stage descriptions.
//!
//! A [`StageSpec`] names a built-in stage and its parameters. Specs are what
//! gets stored in pipeline files and parsed from the command line; [`build`]
//! turns one into a live stage for a given source frame.
//!
//! [`build`]: StageSpec::build

use crate::core::area::{Dimensions, Rect};
use crate::core::error::GeometryResult;
use crate::filters::builtin::{CropStage, GeometricStage, KernelOp, KernelStage, ToneStage};
use crate::filters::stage::FilterStage;
use crate::geometry::lens::{ChromaticAberration, Distortion};
use crate::geometry::point::Point;
use crate::geometry::transforms::{Rotation, Scale, Shift};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Description of one built-in stage.
///
/// Centres default to the centre of the source frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageSpec {
    /// Rotation about the frame centre.
    Rotate {
        /// Angle in degrees.
        angle: f64,
    },
    /// Uniform scale about the frame centre.
    Scale {
        /// Scale factor, positive.
        factor: f64,
    },
    /// Perspective correction.
    Shift {
        /// Vertical tilt in degrees.
        vertical: f64,
        /// Horizontal tilt in degrees.
        horizontal: f64,
        /// Focal length in pixels; defaults to the frame diagonal.
        #[serde(default)]
        focal: Option<f64>,
    },
    /// Radial lens distortion.
    Distortion {
        /// Second-order coefficient.
        k1: f64,
        /// Fourth-order coefficient.
        #[serde(default)]
        k2: f64,
    },
    /// Lateral chromatic aberration.
    ChromaticAberration {
        /// Red channel scale relative to green.
        red: f64,
        /// Blue channel scale relative to green.
        blue: f64,
    },
    /// Crop to a photo rectangle.
    Crop {
        /// Left edge.
        x1: f64,
        /// Top edge.
        y1: f64,
        /// Right edge.
        x2: f64,
        /// Bottom edge.
        y2: f64,
    },
    /// Blur of the given radius.
    Blur {
        /// Radius in pixels.
        radius: u32,
    },
    /// Sharpening of the given radius.
    Sharpen {
        /// Radius in pixels.
        radius: u32,
    },
    /// Per-pixel tone adjustment.
    Tone,
}

impl StageSpec {
    /// Default stage identifier for this spec.
    pub fn default_id(&self) -> &'static str {
        match self {
            StageSpec::Rotate { .. } => "rotate",
            StageSpec::Scale { .. } => "scale",
            StageSpec::Shift { .. } => "shift",
            StageSpec::Distortion { .. } => "distortion",
            StageSpec::ChromaticAberration { .. } => "ca",
            StageSpec::Crop { .. } => "crop",
            StageSpec::Blur { .. } => "blur",
            StageSpec::Sharpen { .. } => "sharpen",
            StageSpec::Tone => "tone",
        }
    }

    /// Build the stage for a pipeline whose source is `frame`.
    pub fn build(&self, id: impl Into<String>, frame: &Dimensions) -> GeometryResult<Arc<dyn FilterStage>> {
        let id = id.into();
        let rect = frame.rect();
        let (cx, cy) = rect.center();
        let center = Point::new(cx, cy);

        let stage: Arc<dyn FilterStage> = match *self {
            StageSpec::Rotate { angle } => Arc::new(GeometricStage::new(id, Rotation::new(angle, center))),
            StageSpec::Scale { factor } => Arc::new(GeometricStage::new(id, Scale::new(factor, center)?)),
            StageSpec::Shift {
                vertical,
                horizontal,
                focal,
            } => {
                let focal = focal.unwrap_or_else(|| rect.width().hypot(rect.height()));
                Arc::new(GeometricStage::new(
                    id,
                    Shift::new(vertical, horizontal, focal, center)?,
                ))
            }
            StageSpec::Distortion { k1, k2 } => {
                let norm = 0.5 * rect.width().hypot(rect.height());
                Arc::new(GeometricStage::new(id, Distortion::new(k1, k2, center, norm)?))
            }
            StageSpec::ChromaticAberration { red, blue } => Arc::new(GeometricStage::new(
                id,
                ChromaticAberration::new(red, blue, center)?,
            )),
            StageSpec::Crop { x1, y1, x2, y2 } => {
                Arc::new(CropStage::new(id, Rect::new(x1, y1, x2, y2))?)
            }
            StageSpec::Blur { radius } => Arc::new(KernelStage::new(id, KernelOp::Blur, radius)?),
            StageSpec::Sharpen { radius } => {
                Arc::new(KernelStage::new(id, KernelOp::Sharpen, radius)?)
            }
            StageSpec::Tone => Arc::new(ToneStage::new(id)),
        };
        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::stage::StageKind;

    #[test]
    fn test_build_each_kind() {
        let frame = Dimensions::new(4000, 3000);
        let specs = [
            (StageSpec::Rotate { angle: 3.0 }, StageKind::Geometric),
            (
                StageSpec::Shift {
                    vertical: 2.0,
                    horizontal: 0.0,
                    focal: None,
                },
                StageKind::Geometric,
            ),
            (StageSpec::Distortion { k1: 0.01, k2: 0.0 }, StageKind::Geometric),
            (
                StageSpec::Crop {
                    x1: 0.0,
                    y1: 0.0,
                    x2: 10.0,
                    y2: 10.0,
                },
                StageKind::Crop,
            ),
            (StageSpec::Blur { radius: 2 }, StageKind::Kernel),
            (StageSpec::Tone, StageKind::Tonal),
        ];
        for (spec, kind) in specs {
            let stage = spec.build(spec.default_id(), &frame).unwrap();
            assert_eq!(stage.kind(), kind);
            assert_eq!(stage.id(), spec.default_id());
        }
        assert!(StageSpec::Scale { factor: -1.0 }.build("s", &frame).is_err());
    }

    #[test]
    fn test_spec_serde() {
        let spec: StageSpec = serde_json::from_str(r#"{"type":"distortion","k1":0.02}"#).unwrap();
        assert_eq!(spec, StageSpec::Distortion { k1: 0.02, k2: 0.0 });
        let json = serde_json::to_string(&StageSpec::Tone).unwrap();
        assert_eq!(json, r#"{"type":"tone"}"#);
    }
}
