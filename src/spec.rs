//! Transformation spec parsing, validation, and canonicalization.
//!
//! The request boundary hands the core an *ordered* JSON mapping of
//! operation name → parameter mapping. This module turns that raw input into
//! a typed [`TransformationSpec`] — or rejects it with a human-readable
//! reason before any processing occurs.
//!
//! Two orderings matter and they are deliberately different:
//!
//! - **Execution order** is the order the request declared. Operations chain
//!   left to right, each consuming the previous stage's output.
//! - **Canonical order** is a fixed operation ranking used only for cache
//!   keys, so `{crop, resize}` and `{resize, crop}`-keyed requests with the
//!   same parameters hash identically when they are semantically the same
//!   spec. See [`TransformationSpec::canonicalize`].
//!
//! Validation never mutates the input; it only reports accept or reject.

use crate::imaging::{Direction, OutputFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Operation names accepted at the top level of a request, in canonical order.
const OPERATION_WHITELIST: &[&str] = &["resize", "crop", "rotate", "flip", "format", "filters"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("{operation} parameters must be an object")]
    NotAnObject { operation: String },
    #[error("{operation}.{parameter} is required")]
    MissingParameter {
        operation: &'static str,
        parameter: &'static str,
    },
    #[error("{operation}.{parameter}: {reason}")]
    InvalidParameter {
        operation: &'static str,
        parameter: &'static str,
        reason: String,
    },
    #[error("unsupported format: {0} (expected jpeg, png, gif, or webp)")]
    UnsupportedFormat(String),
}

/// One validated operation with typed parameters.
///
/// Serialization is used for canonicalization only: the externally tagged
/// form (`{"resize":{"width":..,"height":..}}`) with fixed field order is
/// the canonical shape hashed into cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Resize {
        width: u32,
        height: u32,
    },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Rotate {
        direction: Direction,
    },
    Flip {
        direction: Direction,
    },
    Format {
        target: OutputFormat,
    },
    Filters {
        grayscale: bool,
        sepia: bool,
    },
}

impl Operation {
    /// The request-facing operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::Crop { .. } => "crop",
            Self::Rotate { .. } => "rotate",
            Self::Flip { .. } => "flip",
            Self::Format { .. } => "format",
            Self::Filters { .. } => "filters",
        }
    }

    /// Filename prefix contributed by this operation, chained onto the prior
    /// stage's derived filename.
    pub fn filename_prefix(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resized_",
            Self::Crop { .. } => "cropped_",
            Self::Rotate { .. } => "rotated_",
            Self::Flip { .. } => "flipped_",
            Self::Format { .. } => "converted_",
            Self::Filters { .. } => "filtered_",
        }
    }

    /// Position in the fixed canonical operation order.
    fn canonical_rank(&self) -> usize {
        // OPERATION_WHITELIST is the canonical order
        OPERATION_WHITELIST
            .iter()
            .position(|n| *n == self.name())
            .unwrap_or(OPERATION_WHITELIST.len())
    }
}

/// An ordered, validated sequence of operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformationSpec {
    operations: Vec<Operation>,
}

impl TransformationSpec {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Operations in execution (declaration) order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// An empty spec is a valid no-op identity transform.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validate a raw request mapping into a typed spec.
    ///
    /// The mapping's declared order becomes the execution order. Any key
    /// outside the operation whitelist, or any malformed parameter shape,
    /// rejects the whole spec.
    pub fn from_request(raw: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut operations = Vec::with_capacity(raw.len());
        for (name, params) in raw {
            operations.push(parse_operation(name, params)?);
        }
        Ok(Self { operations })
    }

    /// Canonical JSON form: operations sorted by the fixed operation order,
    /// each in its externally tagged serialized shape.
    ///
    /// Two specs containing the same operations with the same parameters
    /// canonicalize identically regardless of incidental input key order.
    pub fn canonicalize(&self) -> String {
        let mut sorted: Vec<&Operation> = self.operations.iter().collect();
        sorted.sort_by_key(|op| op.canonical_rank());
        // Operation serialization is infallible: no maps with non-string
        // keys, no non-finite floats.
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

fn parse_operation(name: &str, params: &Value) -> Result<Operation, ValidationError> {
    match name {
        "resize" => {
            let params = as_object("resize", params)?;
            Ok(Operation::Resize {
                width: dimension("resize", "width", params)?,
                height: dimension("resize", "height", params)?,
            })
        }
        "crop" => {
            let params = as_object("crop", params)?;
            Ok(Operation::Crop {
                x: offset("crop", "x", params)?,
                y: offset("crop", "y", params)?,
                width: dimension("crop", "width", params)?,
                height: dimension("crop", "height", params)?,
            })
        }
        "rotate" => Ok(Operation::Rotate {
            direction: direction("rotate", params)?,
        }),
        "flip" => Ok(Operation::Flip {
            direction: direction("flip", params)?,
        }),
        "format" => {
            let target = params
                .as_str()
                .ok_or_else(|| ValidationError::InvalidParameter {
                    operation: "format",
                    parameter: "target",
                    reason: "must be a string".into(),
                })?;
            OutputFormat::from_name(target)
                .map(|target| Operation::Format { target })
                .ok_or_else(|| ValidationError::UnsupportedFormat(target.to_string()))
        }
        "filters" => {
            let params = as_object("filters", params)?;
            let mut grayscale = false;
            let mut sepia = false;
            for (key, value) in params {
                let toggle = match key.as_str() {
                    "grayscale" => &mut grayscale,
                    "sepia" => &mut sepia,
                    other => {
                        return Err(ValidationError::InvalidParameter {
                            operation: "filters",
                            parameter: "keys",
                            reason: format!("unknown filter: {other}"),
                        });
                    }
                };
                *toggle = value
                    .as_bool()
                    .ok_or_else(|| ValidationError::InvalidParameter {
                        operation: "filters",
                        parameter: "values",
                        reason: format!("{key} must be a boolean"),
                    })?;
            }
            Ok(Operation::Filters { grayscale, sepia })
        }
        other => Err(ValidationError::UnknownOperation(other.to_string())),
    }
}

fn as_object<'a>(
    operation: &str,
    params: &'a Value,
) -> Result<&'a Map<String, Value>, ValidationError> {
    params.as_object().ok_or_else(|| ValidationError::NotAnObject {
        operation: operation.to_string(),
    })
}

/// Fetch a required numeric parameter. Integers and floats are both
/// accepted; the value is rounded to whole pixels.
fn number(
    operation: &'static str,
    parameter: &'static str,
    params: &Map<String, Value>,
) -> Result<f64, ValidationError> {
    let value = params
        .get(parameter)
        .ok_or(ValidationError::MissingParameter {
            operation,
            parameter,
        })?;
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidParameter {
            operation,
            parameter,
            reason: "must be a number".into(),
        })
}

/// A strictly positive pixel dimension (width/height).
fn dimension(
    operation: &'static str,
    parameter: &'static str,
    params: &Map<String, Value>,
) -> Result<u32, ValidationError> {
    let value = number(operation, parameter, params)?;
    let rounded = value.round();
    if rounded < 1.0 || rounded > u32::MAX as f64 {
        return Err(ValidationError::InvalidParameter {
            operation,
            parameter,
            reason: format!("must be a positive pixel count, got {value}"),
        });
    }
    Ok(rounded as u32)
}

/// A non-negative pixel offset (crop x/y).
fn offset(
    operation: &'static str,
    parameter: &'static str,
    params: &Map<String, Value>,
) -> Result<u32, ValidationError> {
    let value = number(operation, parameter, params)?;
    let rounded = value.round();
    if rounded < 0.0 || rounded > u32::MAX as f64 {
        return Err(ValidationError::InvalidParameter {
            operation,
            parameter,
            reason: format!("must be non-negative, got {value}"),
        });
    }
    Ok(rounded as u32)
}

/// Optional `direction` parameter for rotate/flip. Absence defaults to a
/// vertical (top-bottom) mirror, not an error.
fn direction(operation: &'static str, params: &Value) -> Result<Direction, ValidationError> {
    let params = as_object(operation, params)?;
    match params.get("direction") {
        None => Ok(Direction::Vertical),
        Some(value) => value
            .as_str()
            .map(Direction::from_name)
            .ok_or_else(|| ValidationError::InvalidParameter {
                operation,
                parameter: "direction",
                reason: "must be a string".into(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    // =========================================================================
    // Whitelist and shape
    // =========================================================================

    #[test]
    fn empty_spec_is_accepted() {
        let spec = TransformationSpec::from_request(&Map::new()).unwrap();
        assert!(spec.is_empty());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let raw = request(json!({"blur": {"radius": 3}}));
        let err = TransformationSpec::from_request(&raw).unwrap_err();
        assert_eq!(err, ValidationError::UnknownOperation("blur".into()));
    }

    #[test]
    fn one_bad_key_rejects_whole_spec() {
        let raw = request(json!({
            "resize": {"width": 100, "height": 100},
            "sharpen": {}
        }));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    #[test]
    fn operation_params_must_be_objects() {
        let raw = request(json!({"resize": [100, 100]}));
        let err = TransformationSpec::from_request(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject { .. }));
    }

    // =========================================================================
    // resize
    // =========================================================================

    #[test]
    fn resize_accepts_integers_and_floats() {
        let raw = request(json!({"resize": {"width": 400, "height": 300.4}}));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(
            spec.operations(),
            &[Operation::Resize {
                width: 400,
                height: 300
            }]
        );
    }

    #[test]
    fn resize_requires_both_dimensions() {
        let raw = request(json!({"resize": {"width": 400}}));
        let err = TransformationSpec::from_request(&raw).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParameter {
                operation: "resize",
                parameter: "height"
            }
        );
    }

    #[test]
    fn resize_rejects_non_positive_dimensions() {
        for bad in [json!(0), json!(-5), json!(0.2)] {
            let raw = request(json!({"resize": {"width": bad, "height": 100}}));
            assert!(TransformationSpec::from_request(&raw).is_err());
        }
    }

    #[test]
    fn resize_rejects_non_numeric_dimensions() {
        let raw = request(json!({"resize": {"width": "wide", "height": 100}}));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    // =========================================================================
    // crop
    // =========================================================================

    #[test]
    fn crop_requires_all_four_parameters() {
        let raw = request(json!({"crop": {"x": 0, "y": 0, "width": 10}}));
        let err = TransformationSpec::from_request(&raw).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParameter {
                operation: "crop",
                parameter: "height"
            }
        );
    }

    #[test]
    fn crop_allows_zero_offsets() {
        let raw = request(json!({"crop": {"x": 0, "y": 0, "width": 10, "height": 10}}));
        assert!(TransformationSpec::from_request(&raw).is_ok());
    }

    #[test]
    fn crop_rejects_negative_offsets() {
        let raw = request(json!({"crop": {"x": -1, "y": 0, "width": 10, "height": 10}}));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    // =========================================================================
    // rotate / flip
    // =========================================================================

    #[test]
    fn rotate_direction_defaults_to_vertical() {
        let raw = request(json!({"rotate": {}}));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(
            spec.operations(),
            &[Operation::Rotate {
                direction: Direction::Vertical
            }]
        );
    }

    #[test]
    fn flip_horizontal_is_parsed() {
        let raw = request(json!({"flip": {"direction": "horizontal"}}));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(
            spec.operations(),
            &[Operation::Flip {
                direction: Direction::Horizontal
            }]
        );
    }

    #[test]
    fn unrecognized_direction_string_falls_back_to_vertical() {
        let raw = request(json!({"flip": {"direction": "upside-down"}}));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(
            spec.operations(),
            &[Operation::Flip {
                direction: Direction::Vertical
            }]
        );
    }

    #[test]
    fn non_string_direction_is_rejected() {
        let raw = request(json!({"rotate": {"direction": 90}}));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    // =========================================================================
    // format
    // =========================================================================

    #[test]
    fn format_is_case_insensitive() {
        let raw = request(json!({"format": "WEBP"}));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(
            spec.operations(),
            &[Operation::Format {
                target: OutputFormat::WebP
            }]
        );
    }

    #[test]
    fn format_outside_whitelist_is_rejected() {
        let raw = request(json!({"format": "bmp"}));
        let err = TransformationSpec::from_request(&raw).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat("bmp".into()));
    }

    #[test]
    fn format_must_be_a_string() {
        let raw = request(json!({"format": 42}));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    // =========================================================================
    // filters
    // =========================================================================

    #[test]
    fn filters_parse_independent_toggles() {
        let raw = request(json!({"filters": {"grayscale": true, "sepia": false}}));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(
            spec.operations(),
            &[Operation::Filters {
                grayscale: true,
                sepia: false
            }]
        );
    }

    #[test]
    fn filters_reject_unknown_keys() {
        let raw = request(json!({"filters": {"blur": true}}));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    #[test]
    fn filters_reject_non_boolean_values() {
        let raw = request(json!({"filters": {"sepia": "yes"}}));
        assert!(TransformationSpec::from_request(&raw).is_err());
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn execution_order_follows_declaration_order() {
        let raw = request(json!({
            "crop": {"x": 0, "y": 0, "width": 50, "height": 50},
            "resize": {"width": 100, "height": 100}
        }));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        assert_eq!(spec.operations()[0].name(), "crop");
        assert_eq!(spec.operations()[1].name(), "resize");
    }

    #[test]
    fn canonicalize_is_input_order_insensitive() {
        let a = TransformationSpec::from_request(&request(json!({
            "crop": {"x": 1, "y": 2, "width": 50, "height": 50},
            "resize": {"width": 100, "height": 100}
        })))
        .unwrap();
        let b = TransformationSpec::from_request(&request(json!({
            "resize": {"width": 100, "height": 100},
            "crop": {"x": 1, "y": 2, "width": 50, "height": 50}
        })))
        .unwrap();
        assert_eq!(a.canonicalize(), b.canonicalize());
    }

    #[test]
    fn canonicalize_distinguishes_parameters() {
        let a = TransformationSpec::from_request(&request(json!({
            "resize": {"width": 100, "height": 100}
        })))
        .unwrap();
        let b = TransformationSpec::from_request(&request(json!({
            "resize": {"width": 100, "height": 200}
        })))
        .unwrap();
        assert_ne!(a.canonicalize(), b.canonicalize());
    }

    #[test]
    fn filename_prefixes_match_operation_names() {
        let raw = request(json!({
            "resize": {"width": 10, "height": 10},
            "format": "png"
        }));
        let spec = TransformationSpec::from_request(&raw).unwrap();
        let prefixes: Vec<_> = spec
            .operations()
            .iter()
            .map(Operation::filename_prefix)
            .collect();
        assert_eq!(prefixes, vec!["resized_", "converted_"]);
    }
}
